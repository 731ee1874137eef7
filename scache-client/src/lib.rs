//! # Serverless Cache Client
//!
//! Purpose: Provide an async client for a hosted cache's gRPC data plane,
//! spreading calls over a small pool of HTTP/2 channels.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: A fixed set of channels picked round-robin by
//!    one atomic counter.
//! 2. **Errors As Values**: Every operation returns a response variant; the
//!    `Error` variant carries a classified `CacheError`.
//! 3. **Strategy Pattern**: `CacheStub` separates dispatch from the wire, so
//!    `MemoryStub` can stand in for the service.
//! 4. **Deadline Per Call**: Each call races an absolute deadline fixed at
//!    dispatch time.

mod client;
mod config;
mod executor;
mod lifecycle;
mod memory;
mod pool;
mod response;
mod stub;

pub use client::CacheClient;
pub use config::{
    ClientConfig, ConfigError, DEFAULT_CHANNEL_COUNT, DEFAULT_TIMEOUT_MS, DEFAULT_TTL_MS,
};
pub use executor::{agent, RequestExecutor, AGENT_HEADER, AUTHORIZATION_HEADER, CACHE_HEADER};
pub use memory::{MemoryStore, MemoryStub};
pub use pool::{ChannelPool, DataChannel};
pub use response::{
    DeleteResponse, DictionaryGetFieldResponse, DictionarySetFieldResponse, GetResponse,
    IncrementResponse, ListFetchResponse, ListPushBackResponse, ResponseVariant,
    SetAddElementsResponse, SetFetchResponse, SetIfNotExistsResponse, SetResponse,
};
pub use stub::{CacheStub, GrpcStub, RpcResult};

pub use scache_common::{CacheError, CacheResult, ErrorKind, IntoBytes, LimitExceededReason};
