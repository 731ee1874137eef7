//! # Data-Plane Stub
//!
//! Purpose: Define the per-verb interface one pooled channel exposes, and the
//! gRPC implementation of it over a `tonic` channel.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: `CacheStub` decouples dispatch from the wire, so
//!    the in-memory stub and the gRPC stub are interchangeable.
//! 2. **Raw Replies**: Stubs return `tonic::Status` failures untouched; mapping
//!    into the error taxonomy happens only in the executor.
//! 3. **Lazy Connect**: `GrpcStub::connect_lazy` never touches the network;
//!    the connection is established by the first call.
//! 4. **Explicit Release**: `close` drops the stub's channel handle, so the
//!    HTTP/2 connection is torn down even while client handles remain.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Response, Status};
use tracing::debug;

use scache_common::proto::{self, paths};
use scache_common::{map_failure, CacheError, CacheResult};

use crate::config::ClientConfig;

/// Raw outcome of one unary RPC.
pub type RpcResult<T> = Result<Response<T>, Status>;

/// Unary data-plane verbs served by one channel.
///
/// Requests arrive with call metadata and timeout already attached.
pub trait CacheStub: Send + Sync + 'static {
    fn get(
        &self,
        request: Request<proto::GetRequest>,
    ) -> impl Future<Output = RpcResult<proto::GetResponse>> + Send;

    fn set(
        &self,
        request: Request<proto::SetRequest>,
    ) -> impl Future<Output = RpcResult<proto::SetResponse>> + Send;

    fn delete(
        &self,
        request: Request<proto::DeleteRequest>,
    ) -> impl Future<Output = RpcResult<proto::DeleteResponse>> + Send;

    fn set_if_not_exists(
        &self,
        request: Request<proto::SetIfNotExistsRequest>,
    ) -> impl Future<Output = RpcResult<proto::SetIfNotExistsResponse>> + Send;

    fn increment(
        &self,
        request: Request<proto::IncrementRequest>,
    ) -> impl Future<Output = RpcResult<proto::IncrementResponse>> + Send;

    fn dictionary_set(
        &self,
        request: Request<proto::DictionarySetRequest>,
    ) -> impl Future<Output = RpcResult<proto::DictionarySetResponse>> + Send;

    fn dictionary_get(
        &self,
        request: Request<proto::DictionaryGetRequest>,
    ) -> impl Future<Output = RpcResult<proto::DictionaryGetResponse>> + Send;

    fn list_push_back(
        &self,
        request: Request<proto::ListPushBackRequest>,
    ) -> impl Future<Output = RpcResult<proto::ListPushBackResponse>> + Send;

    fn list_fetch(
        &self,
        request: Request<proto::ListFetchRequest>,
    ) -> impl Future<Output = RpcResult<proto::ListFetchResponse>> + Send;

    fn set_union(
        &self,
        request: Request<proto::SetUnionRequest>,
    ) -> impl Future<Output = RpcResult<proto::SetUnionResponse>> + Send;

    fn set_fetch(
        &self,
        request: Request<proto::SetFetchRequest>,
    ) -> impl Future<Output = RpcResult<proto::SetFetchResponse>> + Send;

    /// Releases the stub's transport resources.
    ///
    /// Called once by the owning client after in-flight calls have drained.
    fn close(&self) {}
}

/// `CacheStub` backed by a lazily connected `tonic` channel.
///
/// Clones share the channel slot; closing one closes all of them.
#[derive(Clone)]
pub struct GrpcStub {
    inner: Arc<Mutex<Option<Grpc<Channel>>>>,
}

impl GrpcStub {
    /// Builds an endpoint from `config` and returns a stub whose connection
    /// is established on first use.
    ///
    /// Each call creates an independent HTTP/2 connection, so pooled stubs do
    /// not share a socket.
    pub fn connect_lazy(config: &ClientConfig) -> CacheResult<Self> {
        let uri = config.uri()?;
        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|err| CacheError::invalid_argument(format!("invalid endpoint {uri}: {err}")))?
            .connect_timeout(config.connect_timeout())
            .tcp_nodelay(true);

        if let Some(interval) = config.keep_alive_interval() {
            endpoint = endpoint
                .http2_keep_alive_interval(interval)
                .keep_alive_while_idle(true);
        }

        if config.tls {
            let tls = ClientTlsConfig::new()
                .domain_name(config.host())
                .with_native_roots();
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|err| map_failure(Box::new(err)))?;
        }

        debug!(endpoint = %uri, "created lazy channel");
        Ok(GrpcStub::from_channel(endpoint.connect_lazy()))
    }

    /// Wraps an existing channel.
    pub fn from_channel(channel: Channel) -> Self {
        GrpcStub {
            inner: Arc::new(Mutex::new(Some(Grpc::new(channel)))),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }

    async fn unary<Req, Resp>(&self, request: Request<Req>, path: &'static str) -> RpcResult<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let grpc = self.inner.lock().clone();
        let Some(mut grpc) = grpc else {
            return Err(Status::failed_precondition("channel is closed"));
        };
        grpc.ready().await.map_err(|err| {
            // Keep the transport error as the source so it maps to Connection.
            let mut status = Status::unavailable(format!("channel not ready: {err}"));
            status.set_source(Arc::new(err));
            status
        })?;
        let codec = ProstCodec::default();
        grpc.unary(request, PathAndQuery::from_static(path), codec)
            .await
    }
}

impl CacheStub for GrpcStub {
    async fn get(&self, request: Request<proto::GetRequest>) -> RpcResult<proto::GetResponse> {
        self.unary(request, paths::GET).await
    }

    async fn set(&self, request: Request<proto::SetRequest>) -> RpcResult<proto::SetResponse> {
        self.unary(request, paths::SET).await
    }

    async fn delete(
        &self,
        request: Request<proto::DeleteRequest>,
    ) -> RpcResult<proto::DeleteResponse> {
        self.unary(request, paths::DELETE).await
    }

    async fn set_if_not_exists(
        &self,
        request: Request<proto::SetIfNotExistsRequest>,
    ) -> RpcResult<proto::SetIfNotExistsResponse> {
        self.unary(request, paths::SET_IF_NOT_EXISTS).await
    }

    async fn increment(
        &self,
        request: Request<proto::IncrementRequest>,
    ) -> RpcResult<proto::IncrementResponse> {
        self.unary(request, paths::INCREMENT).await
    }

    async fn dictionary_set(
        &self,
        request: Request<proto::DictionarySetRequest>,
    ) -> RpcResult<proto::DictionarySetResponse> {
        self.unary(request, paths::DICTIONARY_SET).await
    }

    async fn dictionary_get(
        &self,
        request: Request<proto::DictionaryGetRequest>,
    ) -> RpcResult<proto::DictionaryGetResponse> {
        self.unary(request, paths::DICTIONARY_GET).await
    }

    async fn list_push_back(
        &self,
        request: Request<proto::ListPushBackRequest>,
    ) -> RpcResult<proto::ListPushBackResponse> {
        self.unary(request, paths::LIST_PUSH_BACK).await
    }

    async fn list_fetch(
        &self,
        request: Request<proto::ListFetchRequest>,
    ) -> RpcResult<proto::ListFetchResponse> {
        self.unary(request, paths::LIST_FETCH).await
    }

    async fn set_union(
        &self,
        request: Request<proto::SetUnionRequest>,
    ) -> RpcResult<proto::SetUnionResponse> {
        self.unary(request, paths::SET_UNION).await
    }

    async fn set_fetch(
        &self,
        request: Request<proto::SetFetchRequest>,
    ) -> RpcResult<proto::SetFetchResponse> {
        self.unary(request, paths::SET_FETCH).await
    }

    // Dropping the last channel handle stops its connection task.
    fn close(&self) {
        if self.inner.lock().take().is_some() {
            debug!("grpc channel released");
        }
    }
}
