// scache-common - Shared types and wire definitions for the serverless cache client
//
// This crate defines the error taxonomy and the gRPC messages of the data plane

pub mod error;
pub mod proto;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use types::*;
