//! JSON-RPC 2.0 over postMessage-style channels.
//!
//! This is the correlation layer. A [`RpcClient`] issues requests with
//! unique ids and resolves each one when its matching response arrives, in
//! whatever order responses come back. A [`RpcServer`] listens on the other
//! end of a channel, resolves method names to handlers, and replies with a
//! result or a [`StructuredError`].
//!
//! Envelopes are decoded once at the channel boundary (see [`envelope`]);
//! anything that is not an rpctunnel envelope is ignored.

pub mod client;
pub mod envelope;
pub mod error;
pub mod server;
pub mod structured;

pub use client::{RequestOptions, RpcClient};
pub use envelope::{Envelope, RequestEnvelope, ResponseEnvelope, JSONRPC_VERSION};
pub use error::{Result, RpcError};
pub use server::{
    handler, Handler, HandlerFuture, MethodResolver, MethodTable, ResolverFn, RpcServer,
    ServerConfig,
};
pub use structured::{
    make_error, to_structured_error, HandlerError, StructuredError, ThrownValue,
    DEFAULT_ERROR_CODE, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
