//! # keepalive-http
//!
//! Purpose: Add reusable, keep-alive-capable connections to a synchronous
//! HTTP resource client, so opted-in callers skip the TCP/TLS handshake on
//! every request.
//!
//! ## Design Principles
//! 1. **One Channel per Endpoint**: The registry keeps at most one live
//!    connection per (host, port, proxy) identity and never evicts it.
//! 2. **Explicit Registry**: The pool is a constructible object shared by
//!    its owner, not hidden process-global state.
//! 3. **Request-Scoped Settings**: Timeout, TLS options, and credentials are
//!    re-applied on every use of a reused channel.
//! 4. **Narrow Error Taxonomy**: Timeouts and TLS failures are named; every
//!    other transport failure propagates untouched.

mod conn;
mod endpoint;
mod executor;
mod http;
mod keepalive;
mod pool;

pub use conn::{CallSettings, Connection, ConnectionFactory, SslOptions};
pub use endpoint::EndpointKey;
pub use executor::{
    Credentials, Error, ExecutorConfig, Proxy, RequestExecutor, RequestObserver, ResourceClient,
    Result,
};
pub use http::{Method, RawResponse};
pub use keepalive::KeepaliveChain;
pub use pool::{ConnectionPool, SharedConnection};
