//! # Request Executor
//!
//! Purpose: Expose the pooling-aware HTTP verbs. Each call resolves the
//! target URL, derives headers, obtains a channel from the registry or the
//! factory, executes synchronously, and classifies transport failures into
//! a small taxonomy.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `RequestExecutor` hides pooling, framing, and
//!    transport details behind one verb call.
//! 2. **Composition over Patching**: `ResourceClient` wraps the executor and
//!    re-applies resource settings on rebuild instead of reaching into a
//!    third-party client.
//! 3. **Classify Once**: Failure translation happens at the single point the
//!    network call is made; nothing is swallowed, nothing is retried.
//! 4. **Raw Responses**: Status handling and body decoding stay with the
//!    resource-mapping layer.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use thiserror::Error as ThisError;
use url::Url;

use crate::conn::{CallSettings, ConnectionFactory, SslOptions};
use crate::endpoint::EndpointKey;
use crate::http::{self, Method, RawResponse};
use crate::keepalive::KeepaliveChain;
use crate::pool::{ConnectionPool, SharedConnection};

/// Result type for the executor and everything beneath it.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport failure taxonomy. Only elapsed-time and TLS failures are
/// named; every other transport error propagates unchanged through `Io`.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The transport signalled an elapsed-time failure. Wraps the original
    /// message; no retry is attempted.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// TLS or certificate failure. Wraps the original message.
    #[error("tls failure: {0}")]
    Ssl(String),
    /// Any other transport failure, propagated unmodified.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The peer sent a response this codec could not frame.
    #[error("malformed response: {0}")]
    Protocol(&'static str),
    /// The site, path, or proxy description yields no usable target.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The proxy refused to open a tunnel to the origin.
    #[error("proxy refused tunnel: {0}")]
    Proxy(String),
}

/// Proxy hop configuration supplied by the resource-mapping layer.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// HTTP Basic credentials for the origin.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Everything the resource-mapping layer supplies about one site.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Base site URL; request paths are merged onto it.
    pub site: Url,
    pub proxy: Option<Proxy>,
    pub auth: Option<Credentials>,
    /// Connect, read, and write timeout for all blocking calls.
    pub timeout: Option<Duration>,
    pub ssl: SslOptions,
}

impl ExecutorConfig {
    pub fn new(site: Url) -> Self {
        ExecutorConfig {
            site,
            proxy: None,
            auth: None,
            timeout: None,
            ssl: SslOptions::default(),
        }
    }
}

/// Fire-and-forget observer invoked after every executed request with the
/// verb, the fully-qualified URI, and the raw outcome.
pub trait RequestObserver: Send + Sync {
    fn on_request(&self, method: Method, uri: &str, result: &Result<RawResponse>);
}

/// Pooling-aware request dispatcher for one configured site.
pub struct RequestExecutor {
    config: ExecutorConfig,
    keepalive: bool,
    pool: Arc<ConnectionPool>,
    observer: Option<Arc<dyn RequestObserver>>,
}

impl RequestExecutor {
    pub fn new(config: ExecutorConfig, keepalive: bool, pool: Arc<ConnectionPool>) -> Self {
        RequestExecutor {
            config,
            keepalive,
            pool,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Arc<dyn RequestObserver>) {
        self.observer = Some(observer);
    }

    /// Whether this executor pools its connections.
    pub fn keepalive(&self) -> bool {
        self.keepalive
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Executes a GET request against `path`.
    pub fn get(&self, path: &str, headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.request(Method::Get, path, None, headers)
    }

    /// Executes a DELETE request against `path`.
    pub fn delete(&self, path: &str, headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.request(Method::Delete, path, None, headers)
    }

    /// Executes a PUT request carrying `body`.
    pub fn put(&self, path: &str, body: &[u8], headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.request(Method::Put, path, Some(body), headers)
    }

    /// Executes a POST request carrying `body`.
    pub fn post(&self, path: &str, body: &[u8], headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.request(Method::Post, path, Some(body), headers)
    }

    /// Executes a HEAD request against `path`.
    pub fn head(&self, path: &str, headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.request(Method::Head, path, None, headers)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        extra: &[(&str, &str)],
    ) -> Result<RawResponse> {
        let url = self
            .config
            .site
            .join(path)
            .map_err(|err| Error::InvalidUrl(format!("{path}: {err}")))?;
        let key = EndpointKey::for_site(&self.config.site, self.config.proxy.as_ref())?;

        let connection = match self.pool.lookup(&key, self.keepalive) {
            Some(connection) => connection,
            None => {
                let connection = Arc::new(Mutex::new(ConnectionFactory::create(
                    &self.config.site,
                    self.config.proxy.as_ref(),
                )?));
                if self.keepalive {
                    self.pool.register(key, connection.clone());
                }
                connection
            }
        };

        let headers = self.build_headers(method, &url, body, extra);
        let mut request = Vec::with_capacity(256);
        http::build_request(method, &self.request_target(&url), &headers, body, &mut request);

        let result = self.dispatch(&connection, &request, method == Method::Head);
        tracing::debug!(method = method.as_str(), uri = %url, ok = result.is_ok(), "resource request");
        if let Some(observer) = &self.observer {
            observer.on_request(method, url.as_str(), &result);
        }
        result
    }

    /// Locks the channel for the whole exchange, so concurrent requests to
    /// one endpoint are serialized rather than interleaved on the wire. The
    /// registry's own lock is already released by the time this runs.
    fn dispatch(
        &self,
        connection: &SharedConnection,
        request: &[u8],
        head_request: bool,
    ) -> Result<RawResponse> {
        let mut channel = connection.lock().expect("connection mutex poisoned");
        channel.apply(self.call_settings());
        channel.execute(request, head_request).map_err(classify)
    }

    fn call_settings(&self) -> CallSettings {
        CallSettings {
            timeout: self.config.timeout,
            ssl: self.config.ssl.clone(),
            keepalive: self.keepalive,
            proxy_user: self.config.proxy.as_ref().and_then(|p| p.user.clone()),
            proxy_password: self.config.proxy.as_ref().and_then(|p| p.password.clone()),
        }
    }

    /// Absolute-form target when going through a plain-HTTP proxy,
    /// origin-form otherwise. HTTPS through a proxy tunnels first, so the
    /// target stays origin-form.
    fn request_target(&self, url: &Url) -> String {
        if self.config.proxy.is_some() && url.scheme() == "http" {
            return url.to_string();
        }
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    fn build_headers(
        &self,
        method: Method,
        url: &Url,
        body: Option<&[u8]>,
        extra: &[(&str, &str)],
    ) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = Vec::with_capacity(extra.len() + 5);
        headers.push(("Host".to_string(), host_header(url)));
        headers.push((
            "Connection".to_string(),
            if self.keepalive { "keep-alive" } else { "close" }.to_string(),
        ));
        if matches!(method, Method::Put | Method::Post) {
            let len = body.map_or(0, <[u8]>::len);
            headers.push(("Content-Length".to_string(), len.to_string()));
        }
        if let Some(auth) = &self.config.auth {
            headers.push(("Authorization".to_string(), basic_auth(&auth.user, &auth.password)));
        }
        if let Some(proxy) = &self.config.proxy {
            // Tunnelled requests authenticate during CONNECT instead.
            if url.scheme() == "http" {
                if let Some(user) = &proxy.user {
                    let password = proxy.password.as_deref().unwrap_or("");
                    headers.push((
                        "Proxy-Authorization".to_string(),
                        basic_auth(user, password),
                    ));
                }
            }
        }
        for (name, value) in extra {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push(((*name).to_string(), (*value).to_string()));
        }
        headers
    }
}

/// The composition seam towards the resource-mapping layer: owns the site
/// configuration and the keep-alive chain, memoizes an executor, and rebuilds
/// it so settings are re-applied the next time the resource asks for one.
pub struct ResourceClient {
    config: ExecutorConfig,
    keepalive: KeepaliveChain,
    pool: Arc<ConnectionPool>,
    observer: Option<Arc<dyn RequestObserver>>,
    executor: Option<RequestExecutor>,
}

impl ResourceClient {
    pub fn new(config: ExecutorConfig, keepalive: KeepaliveChain, pool: Arc<ConnectionPool>) -> Self {
        ResourceClient {
            config,
            keepalive,
            pool,
            observer: None,
            executor: None,
        }
    }

    /// Returns the memoized executor, building one on first use or after an
    /// invalidation.
    pub fn executor(&mut self) -> &RequestExecutor {
        if self.executor.is_none() {
            let mut executor = RequestExecutor::new(
                self.config.clone(),
                self.keepalive.resolve(),
                Arc::clone(&self.pool),
            );
            if let Some(observer) = &self.observer {
                executor.set_observer(Arc::clone(observer));
            }
            self.executor = Some(executor);
        }
        self.executor.as_ref().expect("executor memoized above")
    }

    /// Declares the keep-alive value at one scope and invalidates the
    /// memoized executor so the next use picks up the new resolution. The
    /// shared registry is untouched: entries belonging to other endpoints
    /// survive, and so does this site's own entry.
    pub fn set_keepalive(&mut self, scope: &str, value: Option<bool>) -> bool {
        let known = self.keepalive.set(scope, value);
        if known {
            self.executor = None;
        }
        known
    }

    /// Effective keep-alive resolution for this resource.
    pub fn keepalive(&self) -> bool {
        self.keepalive.resolve()
    }

    pub fn set_observer(&mut self, observer: Arc<dyn RequestObserver>) {
        self.observer = Some(observer);
        self.executor = None;
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn get(&mut self, path: &str, headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.executor().get(path, headers)
    }

    pub fn delete(&mut self, path: &str, headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.executor().delete(path, headers)
    }

    pub fn put(&mut self, path: &str, body: &[u8], headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.executor().put(path, body, headers)
    }

    pub fn post(&mut self, path: &str, body: &[u8], headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.executor().post(path, body, headers)
    }

    pub fn head(&mut self, path: &str, headers: &[(&str, &str)]) -> Result<RawResponse> {
        self.executor().head(path, headers)
    }
}

/// Maps elapsed-time transport failures to `Timeout`; everything else is
/// passed through untouched. TLS failures arrive already named from the
/// handshake site.
fn classify(err: Error) -> Error {
    match err {
        Error::Io(io_err)
            if matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ) =>
        {
            Error::Timeout(io_err.to_string())
        }
        other => other,
    }
}

pub(crate) fn basic_auth(user: &str, password: &str) -> String {
    format!(
        "Basic {}",
        BASE64_STANDARD.encode(format!("{user}:{password}"))
    )
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
