//! # Transport Channel
//!
//! Purpose: Provide the low-level connection object the registry hands out:
//! a lazily-opened channel to one endpoint, optionally routed through a
//! proxy, speaking plain TCP or TLS.
//!
//! ## Design Principles
//! 1. **Lazy Opening**: Construction never touches the network; the socket
//!    opens on first use and failures surface during execution.
//! 2. **Request-Scoped Settings**: Timeout, TLS options, proxy credentials,
//!    and the keep-alive flag are overrides re-applied on every use, not
//!    channel-immutable properties.
//! 3. **Transparent Reopen**: A channel the peer closed reopens on next use;
//!    the owning registry entry is never touched from here.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};
use url::Url;

use crate::executor::{basic_auth, Error, Proxy, Result};
use crate::http::{self, RawResponse};

/// TLS verification options, re-applied per call.
#[derive(Debug, Clone)]
pub struct SslOptions {
    /// Verify the peer certificate chain.
    pub verify_certs: bool,
    /// Verify that the certificate matches the requested hostname.
    pub verify_hostnames: bool,
}

impl Default for SslOptions {
    fn default() -> Self {
        SslOptions {
            verify_certs: true,
            verify_hostnames: true,
        }
    }
}

/// Per-call overrides layered onto a possibly reused channel.
#[derive(Debug, Clone, Default)]
pub struct CallSettings {
    /// Connect, read, and write timeout for all blocking calls.
    pub timeout: Option<Duration>,
    pub ssl: SslOptions,
    /// Whether the channel should be kept open after the response.
    pub keepalive: bool,
    pub proxy_user: Option<String>,
    pub proxy_password: Option<String>,
}

enum Stream {
    Plain(BufReader<TcpStream>),
    Tls(BufReader<TlsStream<TcpStream>>),
}

impl Stream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Plain(reader) => reader.get_ref(),
            Stream::Tls(reader) => reader.get_ref().get_ref(),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Stream::Plain(reader) => reader.get_mut().write_all(data),
            Stream::Tls(reader) => reader.get_mut().write_all(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(reader) => reader.get_mut().flush(),
            Stream::Tls(reader) => reader.get_mut().flush(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(reader) => reader.read(buf),
            Stream::Tls(reader) => reader.read(buf),
        }
    }
}

impl BufRead for Stream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Stream::Plain(reader) => reader.fill_buf(),
            Stream::Tls(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amount: usize) {
        match self {
            Stream::Plain(reader) => reader.consume(amount),
            Stream::Tls(reader) => reader.consume(amount),
        }
    }
}

/// A transport channel bound to one endpoint.
///
/// The underlying socket opens lazily and may be dropped and reopened across
/// uses; the binding to (host, port, proxy) is fixed for the channel's life.
pub struct Connection {
    host: String,
    port: u16,
    secure: bool,
    proxy: Option<(String, u16)>,
    settings: CallSettings,
    stream: Option<Stream>,
    line_buf: Vec<u8>,
}

impl Connection {
    /// Re-applies request-scoped settings ahead of one execution.
    pub fn apply(&mut self, settings: CallSettings) {
        self.settings = settings;
    }

    /// Sends one serialized request and reads the response.
    ///
    /// Opens the socket if needed, re-applies timeouts to a live socket, and
    /// drops the socket afterwards when keep-alive is off or the peer
    /// signalled close. The channel object itself stays usable either way.
    pub fn execute(&mut self, request: &[u8], head_request: bool) -> Result<RawResponse> {
        self.ensure_open()?;
        self.sync_timeouts()?;
        let stream = self.stream.as_mut().expect("channel opened above");
        stream.write_all(request)?;
        stream.flush()?;
        let response = http::read_response(stream, &mut self.line_buf, head_request)?;
        if !self.settings.keepalive || !response.is_keep_alive() {
            self.stream = None;
        }
        Ok(response)
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let (connect_host, connect_port) = match &self.proxy {
            Some((host, port)) => (host.clone(), *port),
            None => (self.host.clone(), self.port),
        };
        let tcp = self.open_tcp(&connect_host, connect_port)?;
        tcp.set_read_timeout(self.settings.timeout)?;
        tcp.set_write_timeout(self.settings.timeout)?;
        tcp.set_nodelay(true)?;

        let stream = if self.secure {
            let tcp = if self.proxy.is_some() {
                self.tunnel(tcp)?
            } else {
                tcp
            };
            Stream::Tls(BufReader::new(self.handshake(tcp)?))
        } else {
            Stream::Plain(BufReader::new(tcp))
        };
        self.stream = Some(stream);
        Ok(())
    }

    fn open_tcp(&self, host: &str, port: u16) -> Result<TcpStream> {
        match self.settings.timeout {
            Some(timeout) => {
                let mut last_err = None;
                for addr in (host, port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => return Ok(stream),
                        Err(err) => last_err = Some(err),
                    }
                }
                Err(last_err
                    .unwrap_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "no addresses resolved")
                    })
                    .into())
            }
            None => Ok(TcpStream::connect((host, port))?),
        }
    }

    /// Asks the proxy for a raw tunnel to the origin before TLS starts.
    fn tunnel(&self, mut tcp: TcpStream) -> Result<TcpStream> {
        let authority = format!("{}:{}", self.host, self.port);
        let mut connect = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
        if let Some(user) = &self.settings.proxy_user {
            let password = self.settings.proxy_password.as_deref().unwrap_or("");
            connect.push_str("Proxy-Authorization: ");
            connect.push_str(&basic_auth(user, password));
            connect.push_str("\r\n");
        }
        connect.push_str("\r\n");
        tcp.write_all(connect.as_bytes())?;
        tcp.flush()?;

        let mut reader = BufReader::new(tcp);
        let mut line_buf = Vec::with_capacity(128);
        let response = http::read_response(&mut reader, &mut line_buf, true)?;
        if response.status != 200 {
            return Err(Error::Proxy(format!(
                "{} {}",
                response.status, response.reason
            )));
        }
        // Bytes buffered past the response would be invisible to the TLS
        // layer once the reader is unwrapped; the origin must speak first.
        if !reader.buffer().is_empty() {
            return Err(Error::Protocol("unexpected data after tunnel response"));
        }
        Ok(reader.into_inner())
    }

    fn handshake(&self, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
        let mut builder = TlsConnector::builder();
        if !self.settings.ssl.verify_certs {
            builder.danger_accept_invalid_certs(true);
        }
        if !self.settings.ssl.verify_hostnames {
            builder.danger_accept_invalid_hostnames(true);
        }
        let connector = builder.build().map_err(|err| Error::Ssl(err.to_string()))?;
        connector
            .connect(&self.host, tcp)
            .map_err(|err| match err {
                HandshakeError::Failure(failure) => Error::Ssl(failure.to_string()),
                HandshakeError::WouldBlock(_) => Error::Ssl("handshake interrupted".to_string()),
            })
    }

    fn sync_timeouts(&self) -> Result<()> {
        if let Some(stream) = &self.stream {
            let tcp = stream.tcp();
            tcp.set_read_timeout(self.settings.timeout)?;
            tcp.set_write_timeout(self.settings.timeout)?;
        }
        Ok(())
    }
}

/// Builds unopened channels for the executor and the registry.
pub struct ConnectionFactory;

impl ConnectionFactory {
    /// Constructs a channel to the site's origin, optionally routed through
    /// `proxy`. Never touches the network; this is also the single place
    /// where channel creation is observable for diagnostics.
    pub fn create(site: &Url, proxy: Option<&Proxy>) -> Result<Connection> {
        let host = site
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(site.to_string()))?
            .to_string();
        let port = site
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidUrl(site.to_string()))?;
        tracing::debug!(host = %host, port, proxied = proxy.is_some(), "new connection");
        Ok(Connection {
            host,
            port,
            secure: site.scheme() == "https",
            proxy: proxy.map(|p| (p.host.clone(), p.port)),
            settings: CallSettings::default(),
            stream: None,
            line_buf: Vec::with_capacity(128),
        })
    }
}
