//! # Endpoint Identity
//!
//! Purpose: Give every distinct remote target a structural key for the
//! connection registry, so the same origin reached through different
//! proxies pools separately.
//!
//! ## Design Principles
//! 1. **Structural Equality**: Two descriptions of the same target compare equal.
//! 2. **Proxy-Aware**: The proxy hop is part of the identity, never folded away.
//! 3. **Cheap to Hash**: Plain owned fields with derived `Eq`/`Hash`.

use std::fmt;

use url::Url;

use crate::executor::{Error, Proxy, Result};

/// Identity of one registry slot: an origin plus an optional proxy hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    host: String,
    port: u16,
    proxy: Option<(String, u16)>,
}

impl EndpointKey {
    /// Derives the key for a site URL, optionally routed through a proxy.
    pub fn for_site(site: &Url, proxy: Option<&Proxy>) -> Result<Self> {
        let host = site
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(site.to_string()))?
            .to_string();
        let port = site
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidUrl(site.to_string()))?;
        Ok(EndpointKey {
            host,
            port,
            proxy: proxy.map(|p| (p.host.clone(), p.port)),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.proxy {
            None => write!(f, "{}:{}", self.host, self.port),
            Some((proxy_host, proxy_port)) => write!(
                f,
                "{}:{}:{}:{}",
                self.host, self.port, proxy_host, proxy_port
            ),
        }
    }
}
