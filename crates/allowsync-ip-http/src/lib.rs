// # HTTP Address Prober
//
// This crate provides the HTTP-based address prober for allowsync.
//
// ## Purpose
//
// Asks a plain-text "what is my IP" service (by default
// `http://checkip.amazonaws.com/`) for the public address this host egresses
// from. That is the address the cluster control plane sees, so it is the one
// that has to be on the allow-list.
//
// ## Behaviour
//
// - One GET per `probe()` call, bounded by a 10 second timeout
// - The body is trimmed and must be a bare IP literal
// - Bodies over 64 bytes are refused without reading them in full
// - An optional version filter rejects the wrong address family
// - Every failure is an `AddressProbe` error; the engine retries next tick

use allowsync_core::config::IpSourceConfig;
use allowsync_core::config::IpVersion as ConfigIpVersion;
use allowsync_core::traits::{AddressProber, IpVersion as TraitsIpVersion};
use allowsync_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Longest body accepted as an address (an IPv6 literal plus whitespace)
const MAX_BODY_LEN: usize = 64;

/// HTTP-based address prober
pub struct HttpAddressProber {
    /// URL to fetch the address from
    url: String,

    /// Address family to accept (None = either)
    version: Option<TraitsIpVersion>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpAddressProber {
    /// Create a new HTTP address prober
    ///
    /// # Parameters
    ///
    /// - `url`: URL to fetch the address from (e.g., "http://checkip.amazonaws.com/")
    /// - `version`: Address family to accept (None = either)
    pub fn new(url: impl Into<String>, version: Option<TraitsIpVersion>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("allowsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            version,
            client,
        })
    }

    /// Build a prober from its configuration
    pub fn from_config(config: &IpSourceConfig) -> Result<Self> {
        config.validate()?;

        match config {
            IpSourceConfig::Http { url, version } => {
                let version = match version {
                    Some(ConfigIpVersion::V4) => Some(TraitsIpVersion::V4),
                    Some(ConfigIpVersion::V6) => Some(TraitsIpVersion::V6),
                    Some(ConfigIpVersion::Both) | None => None,
                };
                Self::new(url.clone(), version)
            }
        }
    }

    /// URL this prober queries
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Parse a response body into an address
///
/// # Parameters
///
/// - `body`: Raw response text
/// - `version`: Address family to accept (None = either)
pub fn parse_address(body: &str, version: Option<TraitsIpVersion>) -> Result<IpAddr> {
    let text = body.trim();

    if text.is_empty() {
        return Err(Error::address_probe("Empty response from address service"));
    }
    if text.len() > MAX_BODY_LEN {
        return Err(Error::address_probe(format!(
            "Response from address service is not an address ({} bytes)",
            text.len()
        )));
    }

    let ip: IpAddr = text
        .parse()
        .map_err(|_| Error::address_probe(format!("Invalid IP address: {:?}", text)))?;

    if let Some(expected) = version
        && TraitsIpVersion::of(&ip) != expected
    {
        return Err(Error::address_probe(format!(
            "Expected {:?} address, got: {}",
            expected, ip
        )));
    }

    Ok(ip)
}

fn oversized_body(url: &str) -> Error {
    Error::address_probe(format!(
        "Response from {} is longer than {} bytes, not an address",
        url, MAX_BODY_LEN
    ))
}

#[async_trait::async_trait]
impl AddressProber for HttpAddressProber {
    async fn probe(&self) -> Result<IpAddr> {
        let mut response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::address_probe(format!(
                    "Request to {} timed out after {}s",
                    self.url, REQUEST_TIMEOUT_SECS
                ))
            } else {
                Error::address_probe(format!("Request to {} failed: {}", self.url, e))
            }
        })?;

        if !response.status().is_success() {
            return Err(Error::address_probe(format!(
                "HTTP error from {}: {}",
                self.url,
                response.status()
            )));
        }

        if let Some(len) = response.content_length()
            && len > MAX_BODY_LEN as u64
        {
            return Err(oversized_body(&self.url));
        }

        // Chunked responses carry no length; stop reading at the limit
        let mut body = Vec::with_capacity(MAX_BODY_LEN);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::address_probe(format!("Failed to read response: {}", e)))?
        {
            if body.len() + chunk.len() > MAX_BODY_LEN {
                return Err(oversized_body(&self.url));
            }
            body.extend_from_slice(&chunk);
        }

        let body = String::from_utf8(body)
            .map_err(|_| Error::address_probe(format!("Response from {} is not UTF-8", self.url)))?;

        let ip = parse_address(&body, self.version)?;
        tracing::debug!("{} reports {}", self.url, ip);
        Ok(ip)
    }

    fn version(&self) -> Option<TraitsIpVersion> {
        self.version
    }

    fn prober_name(&self) -> &'static str {
        "http"
    }
}
