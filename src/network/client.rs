// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::common::config::AppConfig;
use crate::error::{Error, Result};
use crate::scraper::config::{CaVerification, TlsSettings};

/// Build a reqwest client carrying the given TLS material.
///
/// The client certificate may hold the private key itself, in which case
/// `private_key` is left unset.
pub fn build_http_client(
    tls: &TlsSettings,
    connect_timeout: Option<Duration>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .pool_idle_timeout(Duration::from_secs(AppConfig::POOL_IDLE_TIMEOUT_SECS))
        .tcp_keepalive(Duration::from_secs(AppConfig::TCP_KEEPALIVE_SECS))
        .user_agent(AppConfig::USER_AGENT);

    if let Some(timeout) = connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(cert_path) = &tls.cert {
        let mut pem = std::fs::read(cert_path)?;
        if let Some(key_path) = &tls.private_key {
            pem.push(b'\n');
            pem.extend(std::fs::read(key_path)?);
        }
        let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
            Error::Tls(format!("client certificate {}: {e}", cert_path.display()))
        })?;
        builder = builder.identity(identity);
    }

    match &tls.ca {
        CaVerification::Unset => {}
        CaVerification::Disabled => {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        CaVerification::CaPath(path) => {
            let pem = std::fs::read(path)?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem)
                .map_err(|e| Error::Tls(format!("CA bundle {}: {e}", path.display())))?;
            builder = builder.tls_built_in_root_certs(false);
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
    }

    builder.build().map_err(|e| Error::Tls(e.to_string()))
}

/// Issues the scrape GET requests for one endpoint configuration.
#[derive(Debug, Clone)]
pub struct ScrapeClient {
    client: reqwest::Client,
}

impl ScrapeClient {
    pub fn new(tls: &TlsSettings) -> Result<Self> {
        Ok(Self {
            client: build_http_client(tls, None)?,
        })
    }

    /// GET `endpoint`, failing on transport errors and non-2xx statuses.
    ///
    /// The body is not read here; wrap the response in a [`LineReader`].
    /// gzip is negotiated by the client and decoded transparently.
    pub async fn get(
        &self,
        endpoint: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let mut request = self.client.get(endpoint).timeout(timeout);
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(name.clone()))?;
            request = request.header(header_name, header_value);
        }

        debug!("Polling {endpoint}");
        let response = request.send().await.map_err(|source| Error::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        Ok(response)
    }
}

/// Streams a response body line by line.
///
/// Owns the response: dropping the reader, on any path, releases the
/// underlying connection.
pub struct LineReader {
    endpoint: String,
    response: reqwest::Response,
    buffer: Vec<u8>,
    finished: bool,
}

impl LineReader {
    pub fn new(endpoint: impl Into<String>, response: reqwest::Response) -> Self {
        Self {
            endpoint: endpoint.into(),
            response,
            buffer: Vec::with_capacity(AppConfig::LINE_BUFFER_CAPACITY),
            finished: false,
        }
    }

    /// Next line without its terminator, or `None` at end of body.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                return Ok(Some(decode_line(&line[..pos])));
            }

            if self.finished {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buffer);
                return Ok(Some(decode_line(&line)));
            }

            let chunk = self.response.chunk().await.map_err(|source| Error::Http {
                endpoint: self.endpoint.clone(),
                source,
            })?;
            match chunk {
                Some(bytes) => self.buffer.extend_from_slice(&bytes),
                None => self.finished = true,
            }
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line_strips_carriage_return() {
        assert_eq!(decode_line(b"up 1\r"), "up 1");
        assert_eq!(decode_line(b"up 1"), "up 1");
        assert_eq!(decode_line(b""), "");
    }

    #[test]
    fn test_client_builds_without_tls_material() {
        assert!(ScrapeClient::new(&TlsSettings::default()).is_ok());
    }

    #[test]
    fn test_missing_certificate_is_io_error() {
        let tls = TlsSettings {
            cert: Some("/nonexistent/client.pem".into()),
            ..TlsSettings::default()
        };
        let err = build_http_client(&tls, None).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
