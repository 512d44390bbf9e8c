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

//! Unified error types for promcheck.
//!
//! Only transport and configuration failures surface as errors. Parse
//! anomalies, non-finite samples and unhandled metrics are absorbed where
//! they happen and only show up in the logs.

use thiserror::Error;

/// The main error type for scraping and check operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("HTTP request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with a non-success status code.
    #[error("HTTP {status} returned by {endpoint}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    /// TLS material could not be loaded or the client could not be built.
    #[error("Invalid TLS settings: {0}")]
    Tls(String),

    /// An instance is missing a required setting or carries an invalid one.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A configured extra header has an invalid name or value.
    #[error("Invalid header {0}")]
    InvalidHeader(String),

    /// A wildcard mapping key could not be compiled.
    #[error("Invalid metric pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A custom metric handler failed.
    #[error("Error handling metric {metric}: {message}")]
    Handler { metric: String, message: String },

    /// The configuration file could not be parsed.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// An I/O error occurred while reading configuration or TLS files.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the failure happened before any response was received:
    /// connection refused, DNS failure, TLS handshake or timeout.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Http { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }

    /// True when the request failed because a timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http { source, .. } if source.is_timeout())
    }

    pub fn handler(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            metric: metric.into(),
            message: message.into(),
        }
    }
}

/// A specialized Result type for promcheck operations.
pub type Result<T> = std::result::Result<T, Error>;
