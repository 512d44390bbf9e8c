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

//! Gitlab check.
//!
//! Scrapes the four Prometheus endpoints Gitlab exposes and probes the
//! `/-/readiness` and `/-/liveness` health endpoints.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::instance::ScraperSettings;
use crate::common::config::AppConfig;
use crate::error::{Error, Result};
use crate::network::build_http_client;
use crate::scraper::{CaVerification, Scraper, ScraperConfig, TlsSettings};
use crate::traits::{AgentCheck, MetricSink, ServiceCheckStatus};

/// The Prometheus endpoints of a Gitlab installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitlabEndpoint {
    Core,
    Internal,
    Database,
    Sidekiq,
}

impl GitlabEndpoint {
    pub const ALL: [Self; 4] = [Self::Core, Self::Internal, Self::Database, Self::Sidekiq];

    fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Internal => "internal",
            Self::Database => "database",
            Self::Sidekiq => "sidekiq",
        }
    }

    /// Instance setting holding the endpoint URL.
    pub fn config_key(self) -> String {
        format!("prometheus_{}_endpoint", self.as_str())
    }

    pub fn namespace(self) -> String {
        format!("gitlab.{}", self.as_str())
    }

    pub fn service_check_name(self) -> String {
        format!("gitlab.prometheus_{}_endpoint_up", self.as_str())
    }

    /// Metrics submitted 1:1 under the endpoint's namespace.
    pub fn allowed_metrics(self) -> &'static [&'static str] {
        match self {
            Self::Core => &[],
            Self::Internal => &[
                "gitlab_find_commit_real_duration_seconds_count",
                "gitlab_rails_queue_duration_seconds_count",
                "gitlab_sql_duration_seconds_count",
                "gitlab_transaction_duration_seconds_count",
                "http_requests_total",
                "job_queue_duration_seconds_count",
                "pipelines_created_total",
                "unicorn_queued_connections",
            ],
            Self::Database => &["ci_created_builds", "ci_running_builds", "gitlab_database_rows"],
            Self::Sidekiq => &[
                "sidekiq_queue_size",
                "sidekiq_queue_latency",
                "sidekiq_running_jobs_count",
                "sidekiq_dead_jobs_total",
            ],
        }
    }

    /// Core metrics go through custom handlers; the others only through
    /// their allow-list.
    pub fn ignore_unmapped(self) -> bool {
        self != Self::Core
    }
}

/// Readiness signals the ability to serve traffic, liveness that Gitlab is
/// healthy overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthProbe {
    Readiness,
    Liveness,
}

impl HealthProbe {
    pub const ALL: [Self; 2] = [Self::Readiness, Self::Liveness];
}

impl fmt::Display for HealthProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Readiness => f.write_str("readiness"),
            Self::Liveness => f.write_str("liveness"),
        }
    }
}

fn default_connect_timeout() -> u64 {
    AppConfig::DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_receive_timeout() -> u64 {
    AppConfig::DEFAULT_RECEIVE_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

/// One `[[gitlab]]` table of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct GitlabInstance {
    pub prometheus_core_endpoint: Option<String>,
    pub prometheus_internal_endpoint: Option<String>,
    pub prometheus_database_endpoint: Option<String>,
    pub prometheus_sidekiq_endpoint: Option<String>,
    /// Base URL for the health probes; probes are skipped when unset.
    pub gitlab_url: Option<String>,
    pub gitlab_user: Option<String>,
    pub gitlab_password: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout: u64,
    #[serde(default = "default_true")]
    pub ssl_cert_validation: bool,
    pub ssl_ca_certs: Option<PathBuf>,
    #[serde(flatten)]
    pub settings: ScraperSettings,
}

impl GitlabInstance {
    pub fn endpoint(&self, kind: GitlabEndpoint) -> Option<&str> {
        match kind {
            GitlabEndpoint::Core => self.prometheus_core_endpoint.as_deref(),
            GitlabEndpoint::Internal => self.prometheus_internal_endpoint.as_deref(),
            GitlabEndpoint::Database => self.prometheus_database_endpoint.as_deref(),
            GitlabEndpoint::Sidekiq => self.prometheus_sidekiq_endpoint.as_deref(),
        }
    }

    fn health_tls(&self) -> TlsSettings {
        let ca = match (&self.ssl_ca_certs, self.ssl_cert_validation) {
            (_, false) => CaVerification::Disabled,
            (Some(path), true) => CaVerification::CaPath(path.clone()),
            (None, true) => CaVerification::Unset,
        };
        TlsSettings {
            ca,
            ..TlsSettings::default()
        }
    }
}

pub struct GitlabCheck {
    instance: GitlabInstance,
    /// One scraper per endpoint URL, created on first use.
    scrapers: HashMap<String, Scraper>,
    health_client: reqwest::Client,
}

impl GitlabCheck {
    pub fn new(instance: GitlabInstance) -> Result<Self> {
        let health_client = build_http_client(
            &instance.health_tls(),
            Some(Duration::from_secs(instance.connect_timeout)),
        )?;
        Ok(Self {
            instance,
            scrapers: HashMap::new(),
            health_client,
        })
    }

    pub fn instance(&self) -> &GitlabInstance {
        &self.instance
    }

    pub fn scraper(&self, endpoint: &str) -> Option<&Scraper> {
        self.scrapers.get(endpoint)
    }

    async fn process_endpoint(
        &mut self,
        kind: GitlabEndpoint,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        let endpoint = self
            .instance
            .endpoint(kind)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Config(format!("Unable to find {} in config file.", kind.config_key()))
            })?;

        let settings = &self.instance.settings;
        let scraper = match self.scrapers.entry(endpoint.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let base = ScraperConfig::new(kind.namespace())
                    .with_metrics(kind.allowed_metrics().iter().copied());
                entry.insert(Scraper::new(settings.apply_to(base, true))?)
            }
        };

        let options = settings.process_options(kind.ignore_unmapped());
        let service_check = kind.service_check_name();
        match scraper.process(&endpoint, &options, sink).await {
            Ok(()) => sink.service_check(&service_check, ServiceCheckStatus::Ok, &[], None),
            Err(e) if e.is_connection() => {
                let message = format!("Unable to retrieve metrics from endpoint {endpoint}: {e}");
                sink.service_check(
                    &service_check,
                    ServiceCheckStatus::Critical,
                    &[],
                    Some(&message),
                );
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn check_health(&self, probe: HealthProbe, sink: &mut dyn MetricSink) -> Result<()> {
        let Some(url) = &self.instance.gitlab_url else {
            debug!("gitlab_url not configured, service check {probe} skipped");
            return Ok(());
        };

        let mut tags = service_check_tags(url)?;
        tags.extend(self.instance.settings.tags.iter().cloned());
        let name = format!("gitlab.{probe}");
        let check_url = format!("{url}/-/{probe}");

        let mut request = self
            .health_client
            .get(&check_url)
            .timeout(Duration::from_secs(self.instance.receive_timeout));
        if let (Some(user), Some(password)) =
            (&self.instance.gitlab_user, &self.instance.gitlab_password)
        {
            request = request.basic_auth(user, Some(password));
        }

        debug!("Checking {probe} against {check_url}");
        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                sink.service_check(&name, ServiceCheckStatus::Ok, &tags, None);
                debug!("gitlab check {probe} succeeded");
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                let message = format!("Got {} when hitting {check_url}", status.as_u16());
                sink.service_check(&name, ServiceCheckStatus::Critical, &tags, Some(&message));
                Err(Error::Status {
                    endpoint: check_url,
                    status,
                })
            }
            Err(source) => {
                let message = if source.is_timeout() {
                    format!("Timeout when hitting {check_url}")
                } else {
                    format!("Error hitting {check_url}. Error: {source}")
                };
                sink.service_check(&name, ServiceCheckStatus::Critical, &tags, Some(&message));
                Err(Error::Http {
                    endpoint: check_url,
                    source,
                })
            }
        }
    }
}

#[async_trait]
impl AgentCheck for GitlabCheck {
    fn name(&self) -> &str {
        "gitlab"
    }

    async fn check(&mut self, sink: &mut dyn MetricSink) -> Result<()> {
        for kind in GitlabEndpoint::ALL {
            self.process_endpoint(kind, sink).await?;
        }
        for probe in HealthProbe::ALL {
            self.check_health(probe, sink).await?;
        }
        Ok(())
    }
}

/// `gitlab_host` and `gitlab_port` tags for a health probe. HTTPS always
/// reports port 443.
pub fn service_check_tags(url: &str) -> Result<Vec<String>> {
    let parsed =
        Url::parse(url).map_err(|e| Error::Config(format!("Invalid gitlab_url {url}: {e}")))?;
    let host = parsed.host_str().unwrap_or_default();
    let port = if parsed.scheme() == "https" {
        443
    } else {
        parsed.port().unwrap_or(80)
    };
    Ok(vec![format!("gitlab_host:{host}"), format!("gitlab_port:{port}")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RecordingSink;

    fn instance(text: &str) -> GitlabInstance {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_service_check_tags() {
        assert_eq!(
            service_check_tags("https://gitlab.example.com:8443").unwrap(),
            ["gitlab_host:gitlab.example.com", "gitlab_port:443"]
        );
        assert_eq!(
            service_check_tags("http://localhost:8086").unwrap(),
            ["gitlab_host:localhost", "gitlab_port:8086"]
        );
        assert_eq!(
            service_check_tags("http://localhost").unwrap(),
            ["gitlab_host:localhost", "gitlab_port:80"]
        );
        assert!(matches!(service_check_tags("not a url"), Err(Error::Config(_))));
    }

    #[test]
    fn test_endpoint_policies() {
        assert_eq!(GitlabEndpoint::Database.namespace(), "gitlab.database");
        assert_eq!(
            GitlabEndpoint::Sidekiq.service_check_name(),
            "gitlab.prometheus_sidekiq_endpoint_up"
        );
        assert_eq!(GitlabEndpoint::Core.config_key(), "prometheus_core_endpoint");
        assert!(GitlabEndpoint::Core.allowed_metrics().is_empty());
        assert!(!GitlabEndpoint::Core.ignore_unmapped());
        assert!(GitlabEndpoint::Internal.ignore_unmapped());
        assert_eq!(GitlabEndpoint::Internal.allowed_metrics().len(), 8);
    }

    #[test]
    fn test_instance_defaults() {
        let instance = instance(r#"prometheus_core_endpoint = "http://localhost:9090/metrics""#);
        assert_eq!(instance.connect_timeout, AppConfig::DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(instance.receive_timeout, AppConfig::DEFAULT_RECEIVE_TIMEOUT_SECS);
        assert!(instance.ssl_cert_validation);
        assert_eq!(instance.health_tls().ca, CaVerification::Unset);
        assert_eq!(
            instance.endpoint(GitlabEndpoint::Core),
            Some("http://localhost:9090/metrics")
        );
        assert_eq!(instance.endpoint(GitlabEndpoint::Sidekiq), None);
    }

    #[test]
    fn test_health_tls_follows_validation_settings() {
        let disabled = instance("ssl_cert_validation = false\nssl_ca_certs = \"/ca.pem\"");
        assert_eq!(disabled.health_tls().ca, CaVerification::Disabled);

        let bundle = instance("ssl_ca_certs = \"/ca.pem\"");
        assert_eq!(
            bundle.health_tls().ca,
            CaVerification::CaPath(PathBuf::from("/ca.pem"))
        );
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_a_config_error() {
        let mut check = GitlabCheck::new(instance("")).unwrap();
        let mut sink = RecordingSink::new();
        let err = check.check(&mut sink).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Invalid configuration: Unable to find prometheus_core_endpoint in config file."
        );
        assert!(sink.service_checks.is_empty());
    }

    #[tokio::test]
    async fn test_health_probes_skipped_without_gitlab_url() {
        let check = GitlabCheck::new(instance("")).unwrap();
        let mut sink = RecordingSink::new();
        for probe in HealthProbe::ALL {
            check.check_health(probe, &mut sink).await.unwrap();
        }
        assert!(sink.service_checks.is_empty());
    }
}
