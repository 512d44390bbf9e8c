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

//! Scraper settings shared by every check instance.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::common::config::AppConfig;
use crate::scraper::{CaVerification, LabelJoinRule, ProcessOptions, ScraperConfig, TlsSettings};

fn default_true() -> bool {
    true
}

/// Flattened into each instance table of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScraperSettings {
    #[serde(default)]
    pub labels_mapper: HashMap<String, String>,
    #[serde(default)]
    pub label_joins: HashMap<String, LabelJoinRule>,
    #[serde(default)]
    pub type_overrides: HashMap<String, String>,
    #[serde(default)]
    pub exclude_labels: Vec<String>,
    #[serde(default)]
    pub ignore_metrics: Vec<String>,
    #[serde(default)]
    pub rate_metrics: Vec<String>,
    pub label_to_hostname: Option<String>,
    /// `None` lets the check pick its own default.
    pub health_service_check: Option<bool>,
    pub ssl_cert: Option<PathBuf>,
    pub ssl_private_key: Option<PathBuf>,
    #[serde(default)]
    pub ssl_ca_cert: CaVerification,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    /// Seconds.
    pub prometheus_timeout: Option<u64>,
    #[serde(default)]
    pub prometheus_metrics_prefix: String,
    #[serde(default)]
    pub text_filter_blacklist: Vec<String>,
    #[serde(default = "default_true")]
    pub send_histograms_buckets: bool,
    #[serde(default)]
    pub send_monotonic_counter: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ScraperSettings {
    /// Copy the instance policy onto a check-provided base configuration.
    pub fn apply_to(&self, mut config: ScraperConfig, health_default: bool) -> ScraperConfig {
        config.labels_mapper = self.labels_mapper.clone();
        config.label_joins = self.label_joins.clone();
        config.type_overrides = self.type_overrides.clone();
        config.exclude_labels = self.exclude_labels.iter().cloned().collect();
        config
            .ignore_metrics
            .extend(self.ignore_metrics.iter().cloned());
        config.rate_metrics = self.rate_metrics.iter().cloned().collect();
        config.label_to_hostname = self.label_to_hostname.clone();
        config.health_service_check = self.health_service_check.unwrap_or(health_default);
        config.tls = TlsSettings {
            cert: self.ssl_cert.clone(),
            private_key: self.ssl_private_key.clone(),
            ca: self.ssl_ca_cert.clone(),
        };
        config.extra_headers = self.extra_headers.clone();
        config.timeout = Duration::from_secs(
            self.prometheus_timeout
                .unwrap_or(AppConfig::DEFAULT_PROMETHEUS_TIMEOUT_SECS),
        );
        config.prometheus_metrics_prefix = self.prometheus_metrics_prefix.clone();
        config.text_filter_blacklist = self.text_filter_blacklist.clone();
        config
    }

    pub fn process_options(&self, ignore_unmapped: bool) -> ProcessOptions {
        ProcessOptions::new()
            .custom_tags(self.tags.clone())
            .ignore_unmapped(ignore_unmapped)
            .send_histograms_buckets(self.send_histograms_buckets)
            .send_monotonic_counter(self.send_monotonic_counter)
    }
}
