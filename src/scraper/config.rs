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

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::common::config::AppConfig;

/// Which label of a join source identifies the key, and which companion
/// labels get copied onto samples carrying that key.
///
/// ```toml
/// [label_joins.kube_pod_info]
/// label_to_match = "pod"
/// labels_to_get = ["node", "host_ip"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelJoinRule {
    pub label_to_match: String,
    #[serde(default)]
    pub labels_to_get: Vec<String>,
}

impl LabelJoinRule {
    pub fn new<I, S>(label_to_match: impl Into<String>, labels_to_get: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label_to_match: label_to_match.into(),
            labels_to_get: labels_to_get.into_iter().map(Into::into).collect(),
        }
    }
}

/// How the server certificate is verified.
///
/// In configuration files this is `ssl_ca_cert`: absent or `true` keeps the
/// system roots, `false` disables verification, a string is a CA bundle path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CaVerification {
    #[default]
    Unset,
    Disabled,
    CaPath(PathBuf),
}

impl<'de> Deserialize<'de> for CaVerification {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Path(PathBuf),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Self::Unset,
            Raw::Flag(false) => Self::Disabled,
            Raw::Path(path) => Self::CaPath(path),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Client certificate, optionally with the private key in the same file.
    pub cert: Option<PathBuf>,
    /// Unencrypted private key when it is not part of `cert`.
    pub private_key: Option<PathBuf>,
    pub ca: CaVerification,
}

/// Per-endpoint scraping policy.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Prefix joined with `.` to every submitted metric name.
    pub namespace: String,
    /// Source metric name to output name. Keys with glob characters act as
    /// wildcards when unmapped metrics are ignored.
    pub metrics_mapper: HashMap<String, String>,
    /// Sample names submitted as rates instead of gauges.
    pub rate_metrics: HashSet<String>,
    /// Stripped once from family names before anything else looks at them.
    pub prometheus_metrics_prefix: String,
    /// Join source family name to rule.
    pub label_joins: HashMap<String, LabelJoinRule>,
    /// Skipped silently, without an "unable to handle" notice.
    pub ignore_metrics: HashSet<String>,
    /// Label name to tag name.
    pub labels_mapper: HashMap<String, String>,
    pub exclude_labels: HashSet<String>,
    /// Family name (before prefix stripping) to type, replacing the payload's.
    pub type_overrides: HashMap<String, String>,
    /// Label whose value becomes the series hostname.
    pub label_to_hostname: Option<String>,
    /// Report `<namespace>.prometheus.health` on every poll.
    pub health_service_check: bool,
    pub tls: TlsSettings,
    pub extra_headers: HashMap<String, String>,
    pub timeout: Duration,
    /// Raw lines containing any of these substrings are dropped before parsing.
    pub text_filter_blacklist: Vec<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            metrics_mapper: HashMap::new(),
            rate_metrics: HashSet::new(),
            prometheus_metrics_prefix: String::new(),
            label_joins: HashMap::new(),
            ignore_metrics: HashSet::new(),
            labels_mapper: HashMap::new(),
            exclude_labels: HashSet::new(),
            type_overrides: HashMap::new(),
            label_to_hostname: None,
            health_service_check: false,
            tls: TlsSettings::default(),
            extra_headers: HashMap::new(),
            timeout: Duration::from_secs(AppConfig::DEFAULT_PROMETHEUS_TIMEOUT_SECS),
            text_filter_blacklist: Vec::new(),
        }
    }
}

impl ScraperConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Map each name to itself.
    pub fn with_metrics<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self.metrics_mapper.insert(name.clone(), name);
        }
        self
    }

    pub fn with_mapping(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.metrics_mapper.insert(source.into(), target.into());
        self
    }

    pub fn with_label_join(mut self, source_metric: impl Into<String>, rule: LabelJoinRule) -> Self {
        self.label_joins.insert(source_metric.into(), rule);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prometheus_metrics_prefix = prefix.into();
        self
    }

    pub fn with_health_service_check(mut self, enabled: bool) -> Self {
        self.health_service_check = enabled;
        self
    }

    /// Fully qualified output name.
    pub fn metric_name(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.namespace)
        }
    }

    pub fn health_check_name(&self) -> String {
        self.metric_name(AppConfig::HEALTH_SERVICE_CHECK_SUFFIX)
    }
}

/// Per-call flags for one scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    /// `tag:value` strings added to every series.
    pub custom_tags: Vec<String>,
    /// When set, unmapped metrics only go through wildcard mappings; custom
    /// handlers are not consulted.
    pub ignore_unmapped: bool,
    /// Emit histogram buckets as tagged `.count` gauges.
    pub send_histograms_buckets: bool,
    /// Submit counters as monotonic counts instead of gauges.
    pub send_monotonic_counter: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            custom_tags: Vec::new(),
            ignore_unmapped: false,
            send_histograms_buckets: true,
            send_monotonic_counter: false,
        }
    }
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn custom_tags(mut self, tags: Vec<String>) -> Self {
        self.custom_tags = tags;
        self
    }

    pub fn ignore_unmapped(mut self, ignore: bool) -> Self {
        self.ignore_unmapped = ignore;
        self
    }

    pub fn send_histograms_buckets(mut self, send: bool) -> Self {
        self.send_histograms_buckets = send;
        self
    }

    pub fn send_monotonic_counter(mut self, send: bool) -> Self {
        self.send_monotonic_counter = send;
        self
    }
}
