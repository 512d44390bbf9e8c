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

use async_trait::async_trait;
use serde::Deserialize;

use super::instance::ScraperSettings;
use crate::error::Result;
use crate::scraper::{Scraper, ScraperConfig};
use crate::traits::{AgentCheck, MetricSink};

/// An entry of the `metrics` list: either a name (or glob) submitted as
/// is, or a table renaming sources to targets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MetricEntry {
    Name(String),
    Rename(HashMap<String, String>),
}

/// One `[[prometheus]]` table of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct GenericInstance {
    pub prometheus_url: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub metrics: Vec<MetricEntry>,
    #[serde(flatten)]
    pub settings: ScraperSettings,
}

impl GenericInstance {
    pub fn new(prometheus_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            prometheus_url: prometheus_url.into(),
            namespace: namespace.into(),
            metrics: Vec::new(),
            settings: ScraperSettings {
                send_histograms_buckets: true,
                ..ScraperSettings::default()
            },
        }
    }

    fn scraper_config(&self) -> ScraperConfig {
        let mut config = ScraperConfig::new(self.namespace.clone());
        for entry in &self.metrics {
            match entry {
                MetricEntry::Name(name) => {
                    config = config.with_mapping(name.clone(), name.clone());
                }
                MetricEntry::Rename(renames) => {
                    config.metrics_mapper.extend(renames.clone());
                }
            }
        }
        self.settings.apply_to(config, true)
    }
}

/// Scrapes a single endpoint, submitting only the listed metrics.
#[derive(Debug)]
pub struct GenericPrometheusCheck {
    instance: GenericInstance,
    scraper: Scraper,
}

impl GenericPrometheusCheck {
    pub fn new(instance: GenericInstance) -> Result<Self> {
        let scraper = Scraper::new(instance.scraper_config())?;
        Ok(Self { instance, scraper })
    }

    pub fn scraper(&self) -> &Scraper {
        &self.scraper
    }
}

#[async_trait]
impl AgentCheck for GenericPrometheusCheck {
    fn name(&self) -> &str {
        "prometheus"
    }

    async fn check(&mut self, sink: &mut dyn MetricSink) -> Result<()> {
        let options = self.instance.settings.process_options(true);
        self.scraper
            .process(&self.instance.prometheus_url, &options, sink)
            .await
    }
}
