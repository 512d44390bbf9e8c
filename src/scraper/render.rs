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

//! Family-to-series rendering.
//!
//! Counters and gauges produce one series per sample. Histograms and
//! summaries are flattened into `.sum` and `.count` series; histogram
//! buckets become extra `.count` series tagged with their `le` bound.

use tracing::debug;

use super::config::{ProcessOptions, ScraperConfig};
use super::family::{MetricFamily, MetricKind};
use crate::parsing::Sample;
use crate::traits::{MetricSink, SubmissionKind};

/// Renders resolved families into sink submissions under the policy of one
/// scraper and the flags of one scrape.
///
/// Custom handlers receive a `Submitter` so they can reuse the standard
/// rendering under a name of their choosing.
#[derive(Debug, Clone, Copy)]
pub struct Submitter<'a> {
    config: &'a ScraperConfig,
    options: &'a ProcessOptions,
}

impl<'a> Submitter<'a> {
    pub fn new(config: &'a ScraperConfig, options: &'a ProcessOptions) -> Self {
        Self { config, options }
    }

    pub fn config(&self) -> &'a ScraperConfig {
        self.config
    }

    pub fn options(&self) -> &'a ProcessOptions {
        self.options
    }

    /// Submit every finite sample of `family` under the output name `name`
    /// (before namespacing).
    pub fn submit(&self, name: &str, family: &MetricFamily, sink: &mut dyn MetricSink) {
        match family.kind {
            MetricKind::Counter | MetricKind::Gauge => {
                let metric_name = self.config.metric_name(name);
                for sample in &family.samples {
                    if !self.is_finite(sample) {
                        continue;
                    }
                    let kind = self.scalar_kind(family.kind, sample);
                    sink.submit(
                        kind,
                        &metric_name,
                        sample.value,
                        &self.tags(sample),
                        self.hostname(sample),
                    );
                }
            }
            MetricKind::Histogram | MetricKind::Summary => {
                for sample in &family.samples {
                    let Some(suffix) = self.aggregate_suffix(family, sample) else {
                        continue;
                    };
                    if !self.is_finite(sample) {
                        continue;
                    }
                    sink.gauge(
                        &self.config.metric_name(&format!("{name}.{suffix}")),
                        sample.value,
                        &self.tags(sample),
                        self.hostname(sample),
                    );
                }
            }
        }
    }

    /// Tags for one sample: custom tags first, then the sample's labels
    /// minus excluded ones, renamed through `labels_mapper`.
    pub fn tags(&self, sample: &Sample) -> Vec<String> {
        let mut tags = self.options.custom_tags.clone();
        for (label, value) in &sample.labels {
            if self.config.exclude_labels.contains(label) {
                continue;
            }
            let tag_name = self
                .config
                .labels_mapper
                .get(label)
                .map(String::as_str)
                .unwrap_or(label);
            tags.push(format!("{tag_name}:{value}"));
        }
        tags
    }

    /// Value of the configured hostname label, if the sample carries it.
    pub fn hostname<'s>(&self, sample: &'s Sample) -> Option<&'s str> {
        self.config
            .label_to_hostname
            .as_ref()
            .and_then(|label| sample.labels.get(label))
            .map(String::as_str)
    }

    fn scalar_kind(&self, kind: MetricKind, sample: &Sample) -> SubmissionKind {
        if kind == MetricKind::Counter && self.options.send_monotonic_counter {
            SubmissionKind::MonotonicCount
        } else if self.config.rate_metrics.contains(&sample.name) {
            SubmissionKind::Rate
        } else {
            SubmissionKind::Gauge
        }
    }

    /// `sum` or `count` for the aggregate samples of histograms and
    /// summaries; `None` for quantiles and for buckets when disabled.
    fn aggregate_suffix(&self, family: &MetricFamily, sample: &Sample) -> Option<&'static str> {
        let suffix = sample.name.rsplit_once('_').map(|(_, suffix)| suffix)?;
        match (family.kind, suffix) {
            (_, "sum") => Some("sum"),
            (_, "count") => Some("count"),
            (MetricKind::Histogram, "bucket") if self.options.send_histograms_buckets => {
                Some("count")
            }
            _ => None,
        }
    }

    fn is_finite(&self, sample: &Sample) -> bool {
        if sample.value.is_finite() {
            return true;
        }
        debug!(
            "Metric value is not supported for metric {}: {}",
            sample.name, sample.value
        );
        false
    }
}
