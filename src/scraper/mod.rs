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

//! The per-endpoint scraping engine.
//!
//! A [`Scraper`] owns everything that has to survive between two scrapes of
//! the same endpoint: the HTTP client, the label join mapping, the custom
//! handler registry and the dry-run flag. Checks keep one scraper per
//! endpoint URL and call [`Scraper::process`] on every collection cycle.

pub mod config;
pub mod family;
pub mod labels;
pub mod render;
pub mod wildcard;

use std::collections::HashMap;

use tracing::{debug, warn};

pub use config::{CaVerification, LabelJoinRule, ProcessOptions, ScraperConfig, TlsSettings};
pub use family::{MetricFamily, MetricKind};
pub use labels::LabelJoiner;
pub use render::Submitter;
pub use wildcard::WildcardPattern;

use crate::error::{Error, Result};
use crate::network::{LineReader, ScrapeClient};
use crate::parsing::{FamilyParser, ParsedFamily};
use crate::traits::{MetricSink, ServiceCheckStatus};

/// Custom rendering for one unmapped metric, looked up by family name.
pub type MetricHandler =
    Box<dyn Fn(&MetricFamily, &Submitter<'_>, &mut dyn MetricSink) -> Result<()> + Send + Sync>;

pub struct Scraper {
    config: ScraperConfig,
    client: ScrapeClient,
    joiner: LabelJoiner,
    handlers: HashMap<String, MetricHandler>,
    /// Mapping keys containing glob characters.
    wildcards: Vec<WildcardPattern>,
    /// Set until the first scrape of a scraper with label joins completes.
    dry_run: bool,
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("namespace", &self.config.namespace)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Scraper {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let client = ScrapeClient::new(&config.tls)?;
        let joiner = LabelJoiner::new(config.label_joins.clone());
        let wildcards = compile_wildcards(&config.metrics_mapper)?;
        Ok(Self {
            config,
            client,
            joiner,
            handlers: HashMap::new(),
            wildcards,
            dry_run: true,
        })
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn label_joiner(&self) -> &LabelJoiner {
        &self.joiner
    }

    /// Whether the next scrape only warms up label join state.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Register the handler used for unmapped metric `name` when unmapped
    /// metrics are not ignored. Replaces any previous handler for `name`.
    pub fn register_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&MetricFamily, &Submitter<'_>, &mut dyn MetricSink) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    /// GET `endpoint`, reporting the health service check when enabled.
    pub async fn poll(
        &self,
        endpoint: &str,
        sink: &mut dyn MetricSink,
    ) -> Result<reqwest::Response> {
        let result = self
            .client
            .get(endpoint, &self.config.extra_headers, self.config.timeout)
            .await;

        if self.config.health_service_check {
            let status = match &result {
                Ok(_) => Some(ServiceCheckStatus::Ok),
                Err(
                    Error::Http { .. } | Error::Status { .. } | Error::InvalidHeader(_),
                ) => {
                    Some(ServiceCheckStatus::Critical)
                }
                Err(_) => None,
            };
            if let Some(status) = status {
                sink.service_check(
                    &self.config.health_check_name(),
                    status,
                    &[format!("endpoint:{endpoint}")],
                    None,
                );
            }
        }

        result
    }

    /// Scrape `endpoint` once and submit everything it exposes.
    ///
    /// The response body is streamed and released on every return path.
    pub async fn process(
        &mut self,
        endpoint: &str,
        options: &ProcessOptions,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        let response = self.poll(endpoint, sink).await?;
        let mut reader = LineReader::new(endpoint, response);
        let mut parser = FamilyParser::new();

        self.begin_scrape();
        while let Some(line) = reader.next_line().await? {
            if self.is_blacklisted(&line) {
                continue;
            }
            if let Some(parsed) = parser.push_line(&line) {
                self.handle_parsed(parsed, options, sink)?;
            }
        }
        if let Some(parsed) = parser.finish() {
            self.handle_parsed(parsed, options, sink)?;
        }
        self.end_scrape();
        Ok(())
    }

    /// Run the scrape pipeline over a payload that is already in memory.
    pub fn process_text(
        &mut self,
        text: &str,
        options: &ProcessOptions,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        let mut parser = FamilyParser::new();

        self.begin_scrape();
        for line in text.lines() {
            if self.is_blacklisted(line) {
                continue;
            }
            if let Some(parsed) = parser.push_line(line) {
                self.handle_parsed(parsed, options, sink)?;
            }
        }
        if let Some(parsed) = parser.finish() {
            self.handle_parsed(parsed, options, sink)?;
        }
        self.end_scrape();
        Ok(())
    }

    fn begin_scrape(&mut self) {
        if self.joiner.is_enabled() {
            self.joiner.begin_scrape();
        } else {
            self.dry_run = false;
        }
    }

    fn end_scrape(&mut self) {
        if self.dry_run {
            debug!(
                "Label join state warmed up for {}, metrics will be submitted from the next scrape",
                self.config.namespace
            );
        }
        self.dry_run = false;
        self.joiner.collect_garbage();
    }

    fn is_blacklisted(&self, line: &str) -> bool {
        self.config
            .text_filter_blacklist
            .iter()
            .any(|needle| line.contains(needle.as_str()))
    }

    fn handle_parsed(
        &mut self,
        parsed: ParsedFamily,
        options: &ProcessOptions,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        let Some(family) = MetricFamily::resolve(
            parsed,
            &self.config.type_overrides,
            &self.config.prometheus_metrics_prefix,
        ) else {
            return Ok(());
        };
        self.process_family(family, options, sink)
    }

    /// Join, filter and dispatch one resolved family.
    pub fn process_family(
        &mut self,
        mut family: MetricFamily,
        options: &ProcessOptions,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        self.joiner.record(&family);
        if self.config.ignore_metrics.contains(&family.name) {
            return Ok(());
        }
        self.joiner.enrich(&mut family);
        if self.dry_run {
            return Ok(());
        }

        let submitter = Submitter::new(&self.config, options);

        if let Some(target) = self.config.metrics_mapper.get(&family.name) {
            submitter.submit(target, &family, sink);
            return Ok(());
        }

        if !options.ignore_unmapped {
            match self.handlers.get(&family.name) {
                Some(handler) => {
                    if let Err(e) = handler(&family, &submitter, sink) {
                        warn!("Error handling metric: {} - error: {e}", family.name);
                    }
                }
                None => debug!("Unable to handle metric: {}", family.name),
            }
            return Ok(());
        }

        for pattern in &self.wildcards {
            if pattern.matches(&family.name) {
                submitter.submit(&family.name, &family, sink);
            }
        }
        Ok(())
    }
}

fn compile_wildcards(mapper: &HashMap<String, String>) -> Result<Vec<WildcardPattern>> {
    let mut keys: Vec<&String> = mapper
        .keys()
        .filter(|key| WildcardPattern::is_wildcard(key))
        .collect();
    keys.sort();
    keys.into_iter()
        .map(|key| WildcardPattern::compile(key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{RecordingSink, SubmissionKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const PAYLOAD: &str = r#"# HELP ci_created_builds Builds created.
# TYPE ci_created_builds counter
ci_created_builds{project="a"} 3
ci_created_builds{project="b"} NaN
# TYPE ci_running_builds gauge
ci_running_builds 2
# TYPE other_metric gauge
other_metric 7
# TYPE latency histogram
latency_bucket{le="1"} 2
latency_bucket{le="+Inf"} 4
latency_sum 12.0
latency_count 4
# TYPE build_info untyped
build_info{version="1"} 1
"#;

    fn run(scraper: &mut Scraper, text: &str, options: &ProcessOptions) -> RecordingSink {
        let mut sink = RecordingSink::new();
        scraper.process_text(text, options, &mut sink).unwrap();
        sink
    }

    fn pod_scraper(config: ScraperConfig) -> Scraper {
        Scraper::new(config.with_label_join(
            "kube_pod_info",
            LabelJoinRule::new("pod", ["node"]),
        ))
        .unwrap()
    }

    #[test]
    fn test_exact_mapping_renames_output() {
        let config = ScraperConfig::new("gitlab").with_mapping("ci_running_builds", "ci.running");
        let mut scraper = Scraper::new(config).unwrap();
        let sink = run(&mut scraper, PAYLOAD, &ProcessOptions::default());

        assert_eq!(sink.metrics.len(), 1);
        assert_eq!(sink.metrics[0].name, "gitlab.ci.running");
        assert_eq!(sink.metrics[0].value, 2.0);
    }

    #[test]
    fn test_non_finite_samples_are_never_submitted() {
        let config = ScraperConfig::default().with_metrics(["ci_created_builds", "latency"]);
        let mut scraper = Scraper::new(config).unwrap();
        let text = format!("{PAYLOAD}# TYPE latency2 histogram\nlatency2_sum +Inf\n");
        let sink = run(&mut scraper, &text, &ProcessOptions::default());

        assert!(sink.metrics.iter().all(|m| m.value.is_finite()));
        let builds = sink.metrics_named("ci_created_builds");
        assert_eq!(builds.len(), 1);
        assert!(builds[0].has_tag("project:a"));
    }

    #[test]
    fn test_unknown_types_produce_nothing() {
        let config = ScraperConfig::default().with_metrics(["build_info", "loose"]);
        let mut scraper = Scraper::new(config).unwrap();
        let text = "build_info 1\n# TYPE loose info\nloose 2\n";
        let sink = run(&mut scraper, text, &ProcessOptions::default());
        assert!(sink.metrics.is_empty());
    }

    #[test]
    fn test_type_override_makes_untyped_family_submittable() {
        let mut config = ScraperConfig::default().with_metrics(["build_info"]);
        config
            .type_overrides
            .insert("build_info".to_string(), "gauge".to_string());
        let mut scraper = Scraper::new(config).unwrap();
        let sink = run(&mut scraper, PAYLOAD, &ProcessOptions::default());

        assert_eq!(sink.metrics.len(), 1);
        assert!(sink.metrics[0].has_tag("version:1"));
    }

    #[test]
    fn test_repeated_scrapes_are_idempotent() {
        let config = ScraperConfig::new("svc").with_metrics(["ci_created_builds", "latency"]);
        let mut scraper = Scraper::new(config).unwrap();
        let options = ProcessOptions::default();

        let first = run(&mut scraper, PAYLOAD, &options);
        let second = run(&mut scraper, PAYLOAD, &options);
        assert!(!first.metrics.is_empty());
        assert_eq!(first.metrics, second.metrics);
    }

    #[test]
    fn test_histogram_buckets_follow_option() {
        let config = ScraperConfig::default().with_metrics(["latency"]);
        let mut scraper = Scraper::new(config).unwrap();

        let sink = run(&mut scraper, PAYLOAD, &ProcessOptions::default());
        assert_eq!(sink.metrics.len(), 4);
        assert!(sink
            .metrics_named("latency.count")
            .iter()
            .any(|m| m.has_tag("le:+Inf")));

        let options = ProcessOptions::default().send_histograms_buckets(false);
        let sink = run(&mut scraper, PAYLOAD, &options);
        assert_eq!(sink.metrics.len(), 2);
    }

    #[test]
    fn test_monotonic_counter_option() {
        let config = ScraperConfig::default().with_metrics(["ci_created_builds", "ci_running_builds"]);
        let mut scraper = Scraper::new(config).unwrap();
        let options = ProcessOptions::default().send_monotonic_counter(true);
        let sink = run(&mut scraper, PAYLOAD, &options);

        assert_eq!(
            sink.metrics_named("ci_created_builds")[0].kind,
            SubmissionKind::MonotonicCount
        );
        assert_eq!(sink.metrics_named("ci_running_builds")[0].kind, SubmissionKind::Gauge);
    }

    #[test]
    fn test_wildcard_dispatch_when_ignoring_unmapped() {
        let config = ScraperConfig::new("gitlab").with_metrics(["ci_*"]);
        let mut scraper = Scraper::new(config).unwrap();
        let options = ProcessOptions::default().ignore_unmapped(true);
        let sink = run(&mut scraper, PAYLOAD, &options);

        let mut names: Vec<&str> = sink.metrics.iter().map(|m| m.name.as_str()).collect();
        names.sort();
        assert_eq!(names, ["gitlab.ci_created_builds", "gitlab.ci_running_builds"]);
        assert!(sink.metrics_named("gitlab.other_metric").is_empty());
    }

    #[test]
    fn test_every_matching_wildcard_submits() {
        let config = ScraperConfig::default().with_metrics(["ci_*", "*_builds"]);
        let mut scraper = Scraper::new(config).unwrap();
        let options = ProcessOptions::default().ignore_unmapped(true);
        let text = "# TYPE ci_running_builds gauge\nci_running_builds 2\n";
        let sink = run(&mut scraper, text, &options);
        assert_eq!(sink.metrics_named("ci_running_builds").len(), 2);
    }

    #[test]
    fn test_wildcards_are_not_used_for_handlers() {
        let config = ScraperConfig::default().with_metrics(["ci_*"]);
        let mut scraper = Scraper::new(config).unwrap();
        let sink = run(&mut scraper, PAYLOAD, &ProcessOptions::default());
        assert!(sink.metrics.is_empty());
    }

    #[test]
    fn test_prefix_is_stripped_before_dispatch() {
        let config = ScraperConfig::default()
            .with_prefix("myapp_")
            .with_metrics(["requests_total", "other_total"]);
        let mut scraper = Scraper::new(config).unwrap();
        let text = "# TYPE myapp_requests_total counter\nmyapp_requests_total 5\n\
                    # TYPE other_total counter\nother_total 6\n";
        let sink = run(&mut scraper, text, &ProcessOptions::default());

        assert_eq!(sink.metrics_named("requests_total")[0].value, 5.0);
        assert_eq!(sink.metrics_named("other_total")[0].value, 6.0);
    }

    #[test]
    fn test_ignored_metrics_are_skipped() {
        let mut config = ScraperConfig::default().with_metrics(["ci_running_builds", "other_metric"]);
        config.ignore_metrics.insert("other_metric".to_string());
        let mut scraper = Scraper::new(config).unwrap();
        let sink = run(&mut scraper, PAYLOAD, &ProcessOptions::default());

        assert_eq!(sink.metrics.len(), 1);
        assert_eq!(sink.metrics[0].name, "ci_running_builds");
    }

    #[test]
    fn test_blacklisted_lines_are_dropped() {
        let mut config = ScraperConfig::default().with_metrics(["ci_created_builds"]);
        config.text_filter_blacklist.push("project=\"a\"".to_string());
        let mut scraper = Scraper::new(config).unwrap();
        let text = "# TYPE ci_created_builds gauge\n\
                    ci_created_builds{project=\"a\"} 1\n\
                    ci_created_builds{project=\"c\"} 2\n";
        let sink = run(&mut scraper, text, &ProcessOptions::default());

        assert_eq!(sink.metrics.len(), 1);
        assert!(sink.metrics[0].has_tag("project:c"));
    }

    #[test]
    fn test_handlers_receive_unmapped_families() {
        let mut scraper = Scraper::new(ScraperConfig::new("svc")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        scraper.register_handler("other_metric", move |family, submitter, sink| {
            counter.fetch_add(1, Ordering::SeqCst);
            submitter.submit("renamed", family, sink);
            Ok(())
        });
        scraper.register_handler("ci_running_builds", |family, _, _| {
            Err(Error::handler(&family.name, "boom"))
        });

        let sink = run(&mut scraper, PAYLOAD, &ProcessOptions::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.metrics.len(), 1);
        assert_eq!(sink.metrics[0].name, "svc.renamed");

        // handlers are bypassed when unmapped metrics are ignored
        let sink = run(
            &mut scraper,
            PAYLOAD,
            &ProcessOptions::default().ignore_unmapped(true),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sink.metrics.is_empty());
    }

    #[test]
    fn test_label_join_dry_run_then_enrichment() {
        let config = ScraperConfig::default().with_metrics(["cpu_usage"]);
        let mut scraper = pod_scraper(config);
        let text = "# TYPE kube_pod_info gauge\nkube_pod_info{pod=\"p1\",node=\"n1\"} 1\n\
                    # TYPE cpu_usage gauge\ncpu_usage{pod=\"p1\"} 0.5\n";
        let options = ProcessOptions::default();

        assert!(scraper.is_dry_run());
        let sink = run(&mut scraper, text, &options);
        assert!(sink.metrics.is_empty());
        assert!(!scraper.is_dry_run());

        let sink = run(&mut scraper, text, &options);
        assert_eq!(sink.metrics.len(), 1);
        assert!(sink.metrics[0].has_tag("node:n1"));
        assert!(sink.metrics[0].has_tag("pod:p1"));
    }

    #[test]
    fn test_consumer_before_source_uses_previous_recording() {
        let config = ScraperConfig::default().with_metrics(["cpu_usage"]);
        let mut scraper = pod_scraper(config);
        let options = ProcessOptions::default();

        run(
            &mut scraper,
            "# TYPE kube_pod_info gauge\nkube_pod_info{pod=\"p1\",node=\"n1\"} 1\n\
             # TYPE cpu_usage gauge\ncpu_usage{pod=\"p1\"} 0.5\n",
            &options,
        );
        // the pod moved, but the consumer is emitted before the source
        let sink = run(
            &mut scraper,
            "# TYPE cpu_usage gauge\ncpu_usage{pod=\"p1\"} 0.5\n\
             # TYPE kube_pod_info gauge\nkube_pod_info{pod=\"p1\",node=\"n2\"} 1\n",
            &options,
        );
        assert!(sink.metrics[0].has_tag("node:n1"));
        assert_eq!(
            scraper.label_joiner().lookup("pod", "p1"),
            Some(&vec![("node".to_string(), "n2".to_string())])
        );
    }

    #[test]
    fn test_join_source_recorded_even_when_ignored() {
        let mut config = ScraperConfig::default().with_metrics(["cpu_usage"]);
        config.ignore_metrics.insert("kube_pod_info".to_string());
        let mut scraper = pod_scraper(config);
        let text = "# TYPE kube_pod_info gauge\nkube_pod_info{pod=\"p1\",node=\"n1\"} 1\n\
                    # TYPE cpu_usage gauge\ncpu_usage{pod=\"p1\"} 0.5\n";
        run(&mut scraper, text, &ProcessOptions::default());
        let sink = run(&mut scraper, text, &ProcessOptions::default());

        assert_eq!(sink.metrics.len(), 1);
        assert!(sink.metrics[0].has_tag("node:n1"));
    }

    #[test]
    fn test_unreferenced_join_keys_are_collected() {
        let config = ScraperConfig::default().with_metrics(["cpu_usage"]);
        let mut scraper = pod_scraper(config);
        let options = ProcessOptions::default();

        run(
            &mut scraper,
            "# TYPE kube_pod_info gauge\nkube_pod_info{pod=\"p1\",node=\"n1\"} 1\n\
             # TYPE cpu_usage gauge\ncpu_usage{pod=\"p1\"} 0.5\n",
            &options,
        );
        assert!(scraper.label_joiner().lookup("pod", "p1").is_some());

        run(&mut scraper, "# TYPE cpu_usage gauge\ncpu_usage{pod=\"p2\"} 0.5\n", &options);
        assert!(scraper.label_joiner().lookup("pod", "p1").is_none());
    }

    #[test]
    fn test_scraper_without_joins_skips_dry_run() {
        let config = ScraperConfig::default().with_metrics(["ci_running_builds"]);
        let mut scraper = Scraper::new(config).unwrap();
        let sink = run(&mut scraper, PAYLOAD, &ProcessOptions::default());
        assert_eq!(sink.metrics.len(), 1);
    }

    #[test]
    fn test_invalid_wildcard_is_rejected_at_construction() {
        let config =
            ScraperConfig::default().with_metrics(["ci_running_builds", "level_[z-a]"]);
        let err = Scraper::new(config).unwrap_err();
        assert!(matches!(err, Error::Pattern { ref pattern, .. } if pattern == "level_[z-a]"));
    }

    #[tokio::test]
    async fn test_invalid_header_reports_critical_health() {
        let mut config = ScraperConfig::new("app").with_health_service_check(true);
        config
            .extra_headers
            .insert("bad header".to_string(), "x".to_string());
        let mut scraper = Scraper::new(config).unwrap();
        let mut sink = RecordingSink::new();

        let err = scraper
            .process(
                "http://127.0.0.1:9/metrics",
                &ProcessOptions::default(),
                &mut sink,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidHeader(_)));
        let health = sink.service_checks_named("app.prometheus.health");
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].status, ServiceCheckStatus::Critical);
        assert_eq!(health[0].tags, ["endpoint:http://127.0.0.1:9/metrics"]);
    }
}
