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

//! Cross-family label enrichment.
//!
//! A join source such as `kube_pod_info{pod="p1",node="n1"}` teaches the
//! joiner that `pod=p1` goes with `node=n1`. Any later sample carrying
//! `pod="p1"` then gets `node="n1"` added to its labels.
//!
//! Recordings survive from one scrape to the next. Source and consumer
//! families may come in any order within a payload, so a consumer seen
//! before its source in the same scrape is enriched from the previous
//! scrape's recording.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::config::LabelJoinRule;
use super::family::MetricFamily;

/// Companion labels recorded for one join key value.
pub type Companions = Vec<(String, String)>;

#[derive(Debug, Default)]
pub struct LabelJoiner {
    /// Join source family name to rule.
    rules: HashMap<String, LabelJoinRule>,
    /// Matched label name -> matched value -> companions.
    mapping: HashMap<String, HashMap<String, Companions>>,
    /// Join keys seen during the current scrape.
    active: HashMap<String, HashSet<String>>,
    /// Union of every rule's `label_to_match`.
    watched: HashSet<String>,
}

impl LabelJoiner {
    pub fn new(rules: HashMap<String, LabelJoinRule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.rules.is_empty()
    }

    pub fn watched_labels(&self) -> &HashSet<String> {
        &self.watched
    }

    pub fn lookup(&self, label: &str, value: &str) -> Option<&Companions> {
        self.mapping.get(label).and_then(|values| values.get(value))
    }

    /// Number of recorded join key values across all matched labels.
    pub fn len(&self) -> usize {
        self.mapping.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget marks left by an aborted scrape and build the watched label
    /// set the first time rules are available.
    pub fn begin_scrape(&mut self) {
        self.active.clear();
        if self.watched.is_empty() {
            self.watched = self
                .rules
                .values()
                .map(|rule| rule.label_to_match.clone())
                .collect();
        }
    }

    /// Record companions from a join source family. Other families are ignored.
    pub fn record(&mut self, family: &MetricFamily) {
        let Some(rule) = self.rules.get(&family.name) else {
            return;
        };

        for sample in &family.samples {
            let Some(matched_value) = sample.labels.get(&rule.label_to_match) else {
                continue;
            };
            let companions: Companions = rule
                .labels_to_get
                .iter()
                .filter_map(|name| {
                    sample
                        .labels
                        .get(name)
                        .map(|value| (name.clone(), value.clone()))
                })
                .collect();

            self.mapping
                .entry(rule.label_to_match.clone())
                .or_default()
                .insert(matched_value.clone(), companions);
        }
    }

    /// Mark the join keys of every sample as active and copy their recorded
    /// companions in, replacing labels of the same name.
    pub fn enrich(&mut self, family: &mut MetricFamily) {
        if !self.is_enabled() {
            return;
        }

        for sample in &mut family.samples {
            let keys: Vec<(String, String)> = self
                .watched
                .iter()
                .filter_map(|label| {
                    sample
                        .labels
                        .get(label)
                        .map(|value| (label.clone(), value.clone()))
                })
                .collect();

            for (label, value) in keys {
                if let Some(companions) = self.mapping.get(&label).and_then(|m| m.get(&value)) {
                    for (name, companion) in companions {
                        sample.labels.insert(name.clone(), companion.clone());
                    }
                }
                self.active.entry(label).or_default().insert(value);
            }
        }
    }

    /// Drop recordings whose key was not seen during the scrape that just
    /// ended, then forget which keys were seen.
    pub fn collect_garbage(&mut self) {
        let before = self.len();
        for (label, values) in self.mapping.iter_mut() {
            let active = self.active.get(label);
            values.retain(|value, _| active.is_some_and(|seen| seen.contains(value)));
        }
        self.mapping.retain(|_, values| !values.is_empty());
        self.active.clear();

        let evicted = before - self.len();
        if evicted > 0 {
            debug!("Evicted {evicted} stale label join entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{Labels, Sample};
    use crate::scraper::family::MetricKind;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn gauge(name: &str, samples: &[&[(&str, &str)]]) -> MetricFamily {
        MetricFamily::new(
            name,
            MetricKind::Gauge,
            samples
                .iter()
                .map(|pairs| Sample::new(name, labels(pairs), 1.0))
                .collect(),
        )
    }

    fn pod_joiner() -> LabelJoiner {
        let mut joiner = LabelJoiner::new(HashMap::from([(
            "kube_pod_info".to_string(),
            LabelJoinRule::new("pod", ["node", "host_ip"]),
        )]));
        joiner.begin_scrape();
        joiner
    }

    #[test]
    fn test_watched_labels_built_from_rules() {
        let joiner = pod_joiner();
        assert_eq!(joiner.watched_labels(), &HashSet::from(["pod".to_string()]));
        assert!(LabelJoiner::default().watched_labels().is_empty());
        assert!(!LabelJoiner::default().is_enabled());
    }

    #[test]
    fn test_record_keeps_rule_order_and_skips_missing_companions() {
        let mut joiner = pod_joiner();
        joiner.record(&gauge(
            "kube_pod_info",
            &[&[("pod", "p1"), ("host_ip", "10.0.0.1"), ("node", "n1"), ("ns", "x")]],
        ));
        joiner.record(&gauge("kube_pod_info", &[&[("pod", "p2"), ("node", "n2")]]));

        assert_eq!(
            joiner.lookup("pod", "p1"),
            Some(&vec![
                ("node".to_string(), "n1".to_string()),
                ("host_ip".to_string(), "10.0.0.1".to_string()),
            ])
        );
        assert_eq!(
            joiner.lookup("pod", "p2"),
            Some(&vec![("node".to_string(), "n2".to_string())])
        );
    }

    #[test]
    fn test_record_skips_samples_without_match_label() {
        let mut joiner = pod_joiner();
        joiner.record(&gauge("kube_pod_info", &[&[("node", "n1")]]));
        assert!(joiner.is_empty());
    }

    #[test]
    fn test_non_source_families_are_not_recorded() {
        let mut joiner = pod_joiner();
        joiner.record(&gauge("cpu_usage", &[&[("pod", "p1"), ("node", "n1")]]));
        assert!(joiner.is_empty());
    }

    #[test]
    fn test_enrich_overwrites_existing_labels() {
        let mut joiner = pod_joiner();
        joiner.record(&gauge("kube_pod_info", &[&[("pod", "p1"), ("node", "n1")]]));

        let mut consumer = gauge("cpu_usage", &[&[("pod", "p1"), ("node", "stale")], &[]]);
        joiner.enrich(&mut consumer);

        assert_eq!(consumer.samples[0].labels, labels(&[("pod", "p1"), ("node", "n1")]));
        assert!(consumer.samples[1].labels.is_empty());
    }

    #[test]
    fn test_garbage_collection_evicts_unseen_keys() {
        let mut joiner = pod_joiner();
        joiner.record(&gauge("kube_pod_info", &[&[("pod", "p1"), ("node", "n1")]]));
        joiner.record(&gauge("kube_pod_info", &[&[("pod", "p2"), ("node", "n2")]]));
        joiner.enrich(&mut gauge("cpu_usage", &[&[("pod", "p1")], &[("pod", "p2")]]));
        joiner.collect_garbage();
        assert_eq!(joiner.len(), 2);

        // next scrape: only p2 is referenced
        joiner.begin_scrape();
        joiner.enrich(&mut gauge("cpu_usage", &[&[("pod", "p2")]]));
        joiner.collect_garbage();

        assert!(joiner.lookup("pod", "p1").is_none());
        assert!(joiner.lookup("pod", "p2").is_some());

        // and a scrape referencing nothing empties the mapping
        joiner.begin_scrape();
        joiner.collect_garbage();
        assert!(joiner.is_empty());
    }

    #[test]
    fn test_aborted_scrape_marks_do_not_survive() {
        let mut joiner = pod_joiner();
        joiner.record(&gauge("kube_pod_info", &[&[("pod", "p1"), ("node", "n1")]]));
        joiner.collect_garbage();
        joiner.record(&gauge("kube_pod_info", &[&[("pod", "p1"), ("node", "n1")]]));

        // scrape references p1, then fails before garbage collection
        joiner.begin_scrape();
        joiner.enrich(&mut gauge("cpu_usage", &[&[("pod", "p1")]]));

        // next scrape references nothing
        joiner.begin_scrape();
        joiner.enrich(&mut gauge("other", &[&[]]));
        joiner.collect_garbage();

        assert!(joiner.lookup("pod", "p1").is_none());
    }
}
