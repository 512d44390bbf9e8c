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

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

/// Status of a service check, ordered like the agent's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceCheckStatus {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

/// How the backend should interpret a submitted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Gauge,
    /// The backend computes the per-second derivative.
    Rate,
    MonotonicCount,
}

/// The metrics backend: where gauges, rates, monotonic counts and
/// service checks end up.
///
/// `hostname` is `None` when the series belongs to the default host.
pub trait MetricSink: Send {
    fn gauge(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>);

    fn rate(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>);

    fn monotonic_count(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>);

    fn service_check(
        &mut self,
        name: &str,
        status: ServiceCheckStatus,
        tags: &[String],
        message: Option<&str>,
    );

    /// Dispatch on [`SubmissionKind`].
    fn submit(
        &mut self,
        kind: SubmissionKind,
        name: &str,
        value: f64,
        tags: &[String],
        hostname: Option<&str>,
    ) {
        match kind {
            SubmissionKind::Gauge => self.gauge(name, value, tags, hostname),
            SubmissionKind::Rate => self.rate(name, value, tags, hostname),
            SubmissionKind::MonotonicCount => self.monotonic_count(name, value, tags, hostname),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSubmission {
    pub kind: SubmissionKind,
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    pub hostname: Option<String>,
}

impl MetricSubmission {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCheckSubmission {
    pub name: String,
    pub status: ServiceCheckStatus,
    pub tags: Vec<String>,
    pub message: Option<String>,
}

/// Keeps every submission in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub metrics: Vec<MetricSubmission>,
    pub service_checks: Vec<ServiceCheckSubmission>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics_named(&self, name: &str) -> Vec<&MetricSubmission> {
        self.metrics.iter().filter(|m| m.name == name).collect()
    }

    pub fn service_checks_named(&self, name: &str) -> Vec<&ServiceCheckSubmission> {
        self.service_checks
            .iter()
            .filter(|sc| sc.name == name)
            .collect()
    }

    pub fn clear(&mut self) {
        self.metrics.clear();
        self.service_checks.clear();
    }

    fn record(
        &mut self,
        kind: SubmissionKind,
        name: &str,
        value: f64,
        tags: &[String],
        hostname: Option<&str>,
    ) {
        self.metrics.push(MetricSubmission {
            kind,
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
            hostname: hostname.map(str::to_string),
        });
    }
}

impl MetricSink for RecordingSink {
    fn gauge(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>) {
        self.record(SubmissionKind::Gauge, name, value, tags, hostname);
    }

    fn rate(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>) {
        self.record(SubmissionKind::Rate, name, value, tags, hostname);
    }

    fn monotonic_count(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>) {
        self.record(SubmissionKind::MonotonicCount, name, value, tags, hostname);
    }

    fn service_check(
        &mut self,
        name: &str,
        status: ServiceCheckStatus,
        tags: &[String],
        message: Option<&str>,
    ) {
        self.service_checks.push(ServiceCheckSubmission {
            name: name.to_string(),
            status,
            tags: tags.to_vec(),
            message: message.map(str::to_string),
        });
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    record: JsonRecord<'a>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonRecord<'a> {
    Metric {
        kind: SubmissionKind,
        name: &'a str,
        value: f64,
        tags: &'a [String],
        host: &'a str,
    },
    ServiceCheck {
        name: &'a str,
        status: ServiceCheckStatus,
        tags: &'a [String],
        host: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
    },
}

/// Writes one JSON object per submission, for piping into other tools.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
    default_hostname: String,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W, default_hostname: impl Into<String>) -> Self {
        Self {
            writer,
            default_hostname: default_hostname.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_metric(
        &mut self,
        kind: SubmissionKind,
        name: &str,
        value: f64,
        tags: &[String],
        hostname: Option<&str>,
    ) {
        let record = JsonRecord::Metric {
            kind,
            name,
            value,
            tags,
            host: hostname.unwrap_or(&self.default_hostname),
        };
        write_record(&mut self.writer, record);
    }
}

fn write_record<W: Write>(writer: &mut W, record: JsonRecord<'_>) {
    let line = JsonLine {
        timestamp: Utc::now(),
        record,
    };
    let result = serde_json::to_writer(&mut *writer, &line)
        .map_err(std::io::Error::from)
        .and_then(|()| writer.write_all(b"\n"));
    if let Err(e) = result {
        warn!("Failed to write submission: {e}");
    }
}

impl<W: Write + Send> MetricSink for JsonLinesSink<W> {
    fn gauge(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>) {
        self.write_metric(SubmissionKind::Gauge, name, value, tags, hostname);
    }

    fn rate(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>) {
        self.write_metric(SubmissionKind::Rate, name, value, tags, hostname);
    }

    fn monotonic_count(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>) {
        self.write_metric(SubmissionKind::MonotonicCount, name, value, tags, hostname);
    }

    fn service_check(
        &mut self,
        name: &str,
        status: ServiceCheckStatus,
        tags: &[String],
        message: Option<&str>,
    ) {
        let record = JsonRecord::ServiceCheck {
            name,
            status,
            tags,
            host: &self.default_hostname,
            message,
        };
        write_record(&mut self.writer, record);
    }
}
