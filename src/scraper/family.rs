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
use std::fmt;

use crate::parsing::{ParsedFamily, Sample};

/// The family types the dispatcher knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
    Histogram,
}

impl MetricKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "summary" => Some(Self::Summary),
            "histogram" => Some(Self::Histogram),
            _ => None,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Summary => "summary",
            Self::Histogram => "histogram",
        };
        f.write_str(name)
    }
}

/// A family whose type has been resolved to one of the known kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    /// Family name with the configured prefix removed.
    pub name: String,
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, kind: MetricKind, samples: Vec<Sample>) -> Self {
        Self {
            name: name.into(),
            kind,
            samples,
        }
    }

    /// Apply type overrides and prefix stripping.
    ///
    /// Returns `None` for families whose effective type is not a known kind.
    pub fn resolve(
        parsed: ParsedFamily,
        type_overrides: &HashMap<String, String>,
        prefix: &str,
    ) -> Option<Self> {
        let declared = type_overrides
            .get(&parsed.name)
            .map(String::as_str)
            .unwrap_or(parsed.declared_type.as_str());
        let kind = MetricKind::parse(declared)?;

        let mut name = parsed.name;
        if !prefix.is_empty() && name.starts_with(prefix) {
            name.drain(..prefix.len());
        }

        Some(Self {
            name,
            kind,
            samples: parsed.samples,
        })
    }
}
