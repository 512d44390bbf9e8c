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

//! Incremental tokenizer for the Prometheus text exposition format.
//!
//! Lines are pushed one at a time and grouped into [`ParsedFamily`] values.
//! A family is handed back as soon as a line belonging to a different family
//! shows up, so a scrape never needs to hold more than one family in memory.
//!
//! ```text
//! # HELP http_requests_total Total requests.
//! # TYPE http_requests_total counter
//! http_requests_total{method="get",code="200"} 1027 1395066363000
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

/// Label set of a sample. Ordered so that derived tags are stable.
pub type Labels = BTreeMap<String, String>;

/// One labelled observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Full sample name, including `_bucket`/`_sum`/`_count` suffixes.
    pub name: String,
    pub labels: Labels,
    pub value: f64,
}

impl Sample {
    pub fn new(name: impl Into<String>, labels: Labels, value: f64) -> Self {
        Self {
            name: name.into(),
            labels,
            value,
        }
    }
}

/// A family as declared in the payload, before type resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFamily {
    pub name: String,
    /// Lower-cased type from the `# TYPE` line, `untyped` when absent.
    pub declared_type: String,
    pub samples: Vec<Sample>,
}

impl ParsedFamily {
    fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: "untyped".to_string(),
            samples: Vec::new(),
        }
    }

    /// Whether a sample with this name is part of the family.
    fn owns(&self, sample_name: &str) -> bool {
        if sample_name == self.name {
            return true;
        }
        let Some(suffix) = sample_name.strip_prefix(self.name.as_str()) else {
            return false;
        };
        match self.declared_type.as_str() {
            "histogram" => matches!(suffix, "_bucket" | "_sum" | "_count"),
            "summary" => matches!(suffix, "_sum" | "_count"),
            _ => false,
        }
    }
}

/// Groups exposition lines into families.
#[derive(Debug, Default)]
pub struct FamilyParser {
    current: Option<ParsedFamily>,
}

impl FamilyParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns the previous family when this line opens a new one.
    pub fn push_line(&mut self, line: &str) -> Option<ParsedFamily> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(comment) = line.strip_prefix('#') {
            return self.push_comment(comment);
        }

        match parse_sample(line) {
            Ok(sample) => self.push_sample(sample),
            Err(reason) => {
                warn!("Skipping malformed exposition line {line:?}: {reason}");
                None
            }
        }
    }

    /// Flush the family still being built at end of input.
    pub fn finish(&mut self) -> Option<ParsedFamily> {
        self.current.take()
    }

    fn push_comment(&mut self, comment: &str) -> Option<ParsedFamily> {
        let (keyword, rest) = split_token(comment.trim_start());
        let (name, rest) = split_token(rest);
        if name.is_empty() {
            return None;
        }

        match keyword {
            "TYPE" => {
                let completed = self.open(name);
                if let Some(family) = self.current.as_mut() {
                    family.declared_type = rest.trim().to_ascii_lowercase();
                }
                completed
            }
            "HELP" => self.open(name),
            _ => None,
        }
    }

    fn push_sample(&mut self, sample: Sample) -> Option<ParsedFamily> {
        if let Some(family) = self.current.as_mut() {
            if family.owns(&sample.name) {
                family.samples.push(sample);
                return None;
            }
        }

        let mut family = ParsedFamily::untyped(sample.name.clone());
        family.samples.push(sample);
        self.current.replace(family)
    }

    fn open(&mut self, name: &str) -> Option<ParsedFamily> {
        if self.current.as_ref().is_some_and(|f| f.name == name) {
            return None;
        }
        self.current.replace(ParsedFamily::untyped(name))
    }
}

/// Parse a complete payload held in memory.
pub fn parse_text(text: &str) -> Vec<ParsedFamily> {
    let mut parser = FamilyParser::new();
    let mut families: Vec<ParsedFamily> = text
        .lines()
        .filter_map(|line| parser.push_line(line))
        .collect();
    families.extend(parser.finish());
    families
}

fn metric_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*").expect("metric name regex is valid")
    })
}

/// Parse `name[{labels}] value [timestamp]`.
fn parse_sample(line: &str) -> Result<Sample, &'static str> {
    let name = metric_name_regex()
        .find(line)
        .map(|m| m.as_str())
        .ok_or("invalid metric name")?;
    let mut rest = &line[name.len()..];

    let mut labels = Labels::new();
    if let Some(inner) = rest.strip_prefix('{') {
        let (parsed, remaining) = parse_labels(inner)?;
        labels = parsed;
        rest = remaining;
    } else if !rest.starts_with(char::is_whitespace) {
        return Err("invalid metric name");
    }

    let mut fields = rest.split_whitespace();
    let value = fields.next().ok_or("missing value")?;
    let value = parse_value(value).ok_or("invalid value")?;
    if let Some(timestamp) = fields.next() {
        timestamp.parse::<f64>().map_err(|_| "invalid timestamp")?;
    }
    if fields.next().is_some() {
        return Err("unexpected trailing content");
    }

    Ok(Sample::new(name, labels, value))
}

/// Parse the inside of `{...}`, returning the labels and whatever follows `}`.
fn parse_labels(input: &str) -> Result<(Labels, &str), &'static str> {
    let mut labels = Labels::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest.find('=').ok_or("label without value")?;
        let name = rest[..eq].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err("invalid label name");
        }
        rest = rest[eq + 1..]
            .trim_start()
            .strip_prefix('"')
            .ok_or("label value is not quoted")?;

        let (value, after) = parse_quoted(rest)?;
        labels.insert(name.to_string(), value);

        rest = after.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
        } else if !rest.starts_with('}') {
            return Err("expected ',' or '}' after label");
        }
    }
}

/// Read an escaped label value up to its closing quote.
fn parse_quoted(input: &str) -> Result<(String, &str), &'static str> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &input[idx + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            },
            _ => value.push(c),
        }
    }
    Err("unterminated label value")
}

fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => raw.parse::<f64>().ok(),
    }
}

fn split_token(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}
