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

//! Case-sensitive shell-style patterns for metric names.
//!
//! `*` matches any run of characters, `?` one character, `[abc]` / `[a-z]`
//! a set and `[!abc]` its complement. Everything else is literal.

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

const GLOB_CHARS: [char; 3] = ['*', '?', '['];

#[derive(Debug, Clone)]
pub struct WildcardPattern {
    pattern: String,
    regex: Regex,
}

impl WildcardPattern {
    /// Whether a mapping key should be treated as a pattern.
    pub fn is_wildcard(key: &str) -> bool {
        key.contains(GLOB_CHARS)
    }

    pub fn compile(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(&translate(pattern))
            .build()
            .map_err(|source| Error::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Translate a glob into an anchored regular expression.
fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^(?s:");
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut j = i;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    // unterminated set is a literal bracket
                    out.push_str(r"\[");
                } else {
                    out.push_str(&translate_set(&chars[i..j]));
                    i = j + 1;
                }
            }
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push_str(")$");
    out
}

fn translate_set(set: &[char]) -> String {
    let mut out = String::from("[");
    let mut members = set;
    if let Some((&'!', rest)) = set.split_first() {
        out.push('^');
        members = rest;
    }
    for &c in members {
        match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, name: &str) -> bool {
        WildcardPattern::compile(pattern).unwrap().matches(name)
    }

    #[test]
    fn test_is_wildcard() {
        assert!(WildcardPattern::is_wildcard("ci_*"));
        assert!(WildcardPattern::is_wildcard("go_gc_duration_?"));
        assert!(WildcardPattern::is_wildcard("http_[45]xx"));
        assert!(!WildcardPattern::is_wildcard("ci_created_builds"));
    }

    #[test]
    fn test_star_and_question_mark() {
        assert!(matches("ci_*", "ci_created_builds"));
        assert!(matches("ci_*", "ci_"));
        assert!(!matches("ci_*", "other_metric"));
        assert!(!matches("ci_*", "xci_created"));
        assert!(matches("sidekiq_queue_?", "sidekiq_queue_a"));
        assert!(!matches("sidekiq_queue_?", "sidekiq_queue_ab"));
    }

    #[test]
    fn test_match_is_case_sensitive() {
        assert!(!matches("CI_*", "ci_created_builds"));
    }

    #[test]
    fn test_sets() {
        assert!(matches("http_[45]xx", "http_4xx"));
        assert!(!matches("http_[45]xx", "http_2xx"));
        assert!(matches("http_[!45]xx", "http_2xx"));
        assert!(matches("level_[a-c]", "level_b"));
        assert!(!matches("level_[a-c]", "level_d"));
    }

    #[test]
    fn test_literals_are_escaped() {
        assert!(matches("a.b*", "a.bc"));
        assert!(!matches("a.b*", "axbc"));
        assert!(matches("unterminated[", "unterminated["));
    }
}
