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

//! Prometheus exposition scraping and metric remapping for agent checks.
//!
//! A [`scraper::Scraper`] fetches a Prometheus text endpoint, enriches
//! samples with labels joined from other families, and submits the metrics
//! its policy selects to a [`traits::MetricSink`]. Checks such as
//! [`checks::GitlabCheck`] bundle scrapers with their own service checks.
//!
//! ```rust,no_run
//! use promcheck::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = ScraperConfig::new("app").with_metrics(["http_requests_total"]);
//! let mut scraper = Scraper::new(config)?;
//! let mut sink = RecordingSink::new();
//! scraper
//!     .process("http://localhost:9090/metrics", &ProcessOptions::default(), &mut sink)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod checks;
pub mod cli;
pub mod error;
pub mod network;
pub mod parsing;
pub mod prelude;
pub mod scraper;
pub mod traits;

pub mod common {
    pub mod config;
}
