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

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every configured check on an interval, writing JSON lines to stdout.
    Run(RunArgs),
    /// Scrape a single Prometheus endpoint once and print what would be submitted.
    Scrape(ScrapeArgs),
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "promcheck.toml")]
    pub config: PathBuf,
    /// The interval in seconds between collections. Overrides `interval_secs`.
    #[arg(short, long)]
    pub interval: Option<u64>,
    /// Run every check once and exit.
    #[arg(long)]
    pub once: bool,
}

#[derive(Parser, Clone)]
pub struct ScrapeArgs {
    /// The metrics endpoint, e.g. http://localhost:9090/metrics
    pub url: String,
    /// Namespace prepended to every submitted metric name.
    #[arg(short, long, default_value = "")]
    pub namespace: String,
    /// Metric names or glob patterns to submit. Everything when omitted.
    #[arg(short, long = "metric", num_args = 1..)]
    pub metrics: Vec<String>,
    /// Extra tags, as `key:value`, added to every series.
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,
    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}
