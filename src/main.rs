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

use std::io::Stdout;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promcheck::checks::{GenericInstance, GenericPrometheusCheck, GitlabCheck, MetricEntry};
use promcheck::cli::{Cli, Commands, RunArgs, ScrapeArgs};
use promcheck::common::config::AgentConfig;
use promcheck::error::Result;
use promcheck::traits::{AgentCheck, JsonLinesSink};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promcheck=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Scrape(args) => scrape(args).await,
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn default_hostname() -> String {
    whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string())
}

fn stdout_sink() -> JsonLinesSink<Stdout> {
    JsonLinesSink::new(std::io::stdout(), default_hostname())
}

fn build_checks(config: &AgentConfig) -> Result<Vec<Box<dyn AgentCheck>>> {
    let mut checks: Vec<Box<dyn AgentCheck>> = Vec::new();
    for instance in &config.gitlab {
        checks.push(Box::new(GitlabCheck::new(instance.clone())?));
    }
    for instance in &config.prometheus {
        checks.push(Box::new(GenericPrometheusCheck::new(instance.clone())?));
    }
    Ok(checks)
}

async fn run_checks(checks: &mut [Box<dyn AgentCheck>], sink: &mut JsonLinesSink<Stdout>) {
    for check in checks.iter_mut() {
        if let Err(e) = check.check(sink).await {
            warn!(check = check.name(), error = %e, "Check failed");
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = AgentConfig::load(&args.config)?;
    let interval_secs = args.interval.unwrap_or(config.interval_secs).max(1);
    let mut checks = build_checks(&config)?;
    let mut sink = stdout_sink();

    info!(
        checks = checks.len(),
        interval_secs,
        config = %args.config.display(),
        "Starting collection loop"
    );

    let mut tick = interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                run_checks(&mut checks, &mut sink).await;
                if args.once {
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }
    Ok(())
}

async fn scrape(args: ScrapeArgs) -> Result<()> {
    let mut instance = GenericInstance::new(args.url, args.namespace);
    instance.metrics = if args.metrics.is_empty() {
        vec![MetricEntry::Name("*".to_string())]
    } else {
        args.metrics.into_iter().map(MetricEntry::Name).collect()
    };
    instance.settings.tags = args.tags;
    instance.settings.prometheus_timeout = args.timeout;

    let mut check = GenericPrometheusCheck::new(instance)?;
    check.check(&mut stdout_sink()).await
}
