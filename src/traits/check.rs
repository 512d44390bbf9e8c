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

use async_trait::async_trait;

use super::sink::MetricSink;
use crate::error::Result;

/// One configured check instance, run once per collection interval.
///
/// Implementations keep whatever state has to survive between runs
/// (scrapers, label-join caches) and report everything through the sink.
#[async_trait]
pub trait AgentCheck: Send {
    /// Name used in logs, e.g. `gitlab` or `prometheus`.
    fn name(&self) -> &str;

    /// Run one collection cycle.
    ///
    /// # Errors
    ///
    /// Returns an error when the cycle could not complete. Whatever was
    /// submitted before the failure stays submitted.
    async fn check(&mut self, sink: &mut dyn MetricSink) -> Result<()>;
}
