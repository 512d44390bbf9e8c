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

//! Seams between the scraping core and its collaborators.
//!
//! The metrics backend is reached only through [`MetricSink`], and the
//! collection loop only knows checks through [`AgentCheck`].

pub mod check;
pub mod sink;

pub use check::AgentCheck;
pub use sink::{
    JsonLinesSink, MetricSink, MetricSubmission, RecordingSink, ServiceCheckStatus,
    ServiceCheckSubmission, SubmissionKind,
};
