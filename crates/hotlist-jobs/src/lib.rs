// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scheduled jobs for the hotlist server.
//!
//! Two ways to run work on a timer live here. [`JobRunner`] drives
//! in-process [`ScheduledJob`]s on an interval or cron schedule, and
//! [`JobDispatcher`] claims rows from the shared job store so that each
//! persisted job runs on exactly one node per occurrence.

pub mod dispatcher;
pub mod error;
pub mod health;
pub mod job;
pub mod preempt;
pub mod runner;
pub mod schedule;

pub use dispatcher::{Dispatch, Executor, JobDispatcher, LocalFuncExecutor};
pub use error::{JobError, Result};
pub use health::{HealthState, JobHealthStatus, JobsHealthStatus, LastRunInfo};
pub use job::ScheduledJob;
pub use preempt::{ClaimedJob, CronJobService};
pub use runner::JobRunner;
pub use schedule::{next_occurrence, validate_cron_expression, JobSchedule};
