// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod database;
mod jobs;
mod logging;
mod node;
mod ranking;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use jobs::{JobsConfig, JobsConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use node::{NodeConfig, NodeConfigLayer};
pub use ranking::{RankingConfig, RankingConfigLayer};
