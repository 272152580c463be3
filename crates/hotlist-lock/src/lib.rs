// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lease-based mutual exclusion between worker nodes.
//!
//! A lock is an expiring row owned by a random identity. Holders keep it
//! alive with [`AutoRenew`]; anyone can take it over once it expires.

pub mod error;
pub mod lock;
pub mod renew;
pub mod sqlite;

pub use error::{LockError, Result};
pub use lock::{AcquireOptions, LockService, LockToken, RetryPolicy};
pub use renew::{AutoRenew, RenewOptions};
pub use sqlite::SqliteLockService;
