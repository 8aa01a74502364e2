//! User account and quota types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account row, created lazily on first chat attempt.
///
/// `daily_message_count` is only meaningful relative to `last_reset_date`:
/// when the stored date is not today, the count is stale and counts as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub daily_message_count: u32,
    pub last_reset_date: NaiveDate,
}

/// Outcome of an atomic quota check-and-consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: u32,
}

impl QuotaDecision {
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
        }
    }

    pub fn denied() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }
}
