//! Coupon persistence.
//!
//! The database is the single source of truth; nothing here caches rows.
//! Every claim goes through one atomic conditional update so that two
//! concurrent requests can never be handed the same coupon.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ClaimOutcome, Coupon};

mod memory;
mod postgres;

pub use memory::MemoryCouponStore;
pub use postgres::PgCouponStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// All rows with `is_claimed = false`, lowest id first.
    async fn list_unclaimed(&self) -> Result<Vec<Coupon>, StoreError>;

    /// Any claimed row owned by `identity`.
    async fn find_claim_by(&self, identity: &str) -> Result<Option<Coupon>, StoreError>;

    /// Atomically flips the lowest-id unclaimed row to claimed by `identity`.
    ///
    /// Returns `None` when every row is already claimed.
    async fn claim_next(&self, identity: &str) -> Result<Option<Coupon>, StoreError>;

    /// Ownership check and allocation as one critical section: an identity
    /// that already owns a row is never handed a second one.
    async fn claim_exclusive(&self, identity: &str) -> Result<ClaimOutcome, StoreError>;
}
