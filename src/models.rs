use serde::{Deserialize, Serialize};

/// A row of the `coupons` table.
///
/// `claimed_by` is `Some` exactly when `is_claimed` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coupon {
    pub id: i32,
    pub code: String,
    pub is_claimed: bool,
    pub claimed_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub message: String,
    pub coupon: Coupon,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Result of a claim attempt that made it past request parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(Coupon),
    /// The requester already holds a coupon (cookie or identity).
    AlreadyClaimed,
    /// No unclaimed rows remain.
    Exhausted,
}
