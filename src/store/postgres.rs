use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use tracing::{debug, info};

use super::{CouponStore, StoreError};
use crate::{
    config::DatabaseConfig,
    models::{ClaimOutcome, Coupon},
};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS coupons (
    id SERIAL PRIMARY KEY,
    code TEXT NOT NULL,
    is_claimed BOOLEAN NOT NULL DEFAULT false,
    claimed_by TEXT
)";

const LIST_UNCLAIMED: &str = "SELECT id, code, is_claimed, claimed_by FROM coupons \
     WHERE is_claimed = false ORDER BY id";

const FIND_CLAIM: &str = "SELECT id, code, is_claimed, claimed_by FROM coupons \
     WHERE claimed_by = $1 AND is_claimed = true LIMIT 1";

// SKIP LOCKED keeps concurrent claimers off each other's candidate row, and
// the outer predicate re-checks the flag after any lock wait.
const CLAIM_NEXT: &str = "UPDATE coupons SET is_claimed = true, claimed_by = $1 \
     WHERE id = (SELECT id FROM coupons WHERE is_claimed = false ORDER BY id LIMIT 1 FOR UPDATE SKIP LOCKED) \
     AND is_claimed = false \
     RETURNING id, code, is_claimed, claimed_by";

const LOCK_IDENTITY: &str = "SELECT pg_advisory_xact_lock(hashtext($1))";

#[derive(Clone)]
pub struct PgCouponStore {
    pool: PgPool,
}

impl PgCouponStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let ssl_mode = if config.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        };

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(
            "Connected to PostgreSQL at {}:{}/{}",
            config.host, config.port, config.name
        );
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `coupons` table if it is missing. Rows are never inserted here.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CouponStore for PgCouponStore {
    async fn list_unclaimed(&self) -> Result<Vec<Coupon>, StoreError> {
        debug!("Listing unclaimed coupons");
        let coupons = sqlx::query_as::<_, Coupon>(LIST_UNCLAIMED)
            .fetch_all(&self.pool)
            .await?;
        Ok(coupons)
    }

    async fn find_claim_by(&self, identity: &str) -> Result<Option<Coupon>, StoreError> {
        debug!("Looking up claims by {}", identity);
        let coupon = sqlx::query_as::<_, Coupon>(FIND_CLAIM)
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;
        Ok(coupon)
    }

    async fn claim_next(&self, identity: &str) -> Result<Option<Coupon>, StoreError> {
        debug!("Claiming next coupon for {}", identity);
        let coupon = sqlx::query_as::<_, Coupon>(CLAIM_NEXT)
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;
        Ok(coupon)
    }

    async fn claim_exclusive(&self, identity: &str) -> Result<ClaimOutcome, StoreError> {
        debug!("Claiming exclusively for {}", identity);
        let mut tx = self.pool.begin().await?;

        // Serializes claimers sharing an identity until commit.
        sqlx::query(LOCK_IDENTITY)
            .bind(identity)
            .execute(&mut *tx)
            .await?;

        let owned = sqlx::query_as::<_, Coupon>(FIND_CLAIM)
            .bind(identity)
            .fetch_optional(&mut *tx)
            .await?;
        if owned.is_some() {
            tx.rollback().await?;
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let claimed = sqlx::query_as::<_, Coupon>(CLAIM_NEXT)
            .bind(identity)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(match claimed {
            Some(coupon) => ClaimOutcome::Claimed(coupon),
            None => ClaimOutcome::Exhausted,
        })
    }
}
