use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Activation, ActivationStatus, NewActivation};

use super::{ActivationFilter, ActivationStore, StoreError};

/// Production store backed by Postgres.
///
/// Atomicity comes from the storage engine: the partial unique index on
/// `(code) WHERE status = 'pending'` gates `create`, and `redeem` is a
/// single conditional `UPDATE` checked by its affected rows. No
/// application-level locking is involved, so the guarantees hold across
/// any number of service instances sharing the database.
#[derive(Debug, Clone)]
pub struct PgActivationStore {
    pool: PgPool,
}

impl PgActivationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Activation>, StoreError> {
        // Prefer the pending holder; fall back to the newest historical
        // record when the code has been re-issued.
        let activation = sqlx::query_as::<_, Activation>(
            r#"
            SELECT * FROM offer_activations
            WHERE code = $1
            ORDER BY (status = 'pending') DESC, activated_at DESC
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(activation)
    }

    /// Flips a stale pending holder of `code` to expired. Conditional on
    /// status, so it is safe under concurrent redeems.
    async fn expire_stale(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Activation>, StoreError> {
        let activation = sqlx::query_as::<_, Activation>(
            r#"
            UPDATE offer_activations
            SET status = 'expired'
            WHERE code = $1 AND status = 'pending' AND expires_at < $2
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(activation)
    }
}

#[async_trait]
impl ActivationStore for PgActivationStore {
    async fn create(&self, new: NewActivation) -> Result<Activation, StoreError> {
        let result = sqlx::query_as::<_, Activation>(
            r#"
            INSERT INTO offer_activations (id, offer_id, user_id, code, status, activated_at, expires_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.offer_id)
        .bind(new.user_id)
        .bind(&new.code)
        .bind(new.activated_at)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(activation) => Ok(activation),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateCode)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn lookup(&self, code: &str, now: DateTime<Utc>) -> Result<Activation, StoreError> {
        if let Some(expired) = self.expire_stale(code, now).await? {
            return Ok(expired);
        }

        self.find_by_code(code).await?.ok_or(StoreError::NotFound)
    }

    async fn redeem(
        &self,
        code: &str,
        staff_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Activation, StoreError> {
        loop {
            // The authoritative transition: exactly one concurrent caller
            // can match the pending, unexpired row.
            let won = sqlx::query_as::<_, Activation>(
                r#"
                UPDATE offer_activations
                SET status = 'redeemed', redeemed_at = $2, redeemed_by = $3
                WHERE code = $1 AND status = 'pending' AND expires_at >= $2
                RETURNING *
                "#,
            )
            .bind(code)
            .bind(now)
            .bind(staff_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(activation) = won {
                return Ok(activation);
            }

            if self.expire_stale(code, now).await?.is_some() {
                return Err(StoreError::Expired);
            }

            match self.find_by_code(code).await? {
                None => return Err(StoreError::NotFound),
                Some(a) => match a.status {
                    ActivationStatus::Redeemed => return Err(StoreError::AlreadyRedeemed),
                    ActivationStatus::Expired => return Err(StoreError::Expired),
                    // A fresh pending holder appeared between statements:
                    // the code was re-issued after its previous holder
                    // left pending. Take another run at the update.
                    ActivationStatus::Pending => continue,
                },
            }
        }
    }

    async fn is_code_pending(&self, code: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let pending = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM offer_activations
                WHERE code = $1 AND status = 'pending' AND expires_at >= $2
            )
            "#,
        )
        .bind(code)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(pending)
    }

    async fn count_redeemed(&self, offer_id: Uuid, user_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM offer_activations
            WHERE offer_id = $1 AND user_id = $2 AND status = 'redeemed'
            "#,
        )
        .bind(offer_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn find_pending(
        &self,
        offer_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Activation>, StoreError> {
        sqlx::query(
            r#"
            UPDATE offer_activations
            SET status = 'expired'
            WHERE offer_id = $1 AND user_id = $2 AND status = 'pending' AND expires_at < $3
            "#,
        )
        .bind(offer_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let activation = sqlx::query_as::<_, Activation>(
            r#"
            SELECT * FROM offer_activations
            WHERE offer_id = $1 AND user_id = $2 AND status = 'pending'
            LIMIT 1
            "#,
        )
        .bind(offer_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(activation)
    }

    async fn list(
        &self,
        filter: ActivationFilter,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Activation>, StoreError> {
        // Lazy expiry scoped to the rows this listing can touch.
        sqlx::query(
            r#"
            UPDATE offer_activations
            SET status = 'expired'
            WHERE status = 'pending' AND expires_at < $1
              AND ($2::uuid IS NULL OR offer_id = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
            "#,
        )
        .bind(now)
        .bind(filter.offer_id)
        .bind(filter.user_id)
        .execute(&self.pool)
        .await?;

        let activations = sqlx::query_as::<_, Activation>(
            r#"
            SELECT * FROM offer_activations
            WHERE ($1::activation_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR offer_id = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
            ORDER BY activated_at DESC
            LIMIT $4
            "#,
        )
        .bind(filter.status)
        .bind(filter.offer_id)
        .bind(filter.user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(activations)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
