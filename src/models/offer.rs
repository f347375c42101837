use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A promotional offer. Owned and mutated by the offer-management service;
/// this core only reads offers to validate activation eligibility and
/// never writes the table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub title: String,
    pub discount: JsonValue, // opaque descriptor, displayed by the caller
    pub minimum_order_cents: Option<i64>, // pass-through, not validated here
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub valid_days: Json<Vec<String>>, // lowercase weekday names; empty = every day
    pub max_uses: Option<i32>,
    pub max_uses_per_user: i32,
    pub current_uses: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let offer = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM offers WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(offer)
    }

    /// Active flag plus the global usage cap, when one is set.
    pub fn is_currently_active(&self) -> bool {
        self.is_active && self.max_uses.map_or(true, |max| self.current_uses < max)
    }

    /// True when `now` falls inside `[valid_from, valid_until]` and on an
    /// allowed weekday.
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_until && self.is_day_valid(now)
    }

    pub fn is_day_valid(&self, now: DateTime<Utc>) -> bool {
        if self.valid_days.is_empty() {
            return true;
        }

        let weekday = weekday_name(now);
        self.valid_days.iter().any(|day| day == weekday)
    }
}

fn weekday_name(now: DateTime<Utc>) -> &'static str {
    match now.weekday() {
        chrono::Weekday::Mon => "monday",
        chrono::Weekday::Tue => "tuesday",
        chrono::Weekday::Wed => "wednesday",
        chrono::Weekday::Thu => "thursday",
        chrono::Weekday::Fri => "friday",
        chrono::Weekday::Sat => "saturday",
        chrono::Weekday::Sun => "sunday",
    }
}

/// Read-only access to the offer collaborator's data. The redemption
/// service is the only component that goes through this seam.
#[async_trait]
pub trait OfferDirectory: Send + Sync {
    async fn offer_by_id(&self, id: Uuid) -> Result<Option<Offer>, sqlx::Error>;
}

/// Production directory backed by the shared Postgres database.
#[derive(Debug, Clone)]
pub struct PgOfferDirectory {
    pool: PgPool,
}

impl PgOfferDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfferDirectory for PgOfferDirectory {
    async fn offer_by_id(&self, id: Uuid) -> Result<Option<Offer>, sqlx::Error> {
        Offer::find_by_id(&self.pool, id).await
    }
}
