use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::StoreError;
use super::SubscriptionStore;
use crate::configuration::DatabaseSettings;
use crate::domain::ConfirmedSubscriber;
use crate::domain::NewSubscriber;
use crate::domain::SubscriberEmail;
use crate::domain::Subscription;

/// The pool connects lazily, so db-free requests (e.g. `/health_check`) work
/// before Postgres is reachable.
pub fn get_connection_pool(db_cfg: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new().connect_lazy_with(db_cfg.connection())
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    email: String,
    location: String,
    confirmed: bool,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(r: SubscriptionRow) -> Self {
        Self {
            email: r.email,
            location: r.location,
            confirmed: r.confirmed,
            created_at: r.created_at,
            confirmed_at: r.confirmed_at,
        }
    }
}

/// `weather_subscriptions` table; see `migrations/`.
///
/// Queries are checked at runtime (`sqlx::query_as`), not at compile time, so
/// building the crate doesn't need a live database or `.sqlx` metadata.
#[derive(Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub fn pool(&self) -> &PgPool { &self.pool }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    #[tracing::instrument(name = "Upserting pending subscription", skip_all, fields(subscriber_email = %new.email))]
    async fn upsert_pending(
        &self,
        new: &NewSubscriber,
    ) -> Result<Subscription, StoreError> {
        // re-registering resets the record, including `created_at`
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            INSERT INTO weather_subscriptions (email, location, confirmed, created_at, confirmed_at)
            VALUES ($1, $2, false, $3, NULL)
            ON CONFLICT (email) DO UPDATE SET
                location = EXCLUDED.location,
                confirmed = false,
                created_at = EXCLUDED.created_at,
                confirmed_at = NULL
            RETURNING email, location, confirmed, created_at, confirmed_at
            "#,
        )
        .bind(new.email.as_ref())
        .bind(new.location.as_ref())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    #[tracing::instrument(name = "Fetching subscription", skip(self))]
    async fn get(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT email, location, confirmed, created_at, confirmed_at
            FROM weather_subscriptions
            WHERE email = $1
            "#,
        )
        .bind(email.as_ref())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Subscription::from))
    }

    #[tracing::instrument(name = "Confirming subscription", skip(self))]
    async fn confirm(
        &self,
        email: &SubscriberEmail,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // the `confirmed = false` guard makes the transition happen once, even
        // with concurrent clicks on the same link
        let result = sqlx::query(
            r#"
            UPDATE weather_subscriptions
            SET confirmed = true, confirmed_at = $2
            WHERE email = $1 AND confirmed = false
            "#,
        )
        .bind(email.as_ref())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Deleting subscription", skip(self))]
    async fn delete(
        &self,
        email: &SubscriberEmail,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM weather_subscriptions WHERE email = $1")
            .bind(email.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Getting list of confirmed subscribers", skip(self))]
    async fn confirmed_subscribers(&self) -> Result<Vec<ConfirmedSubscriber>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT email, location FROM weather_subscriptions
            WHERE confirmed = true
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(email, location)| ConfirmedSubscriber { email, location })
            .collect())
    }
}
