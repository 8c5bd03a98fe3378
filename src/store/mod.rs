mod memory;
mod postgres;

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
pub use memory::InMemorySubscriptionStore;
pub use postgres::get_connection_pool;
pub use postgres::PostgresSubscriptionStore;

use crate::domain::ConfirmedSubscriber;
use crate::domain::NewSubscriber;
use crate::domain::SubscriberEmail;
use crate::domain::Subscription;
use crate::utils::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("Database query failed")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl Debug for StoreError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Subscription records, keyed by normalized email.
///
/// Implementations must be shareable across the API workers and the dispatch
/// worker (`Arc<dyn SubscriptionStore>`).
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert or overwrite the record for `new.email`, leaving it
    /// unconfirmed.
    async fn upsert_pending(
        &self,
        new: &NewSubscriber,
    ) -> Result<Subscription, StoreError>;

    async fn get(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Mark an unconfirmed record as confirmed at `at`. Returns `false` when
    /// nothing changed (no record, or already confirmed).
    async fn confirm(
        &self,
        email: &SubscriberEmail,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Hard delete. Returns `false` if there was no record.
    async fn delete(
        &self,
        email: &SubscriberEmail,
    ) -> Result<bool, StoreError>;

    /// Snapshot of every confirmed record, in no particular order.
    async fn confirmed_subscribers(&self) -> Result<Vec<ConfirmedSubscriber>, StoreError>;
}
