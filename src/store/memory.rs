use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::RwLock;

use super::StoreError;
use super::SubscriptionStore;
use crate::domain::ConfirmedSubscriber;
use crate::domain::NewSubscriber;
use crate::domain::SubscriberEmail;
use crate::domain::Subscription;

/// Process-local store, for tests and for running without Postgres
/// (`database.backend: memory`).
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    records: RwLock<BTreeMap<String, Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self { Self::default() }

    /// Number of stored records, confirmed or not
    pub async fn len(&self) -> usize { self.records.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.records.read().await.is_empty() }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn upsert_pending(
        &self,
        new: &NewSubscriber,
    ) -> Result<Subscription, StoreError> {
        let record = Subscription {
            email: new.email.as_ref().to_string(),
            location: new.location.as_ref().to_string(),
            confirmed: false,
            created_at: Utc::now(),
            confirmed_at: None,
        };
        self.records
            .write()
            .await
            .insert(record.email.clone(), record.clone());
        Ok(record)
    }

    async fn get(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self.records.read().await.get(email.as_ref()).cloned())
    }

    async fn confirm(
        &self,
        email: &SubscriberEmail,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(email.as_ref()) {
            Some(record) if !record.confirmed => {
                record.confirmed = true;
                record.confirmed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(
        &self,
        email: &SubscriberEmail,
    ) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(email.as_ref()).is_some())
    }

    async fn confirmed_subscribers(&self) -> Result<Vec<ConfirmedSubscriber>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.confirmed)
            .cloned()
            .map(ConfirmedSubscriber::from)
            .collect())
    }
}
