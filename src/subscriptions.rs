use std::fmt::Debug;

use chrono::Utc;

use crate::domain::NewSubscriber;
use crate::domain::SubscriberEmail;
use crate::domain::SubscriberLocation;
use crate::domain::Subscription;
use crate::email_client::EmailError;
use crate::email_client::MailTransport;
use crate::store::StoreError;
use crate::store::SubscriptionStore;
use crate::templates::EmailRenderer;
use crate::templates::RenderError;
use crate::utils::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum SubscriptionError {
    #[error("{0}")]
    Validation(String),
    #[error("No subscription found for {0}")]
    NotFound(String),
    #[error("Failed to access the subscription store")]
    Store(#[from] StoreError),
    #[error("Failed to send email")]
    Email(#[from] EmailError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl Debug for SubscriptionError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    AlreadyConfirmed,
}

/// Parse, upsert as pending, then send the confirmation email.
///
/// Nothing is written if parsing fails. A failed send is reported, but the
/// pending record stays; registering again resends the link.
#[tracing::instrument(
    name = "Registering subscriber",
    skip(store, mail, renderer, email, location),
    fields(subscriber_email = %email, location = ?location)
)]
pub async fn register(
    store: &dyn SubscriptionStore,
    mail: &dyn MailTransport,
    renderer: &EmailRenderer,
    email: String,
    location: Option<String>,
) -> Result<Subscription, SubscriptionError> {
    let new_sub = NewSubscriber::parse(email, location).map_err(SubscriptionError::Validation)?;
    let subscription = store.upsert_pending(&new_sub).await?;
    let message = renderer.confirmation(&new_sub.email, &new_sub.location)?;
    mail.send_email(&message).await?;
    Ok(subscription)
}

/// Mark a pending subscription as confirmed. Confirming twice is a no-op.
#[tracing::instrument(name = "Confirming subscriber", skip(store))]
pub async fn confirm(
    store: &dyn SubscriptionStore,
    email: &str,
) -> Result<ConfirmationOutcome, SubscriptionError> {
    let email = SubscriberEmail::parse(email.to_string()).map_err(SubscriptionError::Validation)?;
    let subscription = store
        .get(&email)
        .await?
        .ok_or_else(|| SubscriptionError::NotFound(email.to_string()))?;

    if subscription.confirmed {
        return Ok(ConfirmationOutcome::AlreadyConfirmed);
    }
    match store.confirm(&email, Utc::now()).await? {
        true => Ok(ConfirmationOutcome::Confirmed),
        // a concurrent request got there first
        false => Ok(ConfirmationOutcome::AlreadyConfirmed),
    }
}

/// Hard-delete the subscription, then tell the subscriber.
#[tracing::instrument(name = "Unsubscribing subscriber", skip(store, mail, renderer))]
pub async fn unsubscribe(
    store: &dyn SubscriptionStore,
    mail: &dyn MailTransport,
    renderer: &EmailRenderer,
    email: &str,
) -> Result<(), SubscriptionError> {
    let email = SubscriberEmail::parse(email.to_string()).map_err(SubscriptionError::Validation)?;
    let not_found = || SubscriptionError::NotFound(email.to_string());

    let location = store
        .get(&email)
        .await?
        .map(|s| SubscriberLocation::from_stored(s.location))
        .ok_or_else(not_found)?;
    if !store.delete(&email).await? {
        return Err(not_found());
    }

    let message = renderer.unsubscribed(&email, &location)?;
    mail.send_email(&message).await?;
    Ok(())
}
