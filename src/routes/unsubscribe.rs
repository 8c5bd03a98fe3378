use actix_web::web;
use actix_web::HttpResponse;
use serde::Deserialize;
use serde_json::json;

use super::subscriptions::into_inner;
use super::subscriptions::Body;
use crate::email_client::MailTransport;
use crate::store::SubscriptionStore;
use crate::subscriptions::unsubscribe;
use crate::subscriptions::SubscriptionError;
use crate::templates::EmailRenderer;

#[derive(Deserialize)]
pub struct UnsubscribeBody {
    email: Option<String>,
}

/// `POST /subscriptions/unsubscribe`
///
/// Deletes the subscription and sends a goodbye email. 404 if there was
/// nothing to delete.
pub async fn unsubscribe_subscriber(
    body: Body<UnsubscribeBody>,
    store: web::Data<dyn SubscriptionStore>,
    mail: web::Data<dyn MailTransport>,
    renderer: web::Data<EmailRenderer>,
) -> Result<HttpResponse, SubscriptionError> {
    let email = into_inner(body).email.unwrap_or_default();
    unsubscribe(store.get_ref(), mail.get_ref(), renderer.get_ref(), &email).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "You have been unsubscribed from daily weather updates.",
    })))
}
