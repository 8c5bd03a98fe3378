use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::web::Query;
use actix_web::HttpResponse;
use actix_web::HttpResponseBuilder;
use serde::Deserialize;

use crate::domain::SubscriberEmail;
use crate::store::SubscriptionStore;
use crate::subscriptions::confirm;
use crate::subscriptions::ConfirmationOutcome;
use crate::subscriptions::SubscriptionError;
use crate::templates::ConfirmationPage;
use crate::templates::EmailRenderer;

#[derive(Deserialize)]
pub struct Parameters {
    email: Option<String>,
}

/// The confirmation link may be opened from a page on another origin.
fn cors(status: StatusCode) -> HttpResponseBuilder {
    let mut builder = HttpResponse::build(status);
    builder.insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"));
    builder
}

/// `GET /subscriptions/confirm?email=...`
///
/// Always answers with an HTML page, whatever the outcome.
#[tracing::instrument(name = "Confirming subscription link", skip(params, store, renderer))]
pub async fn confirm_subscriber(
    params: Query<Parameters>,
    store: web::Data<dyn SubscriptionStore>,
    renderer: web::Data<EmailRenderer>,
) -> HttpResponse {
    let raw = params.email.clone().unwrap_or_default();
    let (status, page) = match SubscriberEmail::parse(raw) {
        // missing, blank or mangled
        Err(_) => (StatusCode::BAD_REQUEST, ConfirmationPage::InvalidLink),
        Ok(email) => {
            let outcome = confirm(store.get_ref(), email.as_ref()).await;
            match outcome {
                Ok(ConfirmationOutcome::Confirmed) => {
                    (StatusCode::OK, ConfirmationPage::Confirmed(email))
                }
                Ok(ConfirmationOutcome::AlreadyConfirmed) => {
                    (StatusCode::OK, ConfirmationPage::AlreadyConfirmed(email))
                }
                Err(SubscriptionError::NotFound(_)) => {
                    (StatusCode::NOT_FOUND, ConfirmationPage::NotFound(email))
                }
                Err(SubscriptionError::Validation(_)) => {
                    (StatusCode::BAD_REQUEST, ConfirmationPage::InvalidLink)
                }
                Err(e) => {
                    tracing::error!(error.cause_chain = ?e, error.message = %e, "Confirmation failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, ConfirmationPage::Failed)
                }
            }
        }
    };

    match renderer.confirmation_page(&page) {
        Ok(html) => cors(status)
            .content_type(header::ContentType::html())
            .body(html),
        Err(e) => {
            tracing::error!(error.cause_chain = ?e, error.message = %e, "Could not render page");
            cors(StatusCode::INTERNAL_SERVER_ERROR).finish()
        }
    }
}

/// `OPTIONS /subscriptions/confirm` (CORS preflight)
pub async fn confirm_preflight() -> HttpResponse {
    cors(StatusCode::NO_CONTENT)
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
        .finish()
}
