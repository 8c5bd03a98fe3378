use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use serde::Deserialize;
use serde_json::json;

use crate::email_client::MailTransport;
use crate::store::SubscriptionStore;
use crate::subscriptions::register;
use crate::subscriptions::SubscriptionError;
use crate::templates::EmailRenderer;

/// Accepted as either `application/x-www-form-urlencoded` or JSON.
///
/// `email` is optional here so that a missing field gets the same 400 (and
/// message) as an empty one.
#[derive(Deserialize)]
pub struct SubscribeBody {
    email: Option<String>,
    location: Option<String>,
}

/// Either a form or a JSON body
pub type Body<T> = web::Either<web::Json<T>, web::Form<T>>;

pub(crate) fn into_inner<T>(body: Body<T>) -> T {
    match body {
        web::Either::Left(json) => json.into_inner(),
        web::Either::Right(form) => form.into_inner(),
    }
}

impl ResponseError for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Email(_) | Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // dependency details stay in the logs
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => {
                "Something went wrong, please try again later".to_string()
            }
            _ => self.to_string(),
        };
        HttpResponse::build(status).json(json!({ "error": message }))
    }
}

/// `POST /subscriptions`
///
/// Stores a pending subscription and emails a confirmation link. Registering
/// an existing email starts over (new location, unconfirmed).
///
/// ```sh
///     curl --data 'email=john@foo.com&location=Hanoi' http://127.0.0.1:8000/subscriptions
///     curl --json '{"email":"john@foo.com"}' http://127.0.0.1:8000/subscriptions
/// ```
pub async fn subscribe(
    body: Body<SubscribeBody>,
    store: web::Data<dyn SubscriptionStore>,
    mail: web::Data<dyn MailTransport>,
    renderer: web::Data<EmailRenderer>,
) -> Result<HttpResponse, SubscriptionError> {
    let body = into_inner(body);
    let sub = register(
        store.get_ref(),
        mail.get_ref(),
        renderer.get_ref(),
        body.email.unwrap_or_default(),
        body.location,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Subscription successful! Please check your email to confirm.",
        "email": sub.email,
        "location": sub.location,
    })))
}
