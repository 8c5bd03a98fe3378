use std::fmt::Debug;

use actix_web::http::header;
use actix_web::http::header::HeaderMap;
use actix_web::http::header::HeaderValue;
use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use secrecy::ExposeSecret;
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::dispatch::DispatchError;
use crate::dispatch::Dispatcher;
use crate::startup::AdminToken;
use crate::utils::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum AdminError {
    #[error("Authentication failed")]
    Unauthorized,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl Debug for AdminError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for AdminError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::Unauthorized => {
                let mut resp = HttpResponse::new(StatusCode::UNAUTHORIZED);
                resp.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Bearer realm="admin""#),
                );
                resp
            }
            Self::Dispatch(e @ DispatchError::AlreadyRunning) => {
                HttpResponse::Conflict().json(json!({ "error": e.to_string() }))
            }
            Self::Dispatch(e) => HttpResponse::InternalServerError().json(json!({
                "error": e.to_string(),
                "summary": e.summary(),
            })),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn is_authorized(
    headers: &HeaderMap,
    admin_token: &AdminToken,
) -> bool {
    match bearer_token(headers) {
        Some(token) => token
            .as_bytes()
            .ct_eq(admin_token.0.expose_secret().as_bytes())
            .into(),
        None => false,
    }
}

/// `POST /admin/dispatch`
///
/// Runs the daily dispatch now, exactly as the scheduler would, and returns its
/// summary. Responds 409 if a run (scheduled or manual) is already going.
///
/// ```sh
///     curl -X POST -H 'Authorization: Bearer <admin_token>' http://127.0.0.1:8000/admin/dispatch
/// ```
#[tracing::instrument(name = "Manual dispatch", skip_all)]
pub async fn trigger_dispatch(
    req: HttpRequest,
    dispatcher: web::Data<Dispatcher>,
    admin_token: web::Data<AdminToken>,
) -> Result<HttpResponse, AdminError> {
    if !is_authorized(req.headers(), &admin_token) {
        return Err(AdminError::Unauthorized);
    }
    let summary = dispatcher.run().await?;
    Ok(HttpResponse::Ok().json(summary))
}
