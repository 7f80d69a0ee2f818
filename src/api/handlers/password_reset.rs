//! Password reset endpoints (`OTP` request, resend, verify, new password).

use axum::{
    Json,
    extract::Extension,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::reset::{PasswordReset, ResetError, ResetReceipt};

use super::types::{
    CodeSent, NewPasswordRequest, RequestCodeRequest, ResendCodeRequest, VerifyCodeRequest,
};

/// Map a reset failure to its HTTP response.
pub fn reset_error_response(err: &ResetError) -> Response {
    let status = match err {
        ResetError::NotFound => StatusCode::NOT_FOUND,
        ResetError::NoActiveRequest
        | ResetError::Expired
        | ResetError::InvalidCredential { .. } => StatusCode::BAD_REQUEST,
        ResetError::Throttled { .. } | ResetError::ResendLimitExceeded => {
            StatusCode::TOO_MANY_REQUESTS
        }
        ResetError::Blocked | ResetError::NotVerified => StatusCode::FORBIDDEN,
        ResetError::IncorrectCode { .. } => StatusCode::UNAUTHORIZED,
        ResetError::Conflict => StatusCode::CONFLICT,
        ResetError::Internal(inner) => {
            error!("Password reset failed: {inner:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
                .into_response();
        }
    };

    debug!(code = err.code(), "password reset rejected");
    let mut response = (status, err.to_string()).into_response();
    if let ResetError::Throttled {
        retry_after_seconds,
    } = err
        && let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string())
    {
        response.headers_mut().insert(RETRY_AFTER, value);
    }
    response
}

/// Name the address only when the caller already supplied it.
fn code_sent_message(receipt: &ResetReceipt, email_given: bool) -> String {
    if email_given {
        format!("A verification code was sent to {}", receipt.email)
    } else {
        "A verification code was sent to the email on file".to_string()
    }
}

fn code_sent(receipt: &ResetReceipt, email_given: bool) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(CodeSent {
            message: code_sent_message(receipt, email_given),
            expires_at: receipt.expires_at,
        }),
    )
        .into_response()
}

fn missing_payload() -> Response {
    (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response()
}

/// Open a reset chain and send a code to the account's email.
#[utoipa::path(
    post,
    path = "/v1/password-reset/request",
    request_body = RequestCodeRequest,
    responses(
        (status = 202, description = "Code sent", body = CodeSent),
        (status = 400, description = "Missing email or phone", body = String),
        (status = 404, description = "No matching account", body = String)
    ),
    tag = "password-reset"
)]
pub async fn request_code(
    reset: Extension<Arc<PasswordReset>>,
    payload: Option<Json<RequestCodeRequest>>,
) -> impl IntoResponse {
    let request: RequestCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty());
    let phone = request
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|phone| !phone.is_empty());

    let Some(identifier) = email.or(phone) else {
        return (StatusCode::BAD_REQUEST, "Email or phone is required".to_string())
            .into_response();
    };

    match reset.request_code(identifier, phone).await {
        Ok(receipt) => code_sent(&receipt, email.is_some()),
        Err(err) => reset_error_response(&err),
    }
}

/// Reissue the code for the active chain.
#[utoipa::path(
    post,
    path = "/v1/password-reset/resend",
    request_body = ResendCodeRequest,
    responses(
        (status = 202, description = "Code resent", body = CodeSent),
        (status = 400, description = "No active request", body = String),
        (status = 429, description = "Cooldown active or resend limit reached", body = String)
    ),
    tag = "password-reset"
)]
pub async fn resend_code(
    reset: Extension<Arc<PasswordReset>>,
    payload: Option<Json<ResendCodeRequest>>,
) -> impl IntoResponse {
    let request: ResendCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if request.email.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing email".to_string()).into_response();
    }

    match reset.resend_code(&request.email).await {
        Ok(receipt) => code_sent(&receipt, true),
        Err(err) => reset_error_response(&err),
    }
}

/// Check a submitted code against the active chain.
#[utoipa::path(
    post,
    path = "/v1/password-reset/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 204, description = "Code verified"),
        (status = 400, description = "Expired or no active request", body = String),
        (status = 401, description = "Incorrect code", body = String),
        (status = 403, description = "Too many attempts", body = String)
    ),
    tag = "password-reset"
)]
pub async fn verify_code(
    reset: Extension<Arc<PasswordReset>>,
    payload: Option<Json<VerifyCodeRequest>>,
) -> impl IntoResponse {
    let request: VerifyCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if request.email.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing email".to_string()).into_response();
    }

    match reset.verify_code(&request.email, &request.otp).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => reset_error_response(&err),
    }
}

/// Set a new password once the chain is verified.
#[utoipa::path(
    post,
    path = "/v1/password-reset/reset",
    request_body = NewPasswordRequest,
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Password too short", body = String),
        (status = 403, description = "Code not verified", body = String),
        (status = 409, description = "Concurrent update", body = String)
    ),
    tag = "password-reset"
)]
pub async fn set_new_password(
    reset: Extension<Arc<PasswordReset>>,
    payload: Option<Json<NewPasswordRequest>>,
) -> impl IntoResponse {
    let request: NewPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };
    if request.email.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing email".to_string()).into_response();
    }

    match reset
        .set_new_password(&request.email, &request.new_password)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => reset_error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::Utc;

    #[test]
    fn phone_requests_do_not_echo_the_email() {
        let receipt = ResetReceipt {
            email: "a@x.com".to_string(),
            expires_at: Utc::now(),
        };
        assert_eq!(
            code_sent_message(&receipt, true),
            "A verification code was sent to a@x.com"
        );
        let message = code_sent_message(&receipt, false);
        assert!(!message.contains("a@x.com"));
        assert_eq!(message, "A verification code was sent to the email on file");
    }

    #[test]
    fn throttled_sets_retry_after() {
        let response = reset_error_response(&ResetError::Throttled {
            retry_after_seconds: 17,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("17")
        );
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (ResetError::NotFound, StatusCode::NOT_FOUND),
            (ResetError::NoActiveRequest, StatusCode::BAD_REQUEST),
            (ResetError::ResendLimitExceeded, StatusCode::TOO_MANY_REQUESTS),
            (ResetError::Expired, StatusCode::BAD_REQUEST),
            (ResetError::Blocked, StatusCode::FORBIDDEN),
            (
                ResetError::IncorrectCode {
                    attempts_remaining: 2,
                },
                StatusCode::UNAUTHORIZED,
            ),
            (ResetError::NotVerified, StatusCode::FORBIDDEN),
            (
                ResetError::InvalidCredential { min_length: 8 },
                StatusCode::BAD_REQUEST,
            ),
            (ResetError::Conflict, StatusCode::CONFLICT),
            (
                ResetError::Internal(anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = reset_error_response(&err);
            assert_eq!(response.status(), expected, "{}", err.code());
            assert!(response.headers().get(RETRY_AFTER).is_none());
        }
    }
}
