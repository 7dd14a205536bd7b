//! Constant-time credential check for the authenticated endpoints (spec
//! §4.I: "MUST NOT leak whether the access key was correct vs. the
//! secret" — both are compared before either result is examined).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::AppState;

const ACCESS_KEY_HEADER: &str = "x-chainlink-ea-accesskey";
const SECRET_HEADER: &str = "x-chainlink-ea-secret";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a [u8] {
    headers
        .get(name)
        .map(|v| v.as_bytes())
        .unwrap_or_default()
}

pub async fn require_credentials(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let key_ok: bool = header_str(request.headers(), ACCESS_KEY_HEADER)
        .ct_eq(state.access_key.as_bytes())
        .into();
    let secret_ok: bool = header_str(request.headers(), SECRET_HEADER)
        .ct_eq(state.secret.as_bytes())
        .into();
    // Both comparisons always run; the boolean AND below is the only
    // branch on their outcome, so timing never distinguishes which half
    // of the credential pair was wrong.
    if key_ok && secret_ok {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
