//! PIN authentication middleware. Every protected
//! route requires an `X-Sentinel-Pin` header matching the configured PIN,
//! compared in constant time to avoid a timing side channel.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::state::AppState;

const PIN_HEADER: &str = "x-sentinel-pin";

pub async fn require_pin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = &state.pin else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(PIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if pin_matches(expected, provided) {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "missing or incorrect PIN").into_response()
    }
}

fn pin_matches(expected: &str, provided: &str) -> bool {
    expected.len() == provided.len() && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_pins_match() {
        assert!(pin_matches("123456", "123456"));
    }

    #[test]
    fn differing_pins_do_not_match() {
        assert!(!pin_matches("123456", "000000"));
    }

    #[test]
    fn differing_lengths_do_not_match() {
        assert!(!pin_matches("123456", "1234567"));
    }
}
