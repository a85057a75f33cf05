//! Gate middleware for axum routers.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::gate::Gate;
use crate::protocol::{RejectReason, Verdict};

/// Fixed JSON rejection: `{"message": "..."}` with the taxonomy status.
pub fn rejection_response(reason: RejectReason) -> Response {
    (reason.status(), Json(json!({ "message": reason.message() }))).into_response()
}

/// Runs the gate before anything else sees the request.
pub async fn gate_middleware(
    State(gate): State<Arc<Gate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match gate.authorize(request.headers()).await {
        Verdict::Accepted => next.run(request).await,
        Verdict::Rejected(reason) => rejection_response(reason),
    }
}

/// Put `gate` in front of every route of `router`.
pub fn protect(router: Router, gate: Arc<Gate>) -> Router {
    router.layer(middleware::from_fn_with_state(gate, gate_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_rejection_bodies() {
        let cases = [
            (RejectReason::MissingHeader, StatusCode::BAD_REQUEST, r#"{"message":"Bad request"}"#),
            (RejectReason::InvalidSecret, StatusCode::UNAUTHORIZED, r#"{"message":"Unauthorized"}"#),
            (
                RejectReason::IpcFailure,
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"message":"Internal error"}"#,
            ),
        ];

        for (reason, status, body) in cases {
            let response = rejection_response(reason);
            assert_eq!(response.status(), status);
            let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
            assert_eq!(std::str::from_utf8(&bytes).unwrap(), body);
        }
    }
}
