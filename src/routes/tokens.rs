use crate::{
    error::AuthError,
    flow::{TokenPairResponse, VerifyResponse},
    server::Server,
};
use axum::{
    Router,
    extract::{Form, Query, State},
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

pub fn create_token_routes() -> Router<Server> {
    Router::new()
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/verify", get(verify_handler))
}

async fn refresh_handler(
    State(server): State<Server>,
    Form(request): Form<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    Ok(Json(server.flow.refresh(&request.refresh_token)?))
}

/// Always answers 200; an invalid token is a `valid: false` payload, not an
/// error status.
async fn verify_handler(
    State(server): State<Server>,
    Query(params): Query<VerifyQuery>,
) -> Json<VerifyResponse> {
    let verdict = match params.token.as_deref() {
        Some(token) => server.flow.verify(token),
        None => VerifyResponse {
            valid: false,
            user_id: None,
        },
    };
    Json(verdict)
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestServerBuilder;
    use crate::token::TokenKind;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header::CONTENT_TYPE},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_refresh_round_trip() {
        let server = TestServerBuilder::new().build().await;
        let refresh = server
            .flow
            .codec()
            .create("7", TokenKind::Refresh)
            .unwrap();
        let app = server.create_app();

        let request = Request::builder()
            .method("POST")
            .uri("/auth/refresh")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("refresh_token={refresh}")))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["access_token"].is_string());
        assert!(json["refresh_token"].is_string());
        assert_eq!(json["expires_in"], 3600);
    }

    #[tokio::test]
    async fn test_refresh_with_access_token_rejected() {
        let server = TestServerBuilder::new().build().await;
        let access = server.flow.codec().create("7", TokenKind::Access).unwrap();
        let app = server.create_app();

        let request = Request::builder()
            .method("POST")
            .uri("/auth/refresh")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("refresh_token={access}")))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_verify_is_always_ok() {
        let server = TestServerBuilder::new().build().await;
        let access = server.flow.codec().create("7", TokenKind::Access).unwrap();
        let app = server.create_app();

        for (uri, valid, user_id) in [
            (format!("/auth/verify?token={access}"), true, Some("7")),
            ("/auth/verify?token=garbage".to_string(), false, None),
            ("/auth/verify".to_string(), false, None),
        ] {
            let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "uri {uri}");

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["valid"], valid);
            assert_eq!(json.get("user_id").and_then(|v| v.as_str()), user_id);
        }
    }
}
