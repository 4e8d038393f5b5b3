use crate::{error::AuthError, flow::StartLogin, server::Server};
use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub token: Option<String>,
    #[serde(rename = "type")]
    pub login_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub token: Option<String>,
}

pub fn create_login_routes() -> Router<Server> {
    Router::new()
        .route("/login", get(login_handler))
        .route("/callback", get(callback_handler))
        .route("/check", get(check_handler))
}

async fn login_handler(
    State(server): State<Server>,
    Query(params): Query<LoginQuery>,
) -> Result<Response, AuthError> {
    let token = params
        .token
        .ok_or_else(|| AuthError::BadRequest("missing token parameter".to_string()))?;
    let login_type = params
        .login_type
        .ok_or_else(|| AuthError::BadRequest("missing type parameter".to_string()))?;

    match server.flow.start_login(&token, &login_type).await? {
        // axum's Redirect helper only produces 303/307/308.
        StartLogin::Redirect(url) => {
            Ok((StatusCode::FOUND, [(LOCATION, url)]).into_response())
        }
        StartLogin::DirectCode(code) => Ok(Json(json!({
            "message": "Enter the code in the client",
            "code": code,
        }))
        .into_response()),
    }
}

async fn callback_handler(
    State(server): State<Server>,
    Query(params): Query<CallbackQuery>,
) -> Result<&'static str, AuthError> {
    let code = params
        .code
        .ok_or_else(|| AuthError::BadRequest("missing code parameter".to_string()))?;
    let state = params
        .state
        .ok_or_else(|| AuthError::BadRequest("missing state parameter".to_string()))?;

    server.flow.handle_callback(&code, &state).await?;
    Ok("Login complete. You can close this window.")
}

async fn check_handler(
    State(server): State<Server>,
    Query(params): Query<CheckQuery>,
) -> Result<Json<crate::flow::CheckResponse>, AuthError> {
    let token = params
        .token
        .ok_or_else(|| AuthError::BadRequest("missing token parameter".to_string()))?;

    Ok(Json(server.flow.check(&token).await))
}
