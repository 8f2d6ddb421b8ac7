use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    workflow::{TokenGeneratedEvent, WORKFLOW_SETTINGS},
    AppState,
};

pub fn make_router(app_state: AppState) -> Router {
    Router::new()
        .route("/enrich", post(enrich_claims))
        .route("/hooks/token-generated", post(token_generated))
        .route("/workflow", get(workflow_settings))
        .with_state(app_state)
        // add logging
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                tower_http::trace::DefaultMakeSpan::default().level(tracing::Level::DEBUG),
            ),
        )
}

/// Takes the claims of a token about to be issued and returns them with the
/// threat intel claims added. The principal is the `sub` claim.
pub async fn enrich_claims(
    State(app_state): State<AppState>,
    Json(claims): Json<Map<String, Value>>,
) -> Result<Json<Map<String, Value>>, (StatusCode, &'static str)> {
    let user_id = match claims.get("sub") {
        Some(Value::String(sub)) => sub.clone(),
        _ => return Err((StatusCode::BAD_REQUEST, "token has no string sub claim")),
    };

    let mut event = TokenGeneratedEvent {
        user_id,
        id_token: claims,
    };
    app_state.workflow.on_token_generated(&mut event).await;

    Ok(Json(event.id_token))
}

#[derive(Debug, Deserialize)]
pub struct HookEvent {
    pub context: HookContext,
}

#[derive(Debug, Deserialize)]
pub struct HookContext {
    pub user: HookUser,
}

#[derive(Debug, Deserialize)]
pub struct HookUser {
    pub id: String,
}

/// Identity-provider style hook: answers with just the custom claims.
pub async fn token_generated(
    State(app_state): State<AppState>,
    Json(hook): Json<HookEvent>,
) -> impl IntoResponse {
    let mut event = TokenGeneratedEvent {
        user_id: hook.context.user.id,
        id_token: Map::new(),
    };
    app_state.workflow.on_token_generated(&mut event).await;

    Json(json!({ "idToken": { "customClaims": event.id_token } }))
}

pub async fn workflow_settings() -> impl IntoResponse {
    Json(WORKFLOW_SETTINGS)
}
