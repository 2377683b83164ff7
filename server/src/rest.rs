use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{store::Content, AppState};

#[derive(Serialize)]
pub struct HttpResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct ContentQuery {
    #[serde(default)]
    name: Option<String>,
}

pub async fn get_content(
    State(state): State<AppState>,
    Query(q): Query<ContentQuery>,
) -> Result<Json<Content>, Response> {
    let Some(name) = q.name.filter(|n| !n.is_empty()) else {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, "'name' query param is required").into_response());
    };

    match state.store.content_by_name(&name).await {
        Ok(content) => Ok(Json(content)),
        Err(e) => {
            warn!(name = %name, error = %e, "content lookup failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())
        }
    }
}

pub async fn add_content(State(state): State<AppState>, body: Bytes) -> Result<Json<Content>, Response> {
    let content: Content = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response())?;

    state
        .store
        .add_content(content)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response())
}

pub async fn health() -> Json<HttpResponse> {
    Json(HttpResponse {
        success: true,
        message: Some("Api up and running".to_string()),
    })
}
