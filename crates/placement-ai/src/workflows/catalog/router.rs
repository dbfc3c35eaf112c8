use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;

use super::domain::CommunityDraft;
use super::store::{CatalogError, CatalogStore};

/// Router builder exposing the catalog CRUD and statistics endpoints.
pub fn catalog_router(store: Arc<CatalogStore>) -> Router {
    Router::new()
        .route(
            "/api/communities",
            get(list_handler).post(create_handler),
        )
        .route(
            "/api/communities/:community_id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/api/stats", get(stats_handler))
        .with_state(store)
}

pub(crate) async fn list_handler(State(store): State<Arc<CatalogStore>>) -> Response {
    let snapshot = store.snapshot();
    let payload = json!({
        "total": snapshot.len(),
        "communities": snapshot.communities(),
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn get_handler(
    State(store): State<Arc<CatalogStore>>,
    Path(community_id): Path<u32>,
) -> Response {
    match store.snapshot().get(community_id) {
        Some(community) => (StatusCode::OK, axum::Json(community.clone())).into_response(),
        None => not_found(community_id),
    }
}

pub(crate) async fn create_handler(
    State(store): State<Arc<CatalogStore>>,
    axum::Json(draft): axum::Json<CommunityDraft>,
) -> Response {
    match store.insert(draft) {
        Ok(community_id) => {
            let payload = json!({
                "community_id": community_id,
                "message": format!("community {community_id} added"),
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => bad_request(error),
    }
}

pub(crate) async fn update_handler(
    State(store): State<Arc<CatalogStore>>,
    Path(community_id): Path<u32>,
    axum::Json(draft): axum::Json<CommunityDraft>,
) -> Response {
    match store.update(community_id, draft) {
        Ok(()) => {
            let payload = json!({ "message": format!("community {community_id} updated") });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(CatalogError::NotFound(_)) => not_found(community_id),
        Err(error) => bad_request(error),
    }
}

pub(crate) async fn delete_handler(
    State(store): State<Arc<CatalogStore>>,
    Path(community_id): Path<u32>,
) -> Response {
    match store.delete(community_id) {
        Ok(()) => {
            let payload = json!({ "message": format!("community {community_id} deleted") });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(CatalogError::NotFound(_)) => not_found(community_id),
        Err(error) => bad_request(error),
    }
}

pub(crate) async fn stats_handler(State(store): State<Arc<CatalogStore>>) -> Response {
    (StatusCode::OK, axum::Json(store.stats())).into_response()
}

fn not_found(community_id: u32) -> Response {
    let payload = json!({ "error": format!("community {community_id} not found") });
    (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
}

fn bad_request(error: CatalogError) -> Response {
    let payload = json!({ "error": error.to_string() });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}
