use axum::extract::{Path, Query, State};
use axum::routing::{post, put};
use axum::{Json, Router};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::jwt::AuthUser;
use crate::error::ApiError;
use crate::markers::dto::{CreateMarkerRequest, ListQuery, MessageResponse, UpdateMarkerRequest};
use crate::markers::repo::{Marker, MarkerCategory, MarkerPatch};
use crate::state::AppState;
use crate::store::Store;

/// Flat cap on list results. A documented contract of the read path,
/// not a pagination cursor.
const LIST_CAP: i64 = 1000;

pub fn marker_routes() -> Router<AppState> {
    Router::new()
        .route("/markers", post(create_marker).get(list_markers))
        .route("/markers/:id", put(update_marker).delete(delete_marker))
}

#[instrument(skip(state, body))]
pub async fn create_marker(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(body): Json<CreateMarkerRequest>,
) -> Result<Json<Marker>, ApiError> {
    let category = parse_category(&body.category)?;

    // Owner comes from the token, never from the request body.
    let now = OffsetDateTime::now_utc();
    let marker = Marker {
        id: Uuid::new_v4(),
        user_id: identity.user_id,
        user_email: identity.email,
        title: body.title,
        category,
        description: body.description,
        latitude: body.latitude,
        longitude: body.longitude,
        image: body.image,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_marker(&marker).await?;

    info!(marker_id = %marker.id, user_id = %marker.user_id, category = %marker.category, "marker created");
    Ok(Json(marker))
}

#[instrument(skip(state))]
pub async fn list_markers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Marker>>, ApiError> {
    let markers = state
        .store
        .list_markers(query.category.as_deref(), LIST_CAP)
        .await?;
    Ok(Json(markers))
}

#[instrument(skip(state, body))]
pub async fn update_marker(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateMarkerRequest>,
) -> Result<Json<Marker>, ApiError> {
    let id = parse_marker_id(&id)?;
    let marker = state
        .store
        .find_marker(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Marker not found".into()))?;

    if marker.user_id != identity.user_id {
        warn!(marker_id = %id, user_id = %identity.user_id, "update by non-owner");
        return Err(ApiError::Forbidden(
            "Not authorized to update this marker".into(),
        ));
    }

    let category = match body.category.into_option() {
        Some(raw) => Some(parse_category(&raw)?),
        None => None,
    };
    let patch = MarkerPatch {
        title: body.title.into_option(),
        category,
        description: body.description.into_option(),
        latitude: body.latitude.into_option(),
        longitude: body.longitude.into_option(),
        image: body.image.into_option(),
        updated_at: OffsetDateTime::now_utc(),
    };
    state.store.update_marker(id, &patch).await?;

    let updated = state
        .store
        .find_marker(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Marker not found".into()))?;

    info!(marker_id = %id, "marker updated");
    Ok(Json(updated))
}

#[instrument(skip(state))]
pub async fn delete_marker(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_marker_id(&id)?;
    let marker = state
        .store
        .find_marker(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Marker not found".into()))?;

    if marker.user_id != identity.user_id {
        warn!(marker_id = %id, user_id = %identity.user_id, "delete by non-owner");
        return Err(ApiError::Forbidden(
            "Not authorized to delete this marker".into(),
        ));
    }

    state.store.delete_marker(id).await?;

    info!(marker_id = %id, "marker deleted");
    Ok(Json(MessageResponse {
        message: "Marker deleted successfully".into(),
    }))
}

fn parse_category(raw: &str) -> Result<MarkerCategory, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("Unknown marker category '{}'", raw)))
}

/// Marker ids are opaque; a path segment that cannot be one simply
/// names no marker.
fn parse_marker_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound("Marker not found".into()))
}
