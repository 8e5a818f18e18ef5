use crate::{
    error::Result,
    models::venue::{
        CreateVenueRequest, NearbyQuery, UpdateOpeningHoursRequest, UpdateVenueRequest,
        VenueListQuery,
    },
    services::AuthUser,
    state::AppState,
    utils::validation::validate_request,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_venues).post(create_venue))
        .route("/nearby", get(nearby_venues))
        .route("/:id", get(get_venue).put(update_venue).delete(delete_venue))
        .route("/:id/images", axum::routing::post(add_images))
        .route("/:id/opening-hours", put(update_opening_hours))
}

async fn list_venues(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VenueListQuery>,
) -> Result<Json<Value>> {
    let (venues, total) = state.venue_service.list_venues(&query).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "venues": venues,
            "total": total,
            "page": query.page.unwrap_or(1)
        }
    })))
}

async fn nearby_venues(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Value>> {
    let venues = state.venue_service.nearby_venues(&query).await?;

    Ok(Json(json!({
        "success": true,
        "data": venues
    })))
}

async fn create_venue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CreateVenueRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    let venue_id = state.venue_service.create_venue(user.user_id, &request).await?;
    let venue = state.venue_service.get_venue(venue_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": venue
    })))
}

/// 场地详情：附图片与营业时间
async fn get_venue(
    State(state): State<Arc<AppState>>,
    Path(venue_id): Path<i64>,
) -> Result<Json<Value>> {
    let venue = state.venue_service.get_visible_venue(venue_id).await?;
    let images = state.venue_service.get_images(venue_id).await?;
    let opening_hours = state.venue_service.get_opening_hours(venue_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "venue": venue,
            "images": images,
            "opening_hours": opening_hours
        }
    })))
}

async fn update_venue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(venue_id): Path<i64>,
    Json(request): Json<UpdateVenueRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    state
        .venue_service
        .update_venue(venue_id, user.user_id, &request)
        .await?;
    let venue = state.venue_service.get_venue(venue_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": venue
    })))
}

async fn delete_venue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(venue_id): Path<i64>,
) -> Result<Json<Value>> {
    let image_urls = state.venue_service.delete_venue(venue_id, user.user_id).await?;
    state.media_service.delete_images_best_effort(&image_urls).await;

    Ok(Json(json!({
        "success": true,
        "message": "场地已删除"
    })))
}

#[derive(Debug, Deserialize)]
struct AddImagesRequest {
    image_urls: Vec<String>,
}

async fn add_images(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(venue_id): Path<i64>,
    Json(request): Json<AddImagesRequest>,
) -> Result<Json<Value>> {
    state
        .venue_service
        .add_images(venue_id, user.user_id, &request.image_urls)
        .await?;
    let images = state.venue_service.get_images(venue_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": images
    })))
}

async fn update_opening_hours(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(venue_id): Path<i64>,
    Json(request): Json<UpdateOpeningHoursRequest>,
) -> Result<Json<Value>> {
    for entry in &request.opening_hours {
        validate_request(entry)?;
    }
    let opening_hours = state
        .venue_service
        .update_opening_hours(venue_id, user.user_id, &request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": opening_hours
    })))
}
