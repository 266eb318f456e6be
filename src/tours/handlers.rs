use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::CurrentUser,
    error::ApiError,
    query::{self, PageDefaults, QuerySpec},
    state::AppState,
    tours::{
        dto::{CreateTourRequest, UpdateTourRequest},
        repo::{Tour, TourStats},
    },
    users::repo::Role,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tours", get(list_tours).post(create_tour))
        .route("/tours/top-5-cheap", get(top_tours))
        .route("/tours/stats", get(tour_stats))
        .route(
            "/tours/:id",
            get(get_tour).patch(update_tour).delete(delete_tour),
        )
}

fn page_defaults(state: &AppState) -> PageDefaults {
    PageDefaults {
        default_limit: state.config.default_page_size,
        max_limit: state.config.max_page_size,
    }
}

async fn run_list(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Vec<serde_json::Value>, ApiError> {
    let spec = QuerySpec::from_params(params, page_defaults(state))?;
    let tours = Tour::list(&state.db, &spec).await?;
    let items = tours
        .into_iter()
        .map(|t| {
            let value = serde_json::to_value(&t)?;
            Ok(match &spec.fields {
                Some(fields) => query::project_fields(value, fields),
                None => value,
            })
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()
        .map_err(anyhow::Error::from)?;
    Ok(items)
}

#[instrument(skip(state))]
pub async fn list_tours(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    Ok(Json(run_list(&state, &params).await?))
}

/// Preset listing: the five best-rated cheap tours. User-supplied filters
/// still apply; the shaping keys are pinned.
#[instrument(skip(state))]
pub async fn top_tours(
    State(state): State<AppState>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    params.insert("limit".into(), "5".into());
    params.insert("sort".into(), "-ratings_average,price".into());
    params.insert(
        "fields".into(),
        "name,price,ratings_average,summary,difficulty".into(),
    );
    params.remove("page");
    Ok(Json(run_list(&state, &params).await?))
}

#[instrument(skip(state))]
pub async fn tour_stats(
    State(state): State<AppState>,
) -> Result<Json<Vec<TourStats>>, ApiError> {
    Ok(Json(Tour::stats(&state.db).await?))
}

#[instrument(skip(state))]
pub async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Tour>, ApiError> {
    let tour = Tour::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No tour found with that ID".into()))?;
    Ok(Json(tour))
}

#[instrument(skip(state, current, payload))]
pub async fn create_tour(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CreateTourRequest>,
) -> Result<(StatusCode, Json<Tour>), ApiError> {
    current.require_role(&[Role::Admin, Role::LeadGuide])?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("Tour name is required".into()));
    }
    if payload.price < 0.0 {
        return Err(ApiError::Validation("Price must not be negative".into()));
    }

    let tour = Tour::create(&state.db, payload.into()).await?;
    info!(tour_id = %tour.id, "tour created");
    Ok((StatusCode::CREATED, Json(tour)))
}

#[instrument(skip(state, current, payload))]
pub async fn update_tour(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTourRequest>,
) -> Result<Json<Tour>, ApiError> {
    current.require_role(&[Role::Admin, Role::LeadGuide])?;

    if let Some(price) = payload.price {
        if price < 0.0 {
            return Err(ApiError::Validation("Price must not be negative".into()));
        }
    }

    let tour = Tour::update(&state.db, id, payload.into())
        .await?
        .ok_or_else(|| ApiError::NotFound("No tour found with that ID".into()))?;
    info!(tour_id = %tour.id, "tour updated");
    Ok(Json(tour))
}

#[instrument(skip(state, current))]
pub async fn delete_tour(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    current.require_role(&[Role::Admin, Role::LeadGuide])?;
    if !Tour::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("No tour found with that ID".into()));
    }
    info!(tour_id = %id, "tour deleted");
    Ok(StatusCode::NO_CONTENT)
}
