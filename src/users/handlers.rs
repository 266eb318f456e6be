use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{dto::PublicUser, extractors::CurrentUser, handlers::is_valid_email},
    error::ApiError,
    query::{self, PageDefaults, QuerySpec},
    state::AppState,
    users::{
        dto::{AdminUpdateUserRequest, UpdateMeRequest},
        repo::{Role, User, UserChanges},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).patch(update_me).delete(delete_me))
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[instrument(skip_all)]
pub async fn get_me(current: CurrentUser) -> Json<PublicUser> {
    Json(current.0.into())
}

#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    if payload.password.is_some() || payload.confirm_password.is_some() {
        return Err(ApiError::Validation(
            "This route does not allow password updates".into(),
        ));
    }

    let email = match payload.email {
        Some(raw) => {
            let email = raw.trim().to_lowercase();
            if !is_valid_email(&email) {
                warn!(%email, "invalid email");
                return Err(ApiError::Validation("Invalid email".into()));
            }
            Some(email)
        }
        None => None,
    };

    let user = User::update_fields(
        &state.db,
        current.0.id,
        UserChanges {
            name: payload.name,
            email,
            ..UserChanges::default()
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User no longer exists".into()))?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(user.into()))
}

#[instrument(skip_all)]
pub async fn delete_me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<StatusCode, ApiError> {
    User::deactivate(&state.db, current.0.id).await?;
    info!(user_id = %current.0.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current))]
pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    current.require_role(&[Role::Admin])?;

    let spec = QuerySpec::from_params(
        &params,
        PageDefaults {
            default_limit: state.config.default_page_size,
            max_limit: state.config.max_page_size,
        },
    )?;
    let users = User::list(&state.db, &spec).await?;

    let items = users
        .into_iter()
        .map(|u| {
            let value = serde_json::to_value(&u)?;
            Ok(match &spec.fields {
                Some(fields) => query::project_fields(value, fields),
                None => value,
            })
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()
        .map_err(anyhow::Error::from)?;
    Ok(Json(items))
}

#[instrument(skip(state, current))]
pub async fn get_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;
    Ok(Json(user))
}

#[instrument(skip(state, current, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    current.require_role(&[Role::Admin])?;

    let email = match payload.email {
        Some(raw) => {
            let email = raw.trim().to_lowercase();
            if !is_valid_email(&email) {
                return Err(ApiError::Validation("Invalid email".into()));
            }
            Some(email)
        }
        None => None,
    };

    let user = User::update_fields(
        &state.db,
        id,
        UserChanges {
            name: payload.name,
            email,
            role: payload.role,
            active: payload.active,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;

    info!(user_id = %user.id, "user updated by admin");
    Ok(Json(user))
}

#[instrument(skip(state, current))]
pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    current.require_role(&[Role::Admin])?;
    if !User::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("No user found with that ID".into()));
    }
    info!(user_id = %id, "user deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}
