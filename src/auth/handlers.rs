use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::Duration;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, PublicUser,
            ResetPasswordRequest, SignupRequest, UpdatePasswordRequest,
        },
        extractors::CurrentUser,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        reset,
    },
    email::Mailer as _,
    error::ApiError,
    state::AppState,
    users::repo::User,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", patch(reset_password))
        .route("/auth/update-password", patch(update_password))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_new_password(password: &str, confirm: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation("Password too short".into()));
    }
    if password != confirm {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    validate_new_password(&payload.password, &payload.confirm_password)?;

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Validation("Email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, payload.name.trim(), &payload.email, &hash).await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide email and password".into(),
        ));
    }

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            ApiError::NotFound("No user found with that email".into())
        })?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Authentication("Invalid password".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that email".into()))?;

    let ttl = Duration::minutes(state.config.reset_token_ttl_minutes);
    let token = reset::generate(ttl);
    User::set_reset_token(&state.db, user.id, &token.hash, token.expires_at).await?;

    let reset_url = format!(
        "{}/api/v1/auth/reset-password/{}",
        state.config.public_base_url, token.plaintext
    );
    let body = format!(
        "Forgot your password? Open this link to choose a new one: {reset_url}\n\
         The link expires in {} minutes. If you did not ask for a reset, ignore this email.",
        state.config.reset_token_ttl_minutes
    );

    if let Err(e) = state
        .mailer
        .send(&user.email, "Your password reset token", &body)
        .await
    {
        // A token whose plaintext never reached the user must not stay live.
        error!(error = %e, user_id = %user.id, "reset email failed, clearing token");
        User::clear_reset_token(&state.db, user.id).await?;
        return Err(ApiError::Delivery("Error sending email".into()));
    }

    info!(user_id = %user.id, "reset email sent");
    Ok(Json(MessageResponse {
        message: "Reset password email sent".into(),
    }))
}

#[instrument(skip(state, payload, token))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    validate_new_password(&payload.password, &payload.confirm_password)?;

    let user = User::find_by_reset_hash(&state.db, &reset::hash_token(&token))
        .await?
        .ok_or_else(|| ApiError::Validation("Token is invalid or has expired".into()))?;

    // Lookup was by digest; confirm the candidate against the stored hash.
    let stored = user.password_reset_hash.as_deref().unwrap_or_default();
    if !reset::matches(&token, stored) {
        return Err(ApiError::Validation("Token is invalid or has expired".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::set_password(&state.db, user.id, &hash)
        .await?
        .ok_or_else(|| ApiError::NotFound("User no longer exists".into()))?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, "password reset");
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state, current, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let CurrentUser(user) = current;

    if !verify_password(&payload.current_password, &user.password_hash)? {
        warn!(user_id = %user.id, "wrong current password");
        return Err(ApiError::Authentication("Incorrect current password".into()));
    }
    validate_new_password(&payload.password, &payload.confirm_password)?;

    let hash = hash_password(&payload.password)?;
    let user = User::set_password(&state.db, user.id, &hash)
        .await?
        .ok_or_else(|| ApiError::NotFound("User no longer exists".into()))?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, "password updated");
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("jonas@example.com"));
        assert!(is_valid_email("a.b+c@mail.co"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn new_password_must_be_long_enough() {
        let err = validate_new_password("short", "short").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn new_password_must_match_confirmation() {
        let err = validate_new_password("long-enough-pass", "different-pass").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(validate_new_password("long-enough-pass", "long-enough-pass").is_ok());
    }
}
