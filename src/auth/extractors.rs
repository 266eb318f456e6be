use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::{
    auth::jwt::{JwtKeys, TokenError},
    error::ApiError,
    state::AppState,
    users::repo::{Role, User},
};

/// Authenticated identity, resolved fresh from the store on every request.
/// Each gate short-circuits: bearer header, signature/expiry, live account,
/// stale-token check against the password-change timestamp.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ApiError::Authentication("You are not logged in. Please log in again".into())
            })?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Authentication("Invalid Authorization header".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            match e {
                TokenError::Expired => warn!("token expired"),
                TokenError::Invalid => warn!("invalid token"),
            }
            ApiError::Authentication("Invalid or expired token".into())
        })?;

        let user = User::find_active_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| ApiError::Authentication("User no longer exists".into()))?;

        if user.changed_password_after(claims.iat as i64) {
            warn!(user_id = %user.id, "stale token after password change");
            return Err(ApiError::Authentication(
                "Password has changed. Please log in again".into(),
            ));
        }

        Ok(CurrentUser(user))
    }
}

impl CurrentUser {
    /// Role gate for protected operations.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.0.role) {
            Ok(())
        } else {
            Err(ApiError::Authorization(
                "You do not have permission to perform this action".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user_with_role(role: Role) -> CurrentUser {
        CurrentUser(User {
            id: Uuid::new_v4(),
            name: "Guide".into(),
            email: "guide@example.com".into(),
            role,
            password_hash: "hash".into(),
            password_changed_at: None,
            password_reset_hash: None,
            password_reset_expires: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    #[test]
    fn member_of_allow_list_passes() {
        let current = user_with_role(Role::LeadGuide);
        assert!(current
            .require_role(&[Role::Admin, Role::LeadGuide])
            .is_ok());
    }

    #[test]
    fn non_member_is_forbidden() {
        let current = user_with_role(Role::User);
        let err = current
            .require_role(&[Role::Admin, Role::LeadGuide])
            .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));
    }

    #[test]
    fn empty_allow_list_rejects_everyone() {
        let current = user_with_role(Role::Admin);
        assert!(current.require_role(&[]).is_err());
    }
}
