use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::{self, QuerySpec};

const USER_COLUMNS: &str = "id, name, email, role, password_hash, \
     password_changed_at, password_reset_hash, password_reset_expires, \
     active, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Admin,
    Guide,
    LeadGuide,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_hash: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<OffsetDateTime>,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

/// Admin-editable fields; `None` leaves a column untouched.
#[derive(Debug, Default, Clone)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

impl User {
    /// True when the password changed after a token with this issued-at
    /// was signed. Such tokens are stale and must be rejected.
    pub fn changed_password_after(&self, token_iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed) => changed.unix_timestamp() > token_iat,
            None => false,
        }
    }

    /// Authentication lookup: deactivated accounts are invisible here.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND active");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn find_active_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Administrative lookup, deactivated accounts included.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash) \
             VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(name)
            .bind(email)
            .bind(password_hash)
            .fetch_one(db)
            .await?;
        Ok(user)
    }

    pub async fn list(db: &PgPool, spec: &QuerySpec) -> anyhow::Result<Vec<User>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        query::sql::apply(&mut qb, spec);
        let users = qb.build_query_as::<User>().fetch_all(db).await?;
        Ok(users)
    }

    pub async fn update_fields(
        db: &PgPool,
        id: Uuid,
        changes: UserChanges,
    ) -> anyhow::Result<Option<User>> {
        let UserChanges {
            name,
            email,
            role,
            active,
        } = changes;
        if name.is_none() && email.is_none() && role.is_none() && active.is_none() {
            return Self::find_by_id(db, id).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET ");
        let mut set = qb.separated(", ");
        if let Some(name) = name {
            set.push("name = ").push_bind_unseparated(name);
        }
        if let Some(email) = email {
            set.push("email = ").push_bind_unseparated(email);
        }
        if let Some(role) = role {
            set.push("role = ").push_bind_unseparated(role);
        }
        if let Some(active) = active {
            set.push("active = ").push_bind_unseparated(active);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(" RETURNING {USER_COLUMNS}"));

        let user = qb.build_query_as::<User>().fetch_optional(db).await?;
        Ok(user)
    }

    /// Single atomic update: new hash, bumped change timestamp, reset
    /// credentials cleared.
    pub async fn set_password(
        db: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET password_hash = $2, password_changed_at = now(), \
             password_reset_hash = NULL, password_reset_expires = NULL \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(password_hash)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Targeted write of the reset credential pair; no other columns are
    /// touched, so no unrelated validation runs.
    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET password_reset_hash = $2, password_reset_expires = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Both reset fields go away together.
    pub async fn clear_reset_token(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET password_reset_hash = NULL, password_reset_expires = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Reset lookup: digest equality and an unexpired window, in one query.
    pub async fn find_by_reset_hash(
        db: &PgPool,
        token_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE password_reset_hash = $1 AND password_reset_expires > now() AND active"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token_hash)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn deactivate(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn sample_user(password_changed_at: Option<OffsetDateTime>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Jonas".into(),
            email: "jonas@example.com".into(),
            role: Role::User,
            password_hash: "$argon2id$fake".into(),
            password_changed_at,
            password_reset_hash: Some("digest".into()),
            password_reset_expires: Some(OffsetDateTime::now_utc()),
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn password_change_after_token_issuance_is_stale() {
        let changed = OffsetDateTime::now_utc();
        let user = sample_user(Some(changed));
        let earlier_iat = (changed - Duration::minutes(5)).unix_timestamp();
        assert!(user.changed_password_after(earlier_iat));
    }

    #[test]
    fn token_issued_after_password_change_is_fresh() {
        let changed = OffsetDateTime::now_utc();
        let user = sample_user(Some(changed));
        let later_iat = (changed + Duration::minutes(5)).unix_timestamp();
        assert!(!user.changed_password_after(later_iat));
    }

    #[test]
    fn never_changed_password_is_never_stale() {
        let user = sample_user(None);
        assert!(!user.changed_password_after(0));
    }

    #[test]
    fn secrets_never_serialize() {
        let user = sample_user(Some(OffsetDateTime::now_utc()));
        let value = serde_json::to_value(&user).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("password_hash"));
        assert!(!obj.contains_key("password_changed_at"));
        assert!(!obj.contains_key("password_reset_hash"));
        assert!(!obj.contains_key("password_reset_expires"));
        assert!(obj.contains_key("email"));
    }

    #[test]
    fn role_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(Role::LeadGuide).unwrap(),
            serde_json::json!("lead-guide")
        );
        assert_eq!(
            serde_json::from_value::<Role>(serde_json::json!("admin")).unwrap(),
            Role::Admin
        );
    }
}
