use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{
    generate_jwt, hash_password, new_salt, validate_jwt_for_refresh, verify_password, Claims,
};
use crate::config;
use crate::db::models::{Invitation, User};
use crate::db::Db;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::policy::OrgRole;

/// The duplicate-email pre-check races with the insert; a concurrent
/// register lands on the `users.email` unique constraint instead.
fn duplicate_email_conflict(err: sqlx::Error) -> ApiError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::conflict("An account with this email already exists")
        }
        _ => crate::db::DbError::from(err).into(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    /// Optional organization name; defaults to "<name>'s workspace".
    pub organization: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Pick a specific organization when the user belongs to several.
    pub org_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
    /// Required when the invited email has no account yet.
    pub name: Option<String>,
    pub password: Option<String>,
}

/// POST /auth/register - Create a user plus their initial organization.
///
/// The new user becomes organization admin, and the organization is
/// seeded with default ticket statuses and priorities.
pub async fn register(Json(payload): Json<RegisterRequest>) -> ApiResult<Value> {
    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        return Err(ApiError::missing_field("email"));
    }
    if payload.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::validation_error(
            "Password must be at least 8 characters",
            None,
        ));
    }

    let pool = Db::pool().await?;

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(payload.email.trim())
        .fetch_optional(&pool)
        .await
        .map_err(crate::db::DbError::from)?;
    if existing.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let salt = new_salt();
    let hash = hash_password(&payload.password, &salt);

    let mut tx = pool.begin().await.map_err(crate::db::DbError::from)?;

    let user: User = sqlx::query_as(
        "INSERT INTO users (email, name, password_hash, password_salt)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(payload.email.trim())
    .bind(payload.name.trim())
    .bind(&hash)
    .bind(&salt)
    .fetch_one(&mut *tx)
    .await
    .map_err(duplicate_email_conflict)?;

    let org_name = payload
        .organization
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("{}'s workspace", user.name));

    let org_id: Uuid =
        sqlx::query_scalar("INSERT INTO organizations (name) VALUES ($1) RETURNING id")
            .bind(org_name.trim())
            .fetch_one(&mut *tx)
            .await
            .map_err(crate::db::DbError::from)?;

    sqlx::query("INSERT INTO org_members (org_id, user_id, role) VALUES ($1, $2, $3)")
        .bind(org_id)
        .bind(user.id)
        .bind(OrgRole::Admin.as_str())
        .execute(&mut *tx)
        .await
        .map_err(crate::db::DbError::from)?;

    // Seed lookup tables so default-status selection has rows to pick from
    for (i, name) in ["Open", "In Progress", "Done"].iter().enumerate() {
        sqlx::query(
            "INSERT INTO ticket_statuses (org_id, name, sort_order) VALUES ($1, $2, $3)",
        )
        .bind(org_id)
        .bind(name)
        .bind((i + 1) as i32)
        .execute(&mut *tx)
        .await
        .map_err(crate::db::DbError::from)?;
    }
    for (i, name) in ["Low", "Medium", "High"].iter().enumerate() {
        sqlx::query(
            "INSERT INTO ticket_priorities (org_id, name, sort_order) VALUES ($1, $2, $3)",
        )
        .bind(org_id)
        .bind(name)
        .bind((i + 1) as i32)
        .execute(&mut *tx)
        .await
        .map_err(crate::db::DbError::from)?;
    }

    tx.commit().await.map_err(crate::db::DbError::from)?;

    let claims = Claims::new(user.id, org_id, None, user.email.clone(), OrgRole::Admin.as_str().into());
    let token = generate_jwt(&claims)?;

    Ok(ApiResponse::created(json!({
        "token": token,
        "expires_in": config::config().security.jwt_expiry_hours * 3600,
        "user": { "id": user.id, "email": user.email, "name": user.name },
        "org": { "id": org_id, "name": org_name.trim() },
    })))
}

/// POST /auth/login - Verify credentials and issue a token.
pub async fn login(Json(payload): Json<LoginRequest>) -> ApiResult<Value> {
    let pool = Db::pool().await?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(payload.email.trim())
        .fetch_optional(&pool)
        .await
        .map_err(crate::db::DbError::from)?;

    // Same error for unknown email and bad password
    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;
    if !verify_password(&payload.password, &user.password_salt, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let membership: Option<(Uuid, String, Option<Uuid>)> = match payload.org_id {
        Some(org_id) => sqlx::query_as(
            "SELECT org_id, role, department_id FROM org_members
             WHERE user_id = $1 AND org_id = $2",
        )
        .bind(user.id)
        .bind(org_id)
        .fetch_optional(&pool)
        .await
        .map_err(crate::db::DbError::from)?,
        None => sqlx::query_as(
            "SELECT org_id, role, department_id FROM org_members
             WHERE user_id = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(user.id)
        .fetch_optional(&pool)
        .await
        .map_err(crate::db::DbError::from)?,
    };

    let (org_id, role, department_id) =
        membership.ok_or_else(|| ApiError::forbidden("No organization membership"))?;

    let claims = Claims::new(user.id, org_id, department_id, user.email.clone(), role);
    let token = generate_jwt(&claims)?;

    Ok(ApiResponse::success(json!({
        "token": token,
        "expires_in": config::config().security.jwt_expiry_hours * 3600,
        "user": { "id": user.id, "email": user.email, "name": user.name },
        "org_id": org_id,
    })))
}

/// POST /auth/refresh - Re-issue a token. Accepts an expired token as
/// long as the signature is valid and it is inside the refresh window.
pub async fn refresh(Json(payload): Json<RefreshRequest>) -> ApiResult<Value> {
    let claims = validate_jwt_for_refresh(&payload.token)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    // The subject must still be a member of the claimed organization
    let pool = Db::pool().await?;
    let still_member: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM org_members WHERE org_id = $1 AND user_id = $2")
            .bind(claims.org_id)
            .bind(claims.sub)
            .fetch_optional(&pool)
            .await
            .map_err(crate::db::DbError::from)?;
    if still_member.is_none() {
        return Err(ApiError::forbidden("Membership no longer valid"));
    }

    let token = generate_jwt(&claims.renewed())?;

    Ok(ApiResponse::success(json!({
        "token": token,
        "expires_in": config::config().security.jwt_expiry_hours * 3600,
    })))
}

/// POST /auth/invitations/accept - Redeem an invitation token.
///
/// Creates the account when the invited email is new (name and password
/// required), otherwise attaches the existing account to the
/// organization. Returns a token scoped to the joined organization.
pub async fn accept_invitation(Json(payload): Json<AcceptInvitationRequest>) -> ApiResult<Value> {
    let pool = Db::pool().await?;

    let invitation: Option<Invitation> =
        sqlx::query_as("SELECT * FROM invitations WHERE token = $1")
            .bind(payload.token.trim())
            .fetch_optional(&pool)
            .await
            .map_err(crate::db::DbError::from)?;

    let invitation = invitation.ok_or_else(|| ApiError::not_found("Invitation not found"))?;
    if !invitation.is_pending() {
        return Err(ApiError::conflict("Invitation has already been used"));
    }
    let now = Utc::now();
    if invitation.is_expired(now) {
        return Err(ApiError::forbidden("Invitation has expired"));
    }

    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&invitation.email)
        .fetch_optional(&pool)
        .await
        .map_err(crate::db::DbError::from)?;

    let mut tx = pool.begin().await.map_err(crate::db::DbError::from)?;

    let user = match existing {
        Some(user) => user,
        None => {
            let name = payload
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| ApiError::missing_field("name"))?;
            let password = payload
                .password
                .as_deref()
                .filter(|p| p.len() >= 8)
                .ok_or_else(|| {
                    ApiError::validation_error("Password must be at least 8 characters", None)
                })?;

            let salt = new_salt();
            let hash = hash_password(password, &salt);

            sqlx::query_as(
                "INSERT INTO users (email, name, password_hash, password_salt)
                 VALUES ($1, $2, $3, $4)
                 RETURNING *",
            )
            .bind(&invitation.email)
            .bind(name)
            .bind(&hash)
            .bind(&salt)
            .fetch_one(&mut *tx)
            .await
            .map_err(duplicate_email_conflict)?
        }
    };

    let already: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM org_members WHERE org_id = $1 AND user_id = $2")
            .bind(invitation.org_id)
            .bind(user.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(crate::db::DbError::from)?;
    if already.is_some() {
        return Err(ApiError::conflict("Already a member of this organization"));
    }

    sqlx::query(
        "INSERT INTO org_members (org_id, user_id, role, department_id) VALUES ($1, $2, $3, $4)",
    )
    .bind(invitation.org_id)
    .bind(user.id)
    .bind(&invitation.role)
    .bind(invitation.department_id)
    .execute(&mut *tx)
    .await
    .map_err(crate::db::DbError::from)?;

    sqlx::query("UPDATE invitations SET status = 'accepted', accepted_at = $1 WHERE id = $2")
        .bind(now)
        .bind(invitation.id)
        .execute(&mut *tx)
        .await
        .map_err(crate::db::DbError::from)?;

    tx.commit().await.map_err(crate::db::DbError::from)?;

    let claims = Claims::new(
        user.id,
        invitation.org_id,
        invitation.department_id,
        user.email.clone(),
        invitation.role.clone(),
    );
    let token = generate_jwt(&claims)?;

    Ok(ApiResponse::success(json!({
        "token": token,
        "expires_in": config::config().security.jwt_expiry_hours * 3600,
        "user": { "id": user.id, "email": user.email, "name": user.name },
        "org_id": invitation.org_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::DatabaseError;

    #[derive(Debug)]
    struct DuplicateKey;

    impl std::fmt::Display for DuplicateKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message())
        }
    }

    impl std::error::Error for DuplicateKey {}

    impl sqlx::error::DatabaseError for DuplicateKey {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint \"users_email_key\""
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    #[test]
    fn concurrent_duplicate_registration_maps_to_conflict() {
        let err = duplicate_email_conflict(sqlx::Error::Database(Box::new(DuplicateKey)));
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.to_json()["code"], "CONFLICT");
    }

    #[test]
    fn other_insert_errors_keep_the_generic_mapping() {
        let err = duplicate_email_conflict(sqlx::Error::PoolClosed);
        assert_eq!(err.status_code(), 500);
    }
}
