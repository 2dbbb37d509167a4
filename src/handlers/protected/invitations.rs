use axum::extract::Path;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::new_invitation_token;
use crate::db::models::Invitation;
use crate::db::DbError;
use crate::email;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::policy::{OrgRole, PgPolicyStore};

use super::utils;

fn invitation_expiry() -> chrono::DateTime<chrono::Utc> {
    let days = crate::config::config().security.invitation_expiry_days;
    chrono::Utc::now() + chrono::Duration::days(days)
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub email: String,
    pub role: Option<String>,
    pub department_id: Option<Uuid>,
}

/// GET /api/orgs/:id/invitations - Pending invitations, admin only.
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let role = utils::require_member(&store, org_id, user.user_id).await?;
    utils::require_admin(role)?;

    let invitations: Vec<Invitation> = sqlx::query_as(
        "SELECT * FROM invitations WHERE org_id = $1 AND status = 'pending' ORDER BY created_at DESC",
    )
    .bind(org_id)
    .fetch_all(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "invitations": invitations })))
}

/// POST /api/orgs/:id/invitations - Invite an email address, admin only.
/// The invitation email is best-effort; a delivery failure does not void
/// the invitation row.
pub async fn create(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CreateInvitationRequest>,
) -> ApiResult<Value> {
    let email_addr = payload.email.trim().to_ascii_lowercase();
    if email_addr.is_empty() || !email_addr.contains('@') {
        return Err(ApiError::missing_field("email"));
    }

    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let caller_role = utils::require_member(&store, org_id, user.user_id).await?;
    utils::require_admin(caller_role)?;

    let role = match payload.role.as_deref() {
        None => OrgRole::Member,
        Some(s) => OrgRole::parse(s)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown role: {}", s)))?,
    };

    if let Some(dept) = payload.department_id {
        let in_org: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM departments WHERE id = $1 AND org_id = $2")
                .bind(dept)
                .bind(org_id)
                .fetch_optional(&pool)
                .await
                .map_err(DbError::from)?;
        if in_org.is_none() {
            return Err(ApiError::bad_request("Department does not belong to this organization"));
        }
    }

    let already_member: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM org_members m JOIN users u ON u.id = m.user_id
         WHERE m.org_id = $1 AND u.email = $2",
    )
    .bind(org_id)
    .bind(&email_addr)
    .fetch_optional(&pool)
    .await
    .map_err(DbError::from)?;
    if already_member.is_some() {
        return Err(ApiError::conflict("User is already a member of this organization"));
    }

    let token = new_invitation_token();
    let invitation: Invitation = sqlx::query_as(
        "INSERT INTO invitations (org_id, email, role, department_id, token, invited_by, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(org_id)
    .bind(&email_addr)
    .bind(role.as_str())
    .bind(payload.department_id)
    .bind(&token)
    .bind(user.user_id)
    .bind(invitation_expiry())
    .fetch_one(&pool)
    .await
    .map_err(DbError::from)?;

    let org_name: String = sqlx::query_scalar("SELECT name FROM organizations WHERE id = $1")
        .bind(org_id)
        .fetch_one(&pool)
        .await
        .map_err(DbError::from)?;

    email::send_best_effort(
        &email_addr,
        &format!("You have been invited to {}", org_name),
        &format!(
            "You have been invited to join {} as {}.\n\nInvitation code: {}\n\nThis invitation expires on {}.",
            org_name,
            role.as_str(),
            token,
            invitation.expires_at.format("%Y-%m-%d"),
        ),
    );

    Ok(ApiResponse::created(json!({ "invitation": invitation })))
}

/// DELETE /api/invitations/:id - Revoke a pending invitation, admin only.
pub async fn revoke(
    Extension(user): Extension<AuthUser>,
    Path(invitation_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let invitation: Option<Invitation> =
        sqlx::query_as("SELECT * FROM invitations WHERE id = $1")
            .bind(invitation_id)
            .fetch_optional(&pool)
            .await
            .map_err(DbError::from)?;
    let invitation = invitation.ok_or_else(|| ApiError::not_found("Invitation not found"))?;

    let role = utils::require_member(&store, invitation.org_id, user.user_id).await?;
    utils::require_admin(role)?;

    if !invitation.is_pending() {
        return Err(ApiError::conflict("Invitation is not pending"));
    }

    sqlx::query("UPDATE invitations SET status = 'revoked' WHERE id = $1")
        .bind(invitation_id)
        .execute(&pool)
        .await
        .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "revoked": invitation_id })))
}
