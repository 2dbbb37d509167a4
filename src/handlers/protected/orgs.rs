use axum::extract::Path;
use axum::Extension;
use serde_json::{json, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::models::Organization;
use crate::db::DbError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::policy::PgPolicyStore;

use super::utils;

#[derive(Debug, FromRow, serde::Serialize)]
struct OrgWithRole {
    id: Uuid,
    name: String,
    role: String,
    department_id: Option<Uuid>,
}

#[derive(Debug, FromRow, serde::Serialize)]
struct MemberRow {
    user_id: Uuid,
    email: String,
    name: String,
    role: String,
    department_id: Option<Uuid>,
    department_name: Option<String>,
}

/// GET /api/orgs - Organizations the caller belongs to.
pub async fn list(Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    let pool = utils::pool().await?;

    let orgs: Vec<OrgWithRole> = sqlx::query_as(
        "SELECT o.id, o.name, m.role, m.department_id
         FROM organizations o
         JOIN org_members m ON m.org_id = o.id
         WHERE m.user_id = $1
         ORDER BY o.created_at ASC",
    )
    .bind(user.user_id)
    .fetch_all(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "orgs": orgs })))
}

/// GET /api/orgs/:id - Organization details, members only.
pub async fn get(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let role = utils::require_member(&store, org_id, user.user_id).await?;

    let org: Option<Organization> = sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
        .bind(org_id)
        .fetch_optional(&pool)
        .await
        .map_err(DbError::from)?;
    let org = org.ok_or_else(|| crate::error::ApiError::not_found("Organization not found"))?;

    Ok(ApiResponse::success(json!({ "org": org, "role": role.as_str() })))
}

/// GET /api/orgs/:id/members - Membership roster with departments.
pub async fn members(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    utils::require_member(&store, org_id, user.user_id).await?;

    let members: Vec<MemberRow> = sqlx::query_as(
        "SELECT m.user_id, u.email, u.name, m.role, m.department_id, d.name AS department_name
         FROM org_members m
         JOIN users u ON u.id = m.user_id
         LEFT JOIN departments d ON d.id = m.department_id
         WHERE m.org_id = $1
         ORDER BY u.name ASC",
    )
    .bind(org_id)
    .fetch_all(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "members": members })))
}
