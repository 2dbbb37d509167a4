use axum::extract::Path;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::Department;
use crate::db::DbError;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::policy::PgPolicyStore;

use super::utils;

#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
}

/// GET /api/orgs/:id/departments
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    utils::require_member(&store, org_id, user.user_id).await?;

    let departments: Vec<Department> =
        sqlx::query_as("SELECT * FROM departments WHERE org_id = $1 ORDER BY name ASC")
            .bind(org_id)
            .fetch_all(&pool)
            .await
            .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "departments": departments })))
}

/// POST /api/orgs/:id/departments - Admin only.
pub async fn create(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CreateDepartmentRequest>,
) -> ApiResult<Value> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }

    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let role = utils::require_member(&store, org_id, user.user_id).await?;
    utils::require_admin(role)?;

    let existing: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM departments WHERE org_id = $1 AND name = $2")
            .bind(org_id)
            .bind(payload.name.trim())
            .fetch_optional(&pool)
            .await
            .map_err(DbError::from)?;
    if existing.is_some() {
        return Err(ApiError::conflict("A department with this name already exists"));
    }

    let department: Department = sqlx::query_as(
        "INSERT INTO departments (org_id, name) VALUES ($1, $2) RETURNING *",
    )
    .bind(org_id)
    .bind(payload.name.trim())
    .fetch_one(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::created(json!({ "department": department })))
}

/// DELETE /api/departments/:id - Admin only.
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    Path(department_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let department: Option<Department> =
        sqlx::query_as("SELECT * FROM departments WHERE id = $1")
            .bind(department_id)
            .fetch_optional(&pool)
            .await
            .map_err(DbError::from)?;
    let department = department.ok_or_else(|| ApiError::not_found("Department not found"))?;

    let role = utils::require_member(&store, department.org_id, user.user_id).await?;
    utils::require_admin(role)?;

    sqlx::query("DELETE FROM departments WHERE id = $1")
        .bind(department_id)
        .execute(&pool)
        .await
        .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "deleted": department_id })))
}
