use axum::extract::Path;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::{Project, ProjectDepartmentShare};
use crate::db::DbError;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::policy::{OrgRole, PgPolicyStore, PolicyStore, ProjectRole};

use super::utils;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub department_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub department_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub department_id: Uuid,
}

#[derive(Debug, sqlx::FromRow, serde::Serialize)]
struct ProjectMemberRow {
    user_id: Uuid,
    email: String,
    name: String,
    role: String,
}

/// GET /api/orgs/:id/projects
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    utils::require_member(&store, org_id, user.user_id).await?;

    let projects: Vec<Project> =
        sqlx::query_as("SELECT * FROM projects WHERE org_id = $1 ORDER BY created_at DESC")
            .bind(org_id)
            .fetch_all(&pool)
            .await
            .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "projects": projects })))
}

/// POST /api/orgs/:id/projects - Admins and org managers may create.
/// The creator receives a project-level manager row.
pub async fn create(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<Value> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }

    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let role = utils::require_member(&store, org_id, user.user_id).await?;
    if role == OrgRole::Member {
        return Err(ApiError::forbidden("Organization admin or manager role required"));
    }

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

    let mut tx = pool.begin().await.map_err(DbError::from)?;

    let project: Project = sqlx::query_as(
        "INSERT INTO projects (org_id, department_id, name, description, created_by)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(org_id)
    .bind(payload.department_id)
    .bind(payload.name.trim())
    .bind(payload.description.as_deref())
    .bind(user.user_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(DbError::from)?;

    sqlx::query("INSERT INTO project_members (project_id, user_id, role) VALUES ($1, $2, $3)")
        .bind(project.id)
        .bind(user.user_id)
        .bind(ProjectRole::Manager.as_str())
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

    tx.commit().await.map_err(DbError::from)?;

    Ok(ApiResponse::created(json!({ "project": project })))
}

/// GET /api/projects/:id
pub async fn get(
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;

    let shares: Vec<ProjectDepartmentShare> =
        sqlx::query_as("SELECT * FROM project_department_shares WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(&pool)
            .await
            .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "project": project, "shares": shares })))
}

/// PUT /api/projects/:id - Admin or project manager.
pub async fn update(
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;
    utils::require_project_manager(&store, user.user_id, &project).await?;

    if let Some(dept) = payload.department_id {
        let in_org: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM departments WHERE id = $1 AND org_id = $2")
                .bind(dept)
                .bind(project.org_id)
                .fetch_optional(&pool)
                .await
                .map_err(DbError::from)?;
        if in_org.is_none() {
            return Err(ApiError::bad_request("Department does not belong to this organization"));
        }
    }

    let updated: Project = sqlx::query_as(
        "UPDATE projects
         SET name = COALESCE($2, name),
             description = COALESCE($3, description),
             department_id = COALESCE($4, department_id),
             updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(project_id)
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.description.as_deref())
    .bind(payload.department_id)
    .fetch_one(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "project": updated })))
}

/// DELETE /api/projects/:id - Admin or project manager. Dependent rows
/// (tickets, members, shares) go with it via cascading deletes.
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;
    utils::require_project_manager(&store, user.user_id, &project).await?;

    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(&pool)
        .await
        .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "deleted": project_id })))
}

/// GET /api/projects/:id/members
pub async fn members(
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;

    let members: Vec<ProjectMemberRow> = sqlx::query_as(
        "SELECT pm.user_id, u.email, u.name, pm.role
         FROM project_members pm
         JOIN users u ON u.id = pm.user_id
         WHERE pm.project_id = $1
         ORDER BY u.name ASC",
    )
    .bind(project_id)
    .fetch_all(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "members": members })))
}

/// POST /api/projects/:id/members - Admin or project manager adds an
/// organization member to the project.
pub async fn add_member(
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;
    utils::require_project_manager(&store, user.user_id, &project).await?;

    // Target must already belong to the same organization
    if store.org_role(project.org_id, payload.user_id).await?.is_none() {
        return Err(ApiError::forbidden("User is not a member of this organization"));
    }

    let role = match payload.role.as_deref() {
        None => ProjectRole::Member,
        Some(s) => ProjectRole::parse(s)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown project role: {}", s)))?,
    };

    sqlx::query(
        "INSERT INTO project_members (project_id, user_id, role)
         VALUES ($1, $2, $3)
         ON CONFLICT (project_id, user_id) DO UPDATE SET role = EXCLUDED.role",
    )
    .bind(project_id)
    .bind(payload.user_id)
    .bind(role.as_str())
    .execute(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::created(json!({
        "project_id": project_id,
        "user_id": payload.user_id,
        "role": role.as_str(),
    })))
}

/// DELETE /api/projects/:id/members/:user_id
pub async fn remove_member(
    Extension(user): Extension<AuthUser>,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;
    utils::require_project_manager(&store, user.user_id, &project).await?;

    let result = sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(member_id)
        .execute(&pool)
        .await
        .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project membership not found"));
    }

    Ok(ApiResponse::success(json!({ "removed": member_id })))
}

/// POST /api/projects/:id/shares - Share the project with a department.
pub async fn add_share(
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<ShareRequest>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;
    utils::require_project_manager(&store, user.user_id, &project).await?;

    let in_org: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM departments WHERE id = $1 AND org_id = $2")
            .bind(payload.department_id)
            .bind(project.org_id)
            .fetch_optional(&pool)
            .await
            .map_err(DbError::from)?;
    if in_org.is_none() {
        return Err(ApiError::bad_request("Department does not belong to this organization"));
    }

    sqlx::query(
        "INSERT INTO project_department_shares (project_id, department_id)
         VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(project_id)
    .bind(payload.department_id)
    .execute(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::created(json!({
        "project_id": project_id,
        "department_id": payload.department_id,
    })))
}

/// DELETE /api/projects/:id/shares/:department_id
pub async fn remove_share(
    Extension(user): Extension<AuthUser>,
    Path((project_id, department_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;
    utils::require_project_manager(&store, user.user_id, &project).await?;

    let result = sqlx::query(
        "DELETE FROM project_department_shares WHERE project_id = $1 AND department_id = $2",
    )
    .bind(project_id)
    .bind(department_id)
    .execute(&pool)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Share not found"));
    }

    Ok(ApiResponse::success(json!({ "removed": department_id })))
}
