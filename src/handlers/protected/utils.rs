use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{Project, Ticket};
use crate::db::{Db, DbError};
use crate::error::ApiError;
use crate::policy::{OrgRole, PgPolicyStore, PolicyStore, ProjectRole};

pub async fn pool() -> Result<PgPool, ApiError> {
    Ok(Db::pool().await?)
}

/// Caller's organization role, looked up fresh. 403 when the caller has
/// no membership row for the organization.
pub async fn require_member(
    store: &PgPolicyStore,
    org_id: Uuid,
    user_id: Uuid,
) -> Result<OrgRole, ApiError> {
    store
        .org_role(org_id, user_id)
        .await?
        .ok_or_else(|| ApiError::forbidden("Not a member of this organization"))
}

pub fn require_admin(role: OrgRole) -> Result<(), ApiError> {
    if role == OrgRole::Admin {
        Ok(())
    } else {
        Err(ApiError::forbidden("Organization admin role required"))
    }
}

/// Admin or project-level manager: the two roles allowed to administer a
/// project (members, shares, settings).
pub async fn require_project_manager(
    store: &PgPolicyStore,
    caller: Uuid,
    project: &Project,
) -> Result<(), ApiError> {
    if store.org_role(project.org_id, caller).await? == Some(OrgRole::Admin) {
        return Ok(());
    }
    if store.project_role(project.id, caller).await? == Some(ProjectRole::Manager) {
        return Ok(());
    }
    Err(ApiError::forbidden("Project manager role required"))
}

pub async fn fetch_project(pool: &PgPool, id: Uuid) -> Result<Project, ApiError> {
    let project: Option<Project> = sqlx::query_as("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::from)?;
    project.ok_or_else(|| ApiError::not_found("Project not found"))
}

pub async fn fetch_ticket(pool: &PgPool, id: Uuid) -> Result<Ticket, ApiError> {
    let ticket: Option<Ticket> = sqlx::query_as("SELECT * FROM tickets WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::from)?;
    ticket.ok_or_else(|| ApiError::not_found("Ticket not found"))
}

/// Clamp a requested page size to the configured bounds.
pub fn page_size(requested: Option<i64>) -> i64 {
    let api = &crate::config::config().api;
    requested.unwrap_or(api.default_page_size).clamp(1, api.max_page_size)
}
