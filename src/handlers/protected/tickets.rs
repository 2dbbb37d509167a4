use axum::extract::{Path, Query};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::{ActivityEntry, Ticket, TicketPriority, TicketStatus};
use crate::db::DbError;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::policy::{self, PgPolicyStore, PolicyStore, ProjectRef, TicketAction, TicketRef};
use crate::services::ticket_effects;

use super::utils;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status_id: Option<Uuid>,
    pub assignee: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: Option<String>,
    pub status_id: Option<Uuid>,
    pub priority_id: Option<Uuid>,
    pub assignee: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status_id: Option<Uuid>,
    pub priority_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// None clears the assignment.
    pub assignee: Option<Uuid>,
}

#[derive(Debug, sqlx::FromRow, serde::Serialize)]
struct UserBrief {
    id: Uuid,
    email: String,
    name: String,
}

/// GET /api/projects/:id/tickets
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;

    let project_ref =
        ProjectRef { id: project.id, org_id: project.org_id, department_id: project.department_id };
    if !policy::can_create_ticket(&store, user.user_id, &project_ref).await? {
        return Err(ApiError::forbidden("No access to this project"));
    }

    let limit = utils::page_size(query.limit);
    let offset = query.offset.unwrap_or(0).max(0);

    let tickets: Vec<Ticket> = sqlx::query_as(
        "SELECT * FROM tickets
         WHERE project_id = $1
           AND ($2::uuid IS NULL OR status_id = $2)
           AND ($3::uuid IS NULL OR assignee = $3)
         ORDER BY created_at DESC
         LIMIT $4 OFFSET $5",
    )
    .bind(project_id)
    .bind(query.status_id)
    .bind(query.assignee)
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "tickets": tickets })))
}

/// POST /api/projects/:id/tickets - Create a ticket.
///
/// When no status is supplied the organization's default applies: the
/// active status row with the lowest sort_order. An assignee supplied at
/// creation goes through the same validation chain as reassignment.
pub async fn create(
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreateTicketRequest>,
) -> ApiResult<Value> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::missing_field("title"));
    }

    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let project = utils::fetch_project(&pool, project_id).await?;
    utils::require_member(&store, project.org_id, user.user_id).await?;

    let project_ref =
        ProjectRef { id: project.id, org_id: project.org_id, department_id: project.department_id };
    if !policy::can_create_ticket(&store, user.user_id, &project_ref).await? {
        return Err(ApiError::forbidden("No access to this project"));
    }

    let status_id = match payload.status_id {
        Some(id) => {
            let valid: Option<i32> = sqlx::query_scalar(
                "SELECT 1 FROM ticket_statuses WHERE id = $1 AND org_id = $2 AND is_active",
            )
            .bind(id)
            .bind(project.org_id)
            .fetch_optional(&pool)
            .await
            .map_err(DbError::from)?;
            if valid.is_none() {
                return Err(ApiError::bad_request("Unknown or inactive ticket status"));
            }
            id
        }
        None => policy::default_status_id(&store, project.org_id)
            .await?
            .ok_or_else(|| ApiError::bad_request("Organization has no active ticket statuses"))?,
    };

    if let Some(priority_id) = payload.priority_id {
        let valid: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM ticket_priorities WHERE id = $1 AND org_id = $2 AND is_active",
        )
        .bind(priority_id)
        .bind(project.org_id)
        .fetch_optional(&pool)
        .await
        .map_err(DbError::from)?;
        if valid.is_none() {
            return Err(ApiError::bad_request("Unknown or inactive ticket priority"));
        }
    }

    if let Some(target) = payload.assignee {
        if store.org_role(project.org_id, target).await?.is_none() {
            return Err(ApiError::forbidden("Assignee is not a member of this organization"));
        }
        let ticket_ref = TicketRef {
            id: Uuid::nil(), // not yet inserted; the chain only needs org and project
            org_id: project.org_id,
            project_id: project.id,
            created_by: user.user_id,
            assignee: None,
        };
        if !policy::can_assign(&store, user.user_id, target, &ticket_ref).await? {
            return Err(ApiError::forbidden("Assignee is outside the project's assignment pool"));
        }
    }

    let ticket: Ticket = sqlx::query_as(
        "INSERT INTO tickets (org_id, project_id, title, description, status_id, priority_id, created_by, assignee)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING *",
    )
    .bind(project.org_id)
    .bind(project.id)
    .bind(payload.title.trim())
    .bind(payload.description.as_deref())
    .bind(status_id)
    .bind(payload.priority_id)
    .bind(user.user_id)
    .bind(payload.assignee)
    .fetch_one(&pool)
    .await
    .map_err(DbError::from)?;

    // Best-effort side effects; the insert above already committed
    ticket_effects::record_activity(&pool, &ticket, user.user_id, "created", None).await;
    if let Some(assignee) = ticket.assignee {
        ticket_effects::on_assignment(&pool, &ticket, user.user_id, assignee).await;
    }

    Ok(ApiResponse::created(json!({ "ticket": ticket })))
}

/// GET /api/tickets/:id - Ticket detail.
///
/// The related rows have no ordering dependency, so they are fetched
/// concurrently; any single failure turns into a generic error.
pub async fn get(
    Extension(user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let ticket = utils::fetch_ticket(&pool, ticket_id).await?;
    utils::require_member(&store, ticket.org_id, user.user_id).await?;

    let (project, creator, assignee, status, priority) = tokio::try_join!(
        async {
            sqlx::query_as::<_, crate::db::models::Project>("SELECT * FROM projects WHERE id = $1")
                .bind(ticket.project_id)
                .fetch_one(&pool)
                .await
                .map_err(DbError::from)
        },
        async {
            sqlx::query_as::<_, UserBrief>("SELECT id, email, name FROM users WHERE id = $1")
                .bind(ticket.created_by)
                .fetch_one(&pool)
                .await
                .map_err(DbError::from)
        },
        async {
            match ticket.assignee {
                Some(id) => sqlx::query_as::<_, UserBrief>(
                    "SELECT id, email, name FROM users WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&pool)
                .await
                .map_err(DbError::from),
                None => Ok(None),
            }
        },
        async {
            sqlx::query_as::<_, TicketStatus>("SELECT * FROM ticket_statuses WHERE id = $1")
                .bind(ticket.status_id)
                .fetch_one(&pool)
                .await
                .map_err(DbError::from)
        },
        async {
            match ticket.priority_id {
                Some(id) => sqlx::query_as::<_, TicketPriority>(
                    "SELECT * FROM ticket_priorities WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&pool)
                .await
                .map_err(DbError::from),
                None => Ok(None),
            }
        },
    )?;

    Ok(ApiResponse::success(json!({
        "ticket": ticket,
        "project": project,
        "creator": creator,
        "assignee": assignee,
        "status": status,
        "priority": priority,
    })))
}

/// PUT /api/tickets/:id - Edit fields. Permission resolution per the
/// ordered chain: org admin, creator, assignee, project manager.
pub async fn update(
    Extension(user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
    Json(payload): Json<UpdateTicketRequest>,
) -> ApiResult<Value> {
    // A ticket can never lose its title; absent means "leave unchanged"
    if payload.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::missing_field("title"));
    }

    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let ticket = utils::fetch_ticket(&pool, ticket_id).await?;
    utils::require_member(&store, ticket.org_id, user.user_id).await?;

    let ticket_ref = TicketRef::from(&ticket);
    if !policy::can_mutate_ticket(&store, user.user_id, &ticket_ref, TicketAction::Edit).await? {
        return Err(ApiError::forbidden("Not allowed to edit this ticket"));
    }

    if let Some(status_id) = payload.status_id {
        let valid: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM ticket_statuses WHERE id = $1 AND org_id = $2 AND is_active",
        )
        .bind(status_id)
        .bind(ticket.org_id)
        .fetch_optional(&pool)
        .await
        .map_err(DbError::from)?;
        if valid.is_none() {
            return Err(ApiError::bad_request("Unknown or inactive ticket status"));
        }
    }
    if let Some(priority_id) = payload.priority_id {
        let valid: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM ticket_priorities WHERE id = $1 AND org_id = $2 AND is_active",
        )
        .bind(priority_id)
        .bind(ticket.org_id)
        .fetch_optional(&pool)
        .await
        .map_err(DbError::from)?;
        if valid.is_none() {
            return Err(ApiError::bad_request("Unknown or inactive ticket priority"));
        }
    }

    let updated: Ticket = sqlx::query_as(
        "UPDATE tickets
         SET title = COALESCE($2, title),
             description = COALESCE($3, description),
             status_id = COALESCE($4, status_id),
             priority_id = COALESCE($5, priority_id),
             updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(ticket_id)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(payload.description.as_deref())
    .bind(payload.status_id)
    .bind(payload.priority_id)
    .fetch_one(&pool)
    .await
    .map_err(DbError::from)?;

    ticket_effects::record_activity(&pool, &updated, user.user_id, "updated", None).await;

    Ok(ApiResponse::success(json!({ "ticket": updated })))
}

/// DELETE /api/tickets/:id - Same chain, minus the assignee step.
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let ticket = utils::fetch_ticket(&pool, ticket_id).await?;
    utils::require_member(&store, ticket.org_id, user.user_id).await?;

    let ticket_ref = TicketRef::from(&ticket);
    if !policy::can_mutate_ticket(&store, user.user_id, &ticket_ref, TicketAction::Delete).await? {
        return Err(ApiError::forbidden("Not allowed to delete this ticket"));
    }

    sqlx::query("DELETE FROM tickets WHERE id = $1")
        .bind(ticket_id)
        .execute(&pool)
        .await
        .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "deleted": ticket_id })))
}

/// POST /api/tickets/:id/assign - Assign or clear the assignee.
///
/// Assignment is an edit for the caller's own permission, then the
/// target goes through the short-circuit validation chain: org admin,
/// shared department, department-level share, direct membership.
pub async fn assign(
    Extension(user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let ticket = utils::fetch_ticket(&pool, ticket_id).await?;
    utils::require_member(&store, ticket.org_id, user.user_id).await?;

    let ticket_ref = TicketRef::from(&ticket);
    if !policy::can_mutate_ticket(&store, user.user_id, &ticket_ref, TicketAction::Edit).await? {
        return Err(ApiError::forbidden("Not allowed to edit this ticket"));
    }

    if let Some(target) = payload.assignee {
        if store.org_role(ticket.org_id, target).await?.is_none() {
            return Err(ApiError::forbidden("Assignee is not a member of this organization"));
        }
        if !policy::can_assign(&store, user.user_id, target, &ticket_ref).await? {
            return Err(ApiError::forbidden("Assignee is outside the project's assignment pool"));
        }
    }

    let updated: Ticket = sqlx::query_as(
        "UPDATE tickets SET assignee = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(ticket_id)
    .bind(payload.assignee)
    .fetch_one(&pool)
    .await
    .map_err(DbError::from)?;

    match payload.assignee {
        Some(assignee) => {
            ticket_effects::on_assignment(&pool, &updated, user.user_id, assignee).await
        }
        None => {
            ticket_effects::record_activity(&pool, &updated, user.user_id, "unassigned", None).await
        }
    }

    Ok(ApiResponse::success(json!({ "ticket": updated })))
}

/// GET /api/tickets/:id/activity
pub async fn activity(
    Extension(user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    let ticket = utils::fetch_ticket(&pool, ticket_id).await?;
    utils::require_member(&store, ticket.org_id, user.user_id).await?;

    let limit = utils::page_size(query.limit);
    let entries: Vec<ActivityEntry> = sqlx::query_as(
        "SELECT * FROM activity_log
         WHERE ticket_id = $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3",
    )
    .bind(ticket_id)
    .bind(limit)
    .bind(query.offset.unwrap_or(0).max(0))
    .fetch_all(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "activity": entries })))
}

/// GET /api/orgs/:id/statuses
pub async fn statuses(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    utils::require_member(&store, org_id, user.user_id).await?;

    let statuses: Vec<TicketStatus> = sqlx::query_as(
        "SELECT * FROM ticket_statuses WHERE org_id = $1 AND is_active ORDER BY sort_order ASC",
    )
    .bind(org_id)
    .fetch_all(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "statuses": statuses })))
}

/// GET /api/orgs/:id/priorities
pub async fn priorities(
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool.clone());

    utils::require_member(&store, org_id, user.user_id).await?;

    let priorities: Vec<TicketPriority> = sqlx::query_as(
        "SELECT * FROM ticket_priorities WHERE org_id = $1 AND is_active ORDER BY sort_order ASC",
    )
    .bind(org_id)
    .fetch_all(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "priorities": priorities })))
}
