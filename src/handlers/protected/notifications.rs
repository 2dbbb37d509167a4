use axum::extract::{Path, Query};
use axum::Extension;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::Notification;
use crate::db::DbError;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

use super::utils;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/notifications - Caller's notifications, newest first.
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;

    let limit = utils::page_size(query.limit);
    let notifications: Vec<Notification> = sqlx::query_as(
        "SELECT * FROM notifications
         WHERE user_id = $1
           AND (NOT $2 OR read_at IS NULL)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(user.user_id)
    .bind(query.unread_only.unwrap_or(false))
    .bind(limit)
    .bind(query.offset.unwrap_or(0).max(0))
    .fetch_all(&pool)
    .await
    .map_err(DbError::from)?;

    Ok(ApiResponse::success(json!({ "notifications": notifications })))
}

/// PUT /api/notifications/:id/read - Mark one of the caller's
/// notifications as read. Someone else's notification is a 404, not a
/// 403, to avoid confirming its existence.
pub async fn mark_read(
    Extension(user): Extension<AuthUser>,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = utils::pool().await?;

    let updated: Option<Notification> = sqlx::query_as(
        "UPDATE notifications SET read_at = $3
         WHERE id = $1 AND user_id = $2 AND read_at IS NULL
         RETURNING *",
    )
    .bind(notification_id)
    .bind(user.user_id)
    .bind(Utc::now())
    .fetch_optional(&pool)
    .await
    .map_err(DbError::from)?;

    match updated {
        Some(notification) => Ok(ApiResponse::success(json!({ "notification": notification }))),
        None => Err(ApiError::not_found("Notification not found")),
    }
}
