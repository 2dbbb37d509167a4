//! Side effects of ticket mutations: activity-log rows, in-app
//! notifications, email. All best-effort; the primary mutation has
//! already committed by the time these run, and a failure here is logged
//! but never surfaced to the client.

use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::db::models::Ticket;
use crate::email;

pub async fn record_activity(
    pool: &PgPool,
    ticket: &Ticket,
    actor_id: Uuid,
    action: &str,
    detail: Option<Value>,
) {
    let result = sqlx::query(
        "INSERT INTO activity_log (org_id, ticket_id, actor_id, action, detail)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(ticket.org_id)
    .bind(ticket.id)
    .bind(actor_id)
    .bind(action)
    .bind(detail)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!("Failed to record activity '{}' for ticket {}: {}", action, ticket.id, e);
    }
}

pub async fn notify_user(pool: &PgPool, ticket: &Ticket, user_id: Uuid, body: &str) {
    let result = sqlx::query(
        "INSERT INTO notifications (org_id, user_id, ticket_id, body)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(ticket.org_id)
    .bind(user_id)
    .bind(ticket.id)
    .bind(body)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!("Failed to insert notification for user {}: {}", user_id, e);
    }
}

/// Notify the new assignee in-app and by email.
pub async fn on_assignment(pool: &PgPool, ticket: &Ticket, actor_id: Uuid, assignee_id: Uuid) {
    let body = format!("You were assigned ticket \"{}\"", ticket.title);
    notify_user(pool, ticket, assignee_id, &body).await;
    record_activity(
        pool,
        ticket,
        actor_id,
        "assigned",
        Some(serde_json::json!({ "assignee": assignee_id })),
    )
    .await;

    match sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
        .bind(assignee_id)
        .fetch_optional(pool)
        .await
    {
        Ok(Some(address)) => {
            email::send_best_effort(
                &address,
                &format!("Assigned: {}", ticket.title),
                &format!(
                    "You have been assigned ticket \"{}\".\n\n{}",
                    ticket.title,
                    ticket.description.as_deref().unwrap_or("")
                ),
            );
        }
        Ok(None) => {}
        Err(e) => warn!("Failed to look up assignee email for {}: {}", assignee_id, e),
    }
}
