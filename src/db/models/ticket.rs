use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub org_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status_id: Uuid,
    pub priority_id: Option<Uuid>,
    pub created_by: Uuid,
    pub assignee: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketStatus {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketPriority {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub sort_order: i32,
    pub is_active: bool,
}
