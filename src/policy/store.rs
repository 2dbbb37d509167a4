use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{OrgRole, ProjectRole};
use crate::db::DbError;

/// Lookups the permission logic needs. One call per decision step keeps
/// the short-circuit order observable and testable.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn org_role(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<OrgRole>, DbError>;

    async fn project_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, DbError>;

    /// The department the user belongs to within the organization, if any.
    async fn department_of(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<Uuid>, DbError>;

    async fn is_project_shared_with_department(
        &self,
        project_id: Uuid,
        department_id: Uuid,
    ) -> Result<bool, DbError>;

    async fn is_project_member(&self, project_id: Uuid, user_id: Uuid) -> Result<bool, DbError>;

    /// Active status row with the lowest sort_order for the organization.
    async fn default_status(&self, org_id: Uuid) -> Result<Option<Uuid>, DbError>;
}

/// Postgres-backed store reading the junction tables directly.
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn org_role(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<OrgRole>, DbError> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM org_members WHERE org_id = $1 AND user_id = $2",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role.as_deref().and_then(OrgRole::parse))
    }

    async fn project_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, DbError> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM project_members WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role.as_deref().and_then(ProjectRole::parse))
    }

    async fn department_of(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<Uuid>, DbError> {
        let dept: Option<Option<Uuid>> = sqlx::query_scalar(
            "SELECT department_id FROM org_members WHERE org_id = $1 AND user_id = $2",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(dept.flatten())
    }

    async fn is_project_shared_with_department(
        &self,
        project_id: Uuid,
        department_id: Uuid,
    ) -> Result<bool, DbError> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM project_department_shares WHERE project_id = $1 AND department_id = $2",
        )
        .bind(project_id)
        .bind(department_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn is_project_member(&self, project_id: Uuid, user_id: Uuid) -> Result<bool, DbError> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM project_members WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn default_status(&self, org_id: Uuid) -> Result<Option<Uuid>, DbError> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM ticket_statuses
             WHERE org_id = $1 AND is_active
             ORDER BY sort_order ASC
             LIMIT 1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}
