//! Ticket permission resolution.
//!
//! All role checks read the junction tables fresh rather than trusting
//! token claims. The evaluation order is load-bearing: an organization
//! admin wins before any ticket-level relation is consulted, and the
//! assignment chain is a short-circuit OR where any one condition
//! suffices.

use uuid::Uuid;

use crate::db::models::Ticket;
use crate::db::DbError;

mod store;

pub use store::{PgPolicyStore, PolicyStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgRole {
    Admin,
    Manager,
    Member,
}

impl OrgRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Some(OrgRole::Admin),
            "manager" => Some(OrgRole::Manager),
            "member" => Some(OrgRole::Member),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Admin => "admin",
            OrgRole::Manager => "manager",
            OrgRole::Member => "member",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectRole {
    Manager,
    Member,
}

impl ProjectRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "manager" => Some(ProjectRole::Manager),
            "member" => Some(ProjectRole::Member),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Manager => "manager",
            ProjectRole::Member => "member",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketAction {
    Edit,
    Delete,
}

/// The ticket fields permission resolution needs.
#[derive(Debug, Clone, Copy)]
pub struct TicketRef {
    pub id: Uuid,
    pub org_id: Uuid,
    pub project_id: Uuid,
    pub created_by: Uuid,
    pub assignee: Option<Uuid>,
}

impl From<&Ticket> for TicketRef {
    fn from(t: &Ticket) -> Self {
        Self {
            id: t.id,
            org_id: t.org_id,
            project_id: t.project_id,
            created_by: t.created_by,
            assignee: t.assignee,
        }
    }
}

/// The project fields creation checks need.
#[derive(Debug, Clone, Copy)]
pub struct ProjectRef {
    pub id: Uuid,
    pub org_id: Uuid,
    pub department_id: Option<Uuid>,
}

/// Whether `caller` may perform `action` on `ticket`.
///
/// Evaluated strictly in order:
/// 1. organization admin (fresh lookup)   -> edit + delete
/// 2. ticket creator                      -> edit + delete
/// 3. current assignee                    -> edit only
/// 4. project-level manager               -> edit + delete
/// 5. otherwise                           -> deny
pub async fn can_mutate_ticket<S: PolicyStore + ?Sized>(
    store: &S,
    caller: Uuid,
    ticket: &TicketRef,
    action: TicketAction,
) -> Result<bool, DbError> {
    if store.org_role(ticket.org_id, caller).await? == Some(OrgRole::Admin) {
        return Ok(true);
    }

    if ticket.created_by == caller {
        return Ok(true);
    }

    if ticket.assignee == Some(caller) && action == TicketAction::Edit {
        return Ok(true);
    }

    if store.project_role(ticket.project_id, caller).await? == Some(ProjectRole::Manager) {
        return Ok(true);
    }

    Ok(false)
}

/// Whether `assigner` may assign `ticket` to `target`.
///
/// Short-circuit OR; each step costs one lookup and any one suffices:
/// org admin, shared department, department-level project share, or a
/// direct project-membership row for the target. The caller must already
/// have verified that `target` belongs to the ticket's organization.
pub async fn can_assign<S: PolicyStore + ?Sized>(
    store: &S,
    assigner: Uuid,
    target: Uuid,
    ticket: &TicketRef,
) -> Result<bool, DbError> {
    if store.org_role(ticket.org_id, assigner).await? == Some(OrgRole::Admin) {
        return Ok(true);
    }

    let target_dept = store.department_of(ticket.org_id, target).await?;

    if let Some(dept) = target_dept {
        if store.department_of(ticket.org_id, assigner).await? == Some(dept) {
            return Ok(true);
        }
        if store.is_project_shared_with_department(ticket.project_id, dept).await? {
            return Ok(true);
        }
    }

    if store.is_project_member(ticket.project_id, target).await? {
        return Ok(true);
    }

    Ok(false)
}

/// Whether `caller` may create tickets in `project`: org admin, direct
/// project member, member of the project's owning department, or member
/// of a department the project is shared with.
pub async fn can_create_ticket<S: PolicyStore + ?Sized>(
    store: &S,
    caller: Uuid,
    project: &ProjectRef,
) -> Result<bool, DbError> {
    if store.org_role(project.org_id, caller).await? == Some(OrgRole::Admin) {
        return Ok(true);
    }

    if store.project_role(project.id, caller).await?.is_some() {
        return Ok(true);
    }

    if let Some(caller_dept) = store.department_of(project.org_id, caller).await? {
        if project.department_id == Some(caller_dept) {
            return Ok(true);
        }
        if store.is_project_shared_with_department(project.id, caller_dept).await? {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Default status for new tickets: the active status row with the lowest
/// sort_order, or None when the organization has no active statuses.
pub async fn default_status_id<S: PolicyStore + ?Sized>(
    store: &S,
    org_id: Uuid,
) -> Result<Option<Uuid>, DbError> {
    store.default_status(org_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    /// In-memory store for exercising the decision logic without a database.
    #[derive(Default)]
    struct MemoryStore {
        org_roles: HashMap<(Uuid, Uuid), OrgRole>,
        project_roles: HashMap<(Uuid, Uuid), ProjectRole>,
        departments: HashMap<(Uuid, Uuid), Uuid>,
        dept_shares: HashSet<(Uuid, Uuid)>,
        statuses: HashMap<Uuid, Vec<(Uuid, i32, bool)>>,
    }

    #[async_trait::async_trait]
    impl PolicyStore for MemoryStore {
        async fn org_role(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<OrgRole>, DbError> {
            Ok(self.org_roles.get(&(org_id, user_id)).copied())
        }

        async fn project_role(
            &self,
            project_id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<ProjectRole>, DbError> {
            Ok(self.project_roles.get(&(project_id, user_id)).copied())
        }

        async fn department_of(
            &self,
            org_id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<Uuid>, DbError> {
            Ok(self.departments.get(&(org_id, user_id)).copied())
        }

        async fn is_project_shared_with_department(
            &self,
            project_id: Uuid,
            department_id: Uuid,
        ) -> Result<bool, DbError> {
            Ok(self.dept_shares.contains(&(project_id, department_id)))
        }

        async fn is_project_member(
            &self,
            project_id: Uuid,
            user_id: Uuid,
        ) -> Result<bool, DbError> {
            Ok(self.project_roles.contains_key(&(project_id, user_id)))
        }

        async fn default_status(&self, org_id: Uuid) -> Result<Option<Uuid>, DbError> {
            Ok(self
                .statuses
                .get(&org_id)
                .and_then(|rows| {
                    rows.iter()
                        .filter(|(_, _, active)| *active)
                        .min_by_key(|(_, sort, _)| *sort)
                })
                .map(|(id, _, _)| *id))
        }
    }

    struct Fixture {
        store: MemoryStore,
        org: Uuid,
        project: Uuid,
        admin: Uuid,
        creator: Uuid,
        assignee: Uuid,
        project_manager: Uuid,
        bystander: Uuid,
        ticket: TicketRef,
    }

    fn fixture() -> Fixture {
        let org = Uuid::new_v4();
        let project = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let creator = Uuid::new_v4();
        let assignee = Uuid::new_v4();
        let project_manager = Uuid::new_v4();
        let bystander = Uuid::new_v4();

        let mut store = MemoryStore::default();
        store.org_roles.insert((org, admin), OrgRole::Admin);
        store.org_roles.insert((org, creator), OrgRole::Member);
        store.org_roles.insert((org, assignee), OrgRole::Member);
        store.org_roles.insert((org, project_manager), OrgRole::Member);
        store.org_roles.insert((org, bystander), OrgRole::Member);
        store.project_roles.insert((project, project_manager), ProjectRole::Manager);

        let ticket = TicketRef {
            id: Uuid::new_v4(),
            org_id: org,
            project_id: project,
            created_by: creator,
            assignee: Some(assignee),
        };

        Fixture { store, org, project, admin, creator, assignee, project_manager, bystander, ticket }
    }

    #[tokio::test]
    async fn org_admin_can_edit_and_delete_any_ticket() {
        let f = fixture();
        assert!(can_mutate_ticket(&f.store, f.admin, &f.ticket, TicketAction::Edit).await.unwrap());
        assert!(can_mutate_ticket(&f.store, f.admin, &f.ticket, TicketAction::Delete).await.unwrap());
    }

    #[tokio::test]
    async fn creator_can_edit_and_delete_own_ticket() {
        let f = fixture();
        assert!(can_mutate_ticket(&f.store, f.creator, &f.ticket, TicketAction::Edit).await.unwrap());
        assert!(
            can_mutate_ticket(&f.store, f.creator, &f.ticket, TicketAction::Delete).await.unwrap()
        );
    }

    #[tokio::test]
    async fn assignee_can_edit_but_not_delete() {
        let f = fixture();
        assert!(
            can_mutate_ticket(&f.store, f.assignee, &f.ticket, TicketAction::Edit).await.unwrap()
        );
        assert!(
            !can_mutate_ticket(&f.store, f.assignee, &f.ticket, TicketAction::Delete).await.unwrap()
        );
    }

    #[tokio::test]
    async fn project_manager_can_edit_and_delete_in_project() {
        let f = fixture();
        assert!(
            can_mutate_ticket(&f.store, f.project_manager, &f.ticket, TicketAction::Edit)
                .await
                .unwrap()
        );
        assert!(
            can_mutate_ticket(&f.store, f.project_manager, &f.ticket, TicketAction::Delete)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn project_manager_role_does_not_leak_to_other_projects() {
        let f = fixture();
        let other_ticket = TicketRef { project_id: Uuid::new_v4(), ..f.ticket };
        assert!(
            !can_mutate_ticket(&f.store, f.project_manager, &other_ticket, TicketAction::Edit)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn unrelated_member_is_denied() {
        let f = fixture();
        assert!(
            !can_mutate_ticket(&f.store, f.bystander, &f.ticket, TicketAction::Edit).await.unwrap()
        );
        assert!(
            !can_mutate_ticket(&f.store, f.bystander, &f.ticket, TicketAction::Delete)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn admin_can_assign_across_departments() {
        let mut f = fixture();
        let dept_a = Uuid::new_v4();
        let dept_b = Uuid::new_v4();
        f.store.departments.insert((f.org, f.admin), dept_a);
        f.store.departments.insert((f.org, f.bystander), dept_b);

        assert!(can_assign(&f.store, f.admin, f.bystander, &f.ticket).await.unwrap());
    }

    #[tokio::test]
    async fn same_department_allows_assignment() {
        let mut f = fixture();
        let dept = Uuid::new_v4();
        f.store.departments.insert((f.org, f.creator), dept);
        f.store.departments.insert((f.org, f.bystander), dept);

        assert!(can_assign(&f.store, f.creator, f.bystander, &f.ticket).await.unwrap());
    }

    #[tokio::test]
    async fn department_share_allows_assignment() {
        let mut f = fixture();
        let dept_a = Uuid::new_v4();
        let dept_b = Uuid::new_v4();
        f.store.departments.insert((f.org, f.creator), dept_a);
        f.store.departments.insert((f.org, f.bystander), dept_b);
        f.store.dept_shares.insert((f.project, dept_b));

        assert!(can_assign(&f.store, f.creator, f.bystander, &f.ticket).await.unwrap());
    }

    #[tokio::test]
    async fn direct_project_membership_allows_assignment() {
        let mut f = fixture();
        let dept_a = Uuid::new_v4();
        let dept_b = Uuid::new_v4();
        f.store.departments.insert((f.org, f.creator), dept_a);
        f.store.departments.insert((f.org, f.bystander), dept_b);
        f.store.project_roles.insert((f.project, f.bystander), ProjectRole::Member);

        assert!(can_assign(&f.store, f.creator, f.bystander, &f.ticket).await.unwrap());
    }

    #[tokio::test]
    async fn assignment_without_any_relation_is_denied() {
        let mut f = fixture();
        let dept_a = Uuid::new_v4();
        let dept_b = Uuid::new_v4();
        f.store.departments.insert((f.org, f.creator), dept_a);
        f.store.departments.insert((f.org, f.bystander), dept_b);

        assert!(!can_assign(&f.store, f.creator, f.bystander, &f.ticket).await.unwrap());
    }

    #[tokio::test]
    async fn create_requires_a_relation_to_the_project() {
        let mut f = fixture();
        let project_ref = ProjectRef { id: f.project, org_id: f.org, department_id: None };

        assert!(can_create_ticket(&f.store, f.admin, &project_ref).await.unwrap());
        assert!(can_create_ticket(&f.store, f.project_manager, &project_ref).await.unwrap());
        assert!(!can_create_ticket(&f.store, f.bystander, &project_ref).await.unwrap());

        // Department sharing extends the pool
        let dept = Uuid::new_v4();
        f.store.departments.insert((f.org, f.bystander), dept);
        f.store.dept_shares.insert((f.project, dept));
        assert!(can_create_ticket(&f.store, f.bystander, &project_ref).await.unwrap());
    }

    #[tokio::test]
    async fn default_status_picks_lowest_sort_order_active_row() {
        let mut f = fixture();
        let open = Uuid::new_v4();
        let in_progress = Uuid::new_v4();
        let retired = Uuid::new_v4();
        f.store.statuses.insert(
            f.org,
            vec![(in_progress, 2, true), (retired, 0, false), (open, 1, true)],
        );

        assert_eq!(default_status_id(&f.store, f.org).await.unwrap(), Some(open));
    }

    #[tokio::test]
    async fn default_status_is_none_without_active_rows() {
        let f = fixture();
        assert_eq!(default_status_id(&f.store, f.org).await.unwrap(), None);
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(OrgRole::parse("Admin"), Some(OrgRole::Admin));
        assert_eq!(OrgRole::parse("MANAGER"), Some(OrgRole::Manager));
        assert_eq!(OrgRole::parse("owner"), None);
        assert_eq!(ProjectRole::parse("Manager"), Some(ProjectRole::Manager));
    }
}
