use axum::Extension;
use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::policy::{PgPolicyStore, PolicyStore};

use super::utils;

/// GET /api/auth/whoami - Caller identity plus the authoritative role
/// for the organization in the token (re-read from the database, not
/// echoed from the claims).
pub async fn whoami(Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    let pool = utils::pool().await?;
    let store = PgPolicyStore::new(pool);

    let role = utils::require_member(&store, user.org_id, user.user_id).await?;
    let department_id = store.department_of(user.org_id, user.user_id).await?;

    Ok(ApiResponse::success(json!({
        "user_id": user.user_id,
        "email": user.email,
        "org_id": user.org_id,
        "role": role.as_str(),
        "department_id": department_id,
    })))
}
