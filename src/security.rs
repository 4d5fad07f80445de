use chrono::Utc;

use crate::services::{ensure, AdminContext, AdminError, AdminService, ServiceResult};

const CONTENT_AREAS: &[&str] = &[
    "categories",
    "tasks",
    "levels",
    "gifts",
    "word_games",
    "notifications",
];
const PEOPLE_AREAS: &[&str] = &["children", "parents"];
const MONEY_AREAS: &[&str] = &["plans", "payments"];

/// Fills the operator's permission set from the role recorded at login.
/// Admins bypass permission checks entirely, so they only get the session
/// post-processing.
pub fn load_permissions(ctx: &mut AdminContext) {
    if !ctx.user_info.is_admin {
        let role = ctx.session.string("operator_role").unwrap_or_default();
        let (manage, view): (&[&str], Vec<&str>) = match role.as_str() {
            "editor" => (
                CONTENT_AREAS,
                [PEOPLE_AREAS, MONEY_AREAS].concat(),
            ),
            "support" => (
                PEOPLE_AREAS,
                [CONTENT_AREAS, MONEY_AREAS].concat(),
            ),
            "finance" => (MONEY_AREAS, PEOPLE_AREAS.to_vec()),
            _ => (&[], Vec::new()),
        };
        for area in manage {
            ctx.user_info.permissions.insert(format!("manage_{area}"));
        }
        for area in view {
            ctx.user_info.permissions.insert(format!("view_{area}"));
        }
        if !ctx.user_info.permissions.is_empty() {
            ctx.user_info.is_guest = false;
        }
    }
    if ctx.session.bool("read_only") {
        apply_read_only(ctx);
    }
}

/// Downgrades every manage permission to the matching view permission.
/// Applied when the operator's session is flagged read-only.
pub fn apply_read_only(ctx: &mut AdminContext) {
    let managed: Vec<String> = ctx
        .user_info
        .permissions
        .iter()
        .filter(|permission| permission.starts_with("manage_"))
        .cloned()
        .collect();
    for permission in managed {
        ctx.user_info.permissions.remove(&permission);
        let area = permission.trim_start_matches("manage_");
        ctx.user_info.permissions.insert(format!("view_{area}"));
    }
}

/// Rejects requests whose operator session has lapsed. The login flow sets
/// `session_expires_at`; a context without one is treated as non-expiring
/// (tests and the console demo).
pub fn ensure_fresh_session(ctx: &mut AdminContext) -> ServiceResult<()> {
    if let Some(expires_at) = ctx.session.int("session_expires_at") {
        if expires_at < Utc::now().timestamp() {
            ctx.session.set("session_expired", true);
            return Err(AdminError::SessionTimeout);
        }
    }
    Ok(())
}

pub fn require_permission<S: AdminService>(
    service: &S,
    ctx: &AdminContext,
    permission: &str,
) -> ServiceResult<()> {
    ensure(
        service.allowed_to(ctx, permission),
        AdminError::PermissionDenied(permission.into()),
    )
}
