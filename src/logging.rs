use crate::security;
use crate::services::{AdminContext, AdminService, ServiceResult};

/// Writes one audit trail entry for a mutating admin action. Guests never
/// reach the mutating paths, so the actor is always the signed-in operator.
pub fn log_action<S: AdminService>(
    service: &S,
    ctx: &mut AdminContext,
    action: &str,
    details: serde_json::Value,
) -> ServiceResult<()> {
    security::ensure_fresh_session(ctx)?;
    let actor = if ctx.user_info.is_guest {
        None
    } else {
        Some(ctx.user_info.id)
    };
    ctx.session.increment("actions_logged", 1);
    service.log_action(action, actor, &details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryService;
    use serde_json::json;

    #[test]
    fn log_action_records_actor_and_details() {
        let service = InMemoryService::default();
        let mut ctx = AdminContext::default();
        ctx.user_info.id = 7;
        ctx.user_info.is_guest = false;
        log_action(&service, &mut ctx, "gift_saved", json!({"id": 3})).unwrap();
        let entries = service.list_audit_log().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "gift_saved");
        assert_eq!(entries[0].actor_id, Some(7));
        assert_eq!(entries[0].details["id"], 3);
        assert_eq!(ctx.session.int("actions_logged"), Some(1));
    }
}
