use crate::security;
use crate::services::{AdminContext, AdminError, AdminService, ServiceResult};

/// Records a fatal screen error in the render context and aborts the request.
/// The session check runs first so a lapsed session surfaces as a timeout
/// rather than as the error being reported.
pub fn fatal_error<S: AdminService>(
    _service: &S,
    ctx: &mut AdminContext,
    message: &str,
) -> ServiceResult<()> {
    security::ensure_fresh_session(ctx)?;
    ctx.context.set("error_message", message);
    ctx.context.set("error_screen", true);
    Err(AdminError::Validation(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryService;
    use chrono::Utc;

    #[test]
    fn fatal_error_fills_context_and_fails() {
        let service = InMemoryService::default();
        let mut ctx = AdminContext::default();
        let result = fatal_error(&service, &mut ctx, "unknown_area");
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "unknown_area"));
        assert_eq!(
            ctx.context.string("error_message").as_deref(),
            Some("unknown_area")
        );
        assert!(ctx.context.bool("error_screen"));
    }

    #[test]
    fn expired_session_wins_over_the_error() {
        let service = InMemoryService::default();
        let mut ctx = AdminContext::default();
        ctx.session
            .set("session_expires_at", Utc::now().timestamp() - 1);
        let result = fatal_error(&service, &mut ctx, "unknown_area");
        assert!(matches!(result, Err(AdminError::SessionTimeout)));
        assert!(ctx.context.string("error_message").is_none());
    }
}
