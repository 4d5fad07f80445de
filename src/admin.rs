use serde_json::json;

use crate::errors;
use crate::manage_categories::CategoryController;
use crate::manage_children::ChildController;
use crate::manage_gifts::GiftController;
use crate::manage_levels;
use crate::manage_notifications::NotificationController;
use crate::manage_parents::ParentController;
use crate::manage_payments::PaymentController;
use crate::manage_plans::PlanController;
use crate::manage_tasks::TaskController;
use crate::manage_word_games;
use crate::security;
use crate::services::{AdminContext, AdminError, AdminService, ServiceResult};

/// Dashboard landing screen: the section menu, entity counts and the tail
/// of the audit trail.
pub fn admin_main<S: AdminService>(service: &S, ctx: &mut AdminContext) -> ServiceResult<()> {
    service.load_labels(ctx, "dashboard")?;
    ensure_admin_access(ctx)?;
    ctx.context.set(
        "admin_menu",
        json!({
            "sections": [
                {"id": "content", "title": "Content", "areas": ["categories", "tasks", "levels", "word_games"]},
                {"id": "people", "title": "People", "areas": ["children", "parents"]},
                {"id": "monetization", "title": "Monetization", "areas": ["plans", "payments"]},
                {"id": "engagement", "title": "Engagement", "areas": ["gifts", "notifications"]}
            ]
        }),
    );
    let counts = service.dashboard_counts()?;
    ctx.context.set("dashboard_counts", &counts);
    let mut recent = service.list_audit_log()?;
    recent.reverse();
    recent.truncate(10);
    ctx.context.set("recent_activity", recent);
    Ok(())
}

/// Routes one admin request to its area screen. Permissions are loaded
/// here so every screen below sees the operator's effective set.
pub fn admin_dispatch<S: AdminService + Clone>(
    service: &S,
    ctx: &mut AdminContext,
) -> ServiceResult<()> {
    security::load_permissions(ctx);
    let area = ctx
        .request
        .string("area")
        .unwrap_or_else(|| "index".into());
    ctx.section = Some(area.clone());
    match area.as_str() {
        "index" => admin_main(service, ctx),
        "categories" => CategoryController::new(service.clone()).manage_categories(ctx),
        "children" => ChildController::new(service.clone()).manage_children(ctx),
        "parents" => ParentController::new(service.clone()).manage_parents(ctx),
        "tasks" => TaskController::new(service.clone()).manage_tasks(ctx),
        "levels" => manage_levels::manage_levels(service, ctx),
        "plans" => PlanController::new(service.clone()).manage_plans(ctx),
        "gifts" => GiftController::new(service.clone()).manage_gifts(ctx),
        "word_games" => manage_word_games::manage_word_games(service, ctx),
        "notifications" => NotificationController::new(service.clone()).manage_notifications(ctx),
        "payments" => PaymentController::new(service.clone()).manage_payments(ctx),
        _ => errors::fatal_error(service, ctx, "unknown_area"),
    }
}

fn ensure_admin_access(ctx: &AdminContext) -> ServiceResult<()> {
    if ctx.user_info.is_admin || !ctx.user_info.permissions.is_empty() {
        Ok(())
    } else {
        Err(AdminError::PermissionDenied("admin_access".into()))
    }
}
