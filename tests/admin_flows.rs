use educoin_admin::admin::admin_dispatch;
use educoin_admin::services::{
    AdminContext, AdminError, AdminService, InMemoryService, ListQuery, PaymentStatus,
};

fn admin_ctx() -> AdminContext {
    let mut ctx = AdminContext::default();
    ctx.user_info.id = 1;
    ctx.user_info.is_guest = false;
    ctx.user_info.is_admin = true;
    ctx
}

fn role_ctx(role: &str) -> AdminContext {
    let mut ctx = AdminContext::default();
    ctx.user_info.id = 7;
    ctx.session.set("operator_role", role);
    ctx
}

#[test]
fn editor_manages_content_but_not_people() {
    let service = InMemoryService::default();

    let mut add = role_ctx("editor");
    add.request.set("area", "tasks");
    add.request.set("sa", "add");
    add.request.set("save", true);
    add.post_vars.set("title", "Sort the recycling");
    add.post_vars.set("category", 1);
    add.post_vars.set("reward", 15);
    add.post_vars.set("active", true);
    admin_dispatch(&service, &mut add).unwrap();
    assert!(add.context.int("saved_task_id").is_some());
    assert_eq!(service.list_tasks(&ListQuery::default()).unwrap().count, 4);

    let mut peek = role_ctx("editor");
    peek.request.set("area", "children");
    admin_dispatch(&service, &mut peek).unwrap();
    assert!(peek.context.get("children").is_some());

    let mut mutate = role_ctx("editor");
    mutate.request.set("area", "children");
    mutate.request.set("sa", "add");
    let result = admin_dispatch(&service, &mut mutate);
    assert!(matches!(result, Err(AdminError::PermissionDenied(_))));
}

#[test]
fn gift_delete_asks_for_confirmation_first() {
    let service = InMemoryService::default();

    let mut first = admin_ctx();
    first.request.set("area", "gifts");
    first.request.set("sa", "delete");
    first.request.set("gift", 2);
    admin_dispatch(&service, &mut first).unwrap();
    assert!(first.context.get("confirm_delete").is_some());
    assert!(service.get_gift(2).unwrap().is_some());

    first.post_vars.set("confirm", true);
    admin_dispatch(&service, &mut first).unwrap();
    assert_eq!(first.context.int("deleted_gift_id"), Some(2));
    assert!(service.get_gift(2).unwrap().is_none());

    let trail = service.list_audit_log().unwrap();
    assert_eq!(trail.last().unwrap().action, "gift_deleted");
}

#[test]
fn finance_refunds_a_completed_payment() {
    let service = InMemoryService::default();

    let mut ask = role_ctx("finance");
    ask.request.set("area", "payments");
    ask.request.set("sa", "refund");
    ask.request.set("payment", 1);
    admin_dispatch(&service, &mut ask).unwrap();
    assert!(ask.context.get("confirm_refund").is_some());
    assert_eq!(
        service.get_payment(1).unwrap().unwrap().status,
        PaymentStatus::Completed
    );

    ask.post_vars.set("confirm", true);
    admin_dispatch(&service, &mut ask).unwrap();
    assert_eq!(ask.context.int("refunded_payment_id"), Some(1));
    assert_eq!(
        service.get_payment(1).unwrap().unwrap().status,
        PaymentStatus::Refunded
    );
    let trail = service.list_audit_log().unwrap();
    assert_eq!(trail.last().unwrap().action, "payment_refunded");
}

#[test]
fn support_cannot_refund() {
    let service = InMemoryService::default();
    let mut ctx = role_ctx("support");
    ctx.request.set("area", "payments");
    ctx.request.set("sa", "refund");
    ctx.request.set("payment", 1);
    ctx.post_vars.set("confirm", true);
    let result = admin_dispatch(&service, &mut ctx);
    assert!(matches!(result, Err(AdminError::PermissionDenied(_))));
    assert_eq!(
        service.get_payment(1).unwrap().unwrap().status,
        PaymentStatus::Completed
    );
}

#[test]
fn session_timeout_aborts_before_the_write() {
    let service = InMemoryService::default();
    let mut ctx = admin_ctx();
    ctx.session.set("force_timeout", true);
    ctx.request.set("area", "tasks");
    ctx.request.set("sa", "add");
    ctx.request.set("save", true);
    ctx.post_vars.set("title", "Never lands");
    ctx.post_vars.set("category", 1);
    ctx.post_vars.set("reward", 10);
    let result = admin_dispatch(&service, &mut ctx);
    assert!(matches!(result, Err(AdminError::SessionTimeout)));
    assert_eq!(service.list_tasks(&ListQuery::default()).unwrap().count, 3);
}

#[test]
fn listing_envelope_reaches_the_context() {
    let service = InMemoryService::default();

    let mut ctx = admin_ctx();
    ctx.request.set("area", "children");
    ctx.request.set("page_size", 2);
    admin_dispatch(&service, &mut ctx).unwrap();
    assert_eq!(ctx.context.int("list_count"), Some(3));
    assert_eq!(ctx.context.int("page_count"), Some(2));
    assert_eq!(ctx.context.int("page_number"), Some(1));
    let links = ctx.context.get("page_links").unwrap();
    assert_eq!(links.as_array().unwrap().len(), 2);

    let mut last = admin_ctx();
    last.request.set("area", "children");
    last.request.set("page_size", 2);
    last.request.set("page", 2);
    admin_dispatch(&service, &mut last).unwrap();
    let rows = last.context.get("children").unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["name"], "Sofia");
}

#[test]
fn search_filters_across_dispatch() {
    let service = InMemoryService::default();
    let mut ctx = admin_ctx();
    ctx.request.set("area", "children");
    ctx.request.set("search", "LUC");
    admin_dispatch(&service, &mut ctx).unwrap();
    assert_eq!(ctx.context.int("list_count"), Some(1));
    let rows = ctx.context.get("children").unwrap();
    assert_eq!(rows[0]["name"], "Lucas");
}

#[test]
fn dashboard_reflects_fresh_activity() {
    let service = InMemoryService::default();

    let mut add = admin_ctx();
    add.request.set("area", "gifts");
    add.request.set("sa", "add");
    add.request.set("save", true);
    add.post_vars.set("name", "Zoo trip");
    add.post_vars.set("cost_coins", 500);
    add.post_vars.set("stock", 2);
    admin_dispatch(&service, &mut add).unwrap();

    let mut home = admin_ctx();
    home.request.set("area", "index");
    admin_dispatch(&service, &mut home).unwrap();
    let counts = home.context.get("dashboard_counts").unwrap();
    assert_eq!(counts["gifts"], 3);
    let recent = home.context.get("recent_activity").unwrap();
    assert_eq!(recent[0]["action"], "gift_added");
}
