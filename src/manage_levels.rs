use serde_json::json;

use crate::logging;
use crate::security::require_permission;
use crate::services::{
    ensure, expose_pagination, AdminContext, AdminError, AdminService, Level, ListQuery,
    ServiceResult, SessionCheckMode,
};

pub fn manage_levels<S: AdminService>(service: &S, ctx: &mut AdminContext) -> ServiceResult<()> {
    service.load_labels(ctx, "levels")?;

    let can_view =
        service.allowed_to(ctx, "manage_levels") || service.allowed_to(ctx, "view_levels");
    ensure(can_view, AdminError::PermissionDenied("view_levels".into()))?;

    match ctx.request.string("sa").as_deref() {
        Some("edit") => {
            require_permission(service, ctx, "manage_levels")?;
            edit_level(service, ctx)
        }
        Some("delete") => {
            require_permission(service, ctx, "manage_levels")?;
            delete_level(service, ctx)
        }
        _ => level_index(service, ctx),
    }
}

fn level_index<S: AdminService>(service: &S, ctx: &mut AdminContext) -> ServiceResult<()> {
    let query = ListQuery::from_request(&ctx.request);
    let page = service.list_levels(&query)?;
    let rows: Vec<_> = page
        .items
        .iter()
        .map(|level| {
            json!({
                "id": level.id,
                "name": level.name,
                "rank": level.rank,
                "min_coins": level.min_coins,
            })
        })
        .collect();
    ctx.context.set("levels", rows);
    expose_pagination(ctx, &page);
    Ok(())
}

/// One form serves add and edit; without a `level` request var it starts
/// from a blank record.
fn edit_level<S: AdminService>(service: &S, ctx: &mut AdminContext) -> ServiceResult<()> {
    let level_id = ctx.request.int("level");
    let mut current = match level_id {
        Some(id) => service
            .get_level(id)?
            .ok_or_else(|| AdminError::NotFound(format!("level {id}")))?,
        None => Level::default(),
    };
    if ctx.request.contains("save") {
        service.check_session(ctx, SessionCheckMode::Post)?;
        let payload = parse_level_form(ctx, level_id)?;
        let saved = service.save_level(payload)?;
        logging::log_action(service, ctx, "level_saved", json!({"id": saved}))?;
        ctx.context.set("saved_level_id", saved);
        if let Some(latest) = service.get_level(saved)? {
            current = latest;
        }
    }
    ctx.context.set(
        "level_form",
        json!({
            "id": current.id.unwrap_or(0),
            "name": current.name,
            "rank": current.rank,
            "min_coins": current.min_coins,
        }),
    );
    Ok(())
}

fn delete_level<S: AdminService>(service: &S, ctx: &mut AdminContext) -> ServiceResult<()> {
    let level_id = ctx
        .request
        .int("level")
        .ok_or_else(|| AdminError::Validation("missing_level".into()))?;
    let level = service
        .get_level(level_id)?
        .ok_or_else(|| AdminError::NotFound(format!("level {level_id}")))?;
    if !ctx.post_vars.bool("confirm") {
        ctx.context
            .set("confirm_delete", json!({"id": level_id, "name": level.name}));
        return Ok(());
    }
    service.check_session(ctx, SessionCheckMode::Post)?;
    service.delete_level(level_id)?;
    logging::log_action(
        service,
        ctx,
        "level_deleted",
        json!({"id": level_id, "name": level.name}),
    )?;
    ctx.context.set("deleted_level_id", level_id);
    Ok(())
}

fn parse_level_form(ctx: &AdminContext, level_id: Option<i64>) -> ServiceResult<Level> {
    let name = ctx
        .post_vars
        .string("name")
        .unwrap_or_default()
        .trim()
        .to_string();
    ensure(!name.is_empty(), AdminError::Validation("level_name".into()))?;
    let rank = ctx.post_vars.int("rank").unwrap_or(0);
    ensure(rank >= 1, AdminError::Validation("level_rank".into()))?;
    let min_coins = ctx.post_vars.int("min_coins").unwrap_or(0);
    ensure(
        min_coins >= 0,
        AdminError::Validation("level_min_coins".into()),
    )?;
    Ok(Level {
        id: level_id,
        name,
        rank,
        min_coins,
    })
}
