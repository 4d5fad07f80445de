use serde_json::json;

use crate::logging;
use crate::security::require_permission;
use crate::services::{
    ensure, expose_pagination, AdminContext, AdminError, AdminService, ListQuery, ServiceResult,
    SessionCheckMode, WordGame,
};

pub fn manage_word_games<S: AdminService>(
    service: &S,
    ctx: &mut AdminContext,
) -> ServiceResult<()> {
    service.load_labels(ctx, "word_games")?;

    let can_view = service.allowed_to(ctx, "manage_word_games")
        || service.allowed_to(ctx, "view_word_games");
    ensure(
        can_view,
        AdminError::PermissionDenied("view_word_games".into()),
    )?;

    match ctx.request.string("sa").as_deref() {
        Some("edit") => {
            require_permission(service, ctx, "manage_word_games")?;
            edit_word_game(service, ctx)
        }
        Some("delete") => {
            require_permission(service, ctx, "manage_word_games")?;
            delete_word_game(service, ctx)
        }
        _ => word_game_index(service, ctx),
    }
}

fn word_game_index<S: AdminService>(service: &S, ctx: &mut AdminContext) -> ServiceResult<()> {
    let query = ListQuery::from_request(&ctx.request);
    let page = service.list_word_games(&query)?;
    let rows: Vec<_> = page
        .items
        .iter()
        .map(|game| {
            json!({
                "id": game.id,
                "word": game.word,
                "hint": game.hint,
                "reward_coins": game.reward_coins,
            })
        })
        .collect();
    ctx.context.set("word_games", rows);
    ctx.context.set("search", query.search.clone());
    expose_pagination(ctx, &page);
    Ok(())
}

fn edit_word_game<S: AdminService>(service: &S, ctx: &mut AdminContext) -> ServiceResult<()> {
    let game_id = ctx.request.int("game");
    let mut current = match game_id {
        Some(id) => service
            .get_word_game(id)?
            .ok_or_else(|| AdminError::NotFound(format!("word game {id}")))?,
        None => WordGame::default(),
    };
    if ctx.request.contains("save") {
        service.check_session(ctx, SessionCheckMode::Post)?;
        let payload = parse_word_game_form(ctx, game_id)?;
        let saved = service.save_word_game(payload)?;
        logging::log_action(service, ctx, "word_game_saved", json!({"id": saved}))?;
        ctx.context.set("saved_game_id", saved);
        if let Some(latest) = service.get_word_game(saved)? {
            current = latest;
        }
    }
    ctx.context.set(
        "word_game_form",
        json!({
            "id": current.id.unwrap_or(0),
            "word": current.word,
            "hint": current.hint,
            "reward_coins": current.reward_coins,
        }),
    );
    Ok(())
}

fn delete_word_game<S: AdminService>(service: &S, ctx: &mut AdminContext) -> ServiceResult<()> {
    let game_id = ctx
        .request
        .int("game")
        .ok_or_else(|| AdminError::Validation("missing_game".into()))?;
    let game = service
        .get_word_game(game_id)?
        .ok_or_else(|| AdminError::NotFound(format!("word game {game_id}")))?;
    if !ctx.post_vars.bool("confirm") {
        ctx.context
            .set("confirm_delete", json!({"id": game_id, "word": game.word}));
        return Ok(());
    }
    service.check_session(ctx, SessionCheckMode::Post)?;
    service.delete_word_game(game_id)?;
    logging::log_action(
        service,
        ctx,
        "word_game_deleted",
        json!({"id": game_id, "word": game.word}),
    )?;
    ctx.context.set("deleted_game_id", game_id);
    Ok(())
}

/// Puzzle words are stored lowercase with no inner whitespace; the mobile
/// app compares guesses verbatim.
fn parse_word_game_form(ctx: &AdminContext, game_id: Option<i64>) -> ServiceResult<WordGame> {
    let word = ctx
        .post_vars
        .string("word")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    ensure(!word.is_empty(), AdminError::Validation("word".into()))?;
    ensure(
        !word.contains(char::is_whitespace),
        AdminError::Validation("word_spaces".into()),
    )?;
    let hint = ctx
        .post_vars
        .string("hint")
        .unwrap_or_default()
        .trim()
        .to_string();
    ensure(!hint.is_empty(), AdminError::Validation("word_hint".into()))?;
    let reward_coins = ctx.post_vars.int("reward").unwrap_or(0);
    ensure(
        reward_coins >= 1,
        AdminError::Validation("word_reward".into()),
    )?;
    Ok(WordGame {
        id: game_id,
        word,
        hint,
        reward_coins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryService;

    fn manager_ctx() -> AdminContext {
        let mut ctx = AdminContext::default();
        ctx.user_info.permissions.insert("manage_word_games".into());
        ctx
    }

    #[test]
    fn index_lists_puzzles_alphabetically() {
        let service = InMemoryService::default();
        let mut ctx = manager_ctx();
        manage_word_games(&service, &mut ctx).unwrap();
        let rows = ctx
            .context
            .get("word_games")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["word"], "panda");
        assert_eq!(rows[1]["word"], "rocket");
    }

    #[test]
    fn words_are_normalized_on_save() {
        let service = InMemoryService::default();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "edit");
        ctx.request.set("save", true);
        ctx.post_vars.set("word", "  Giraffe ");
        ctx.post_vars.set("hint", "Long neck");
        ctx.post_vars.set("reward", 8);
        manage_word_games(&service, &mut ctx).unwrap();
        let page = service.list_word_games(&ListQuery::default()).unwrap();
        assert!(page.items.iter().any(|game| game.word == "giraffe"));
    }

    #[test]
    fn words_with_spaces_are_rejected() {
        let service = InMemoryService::default();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "edit");
        ctx.request.set("save", true);
        ctx.post_vars.set("word", "ice cream");
        ctx.post_vars.set("reward", 5);
        let result = manage_word_games(&service, &mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "word_spaces"));
    }

    #[test]
    fn a_hint_is_required() {
        let service = InMemoryService::default();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "edit");
        ctx.request.set("save", true);
        ctx.post_vars.set("word", "giraffe");
        ctx.post_vars.set("reward", 5);
        let result = manage_word_games(&service, &mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "word_hint"));
    }

    #[test]
    fn delete_removes_after_confirmation() {
        let service = InMemoryService::default();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "delete");
        ctx.request.set("game", 1);
        ctx.post_vars.set("confirm", true);
        manage_word_games(&service, &mut ctx).unwrap();
        assert!(service.get_word_game(1).unwrap().is_none());
    }
}
