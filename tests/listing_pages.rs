use educoin_admin::admin::admin_dispatch;
use educoin_admin::services::{AdminContext, AdminService, InMemoryService, WordGame};
use serde_json::json;

// Two word games ship with the sample data; pad the catalog until the
// pagination strip has something to window over.
fn service_with_games(extra: usize) -> InMemoryService {
    let service = InMemoryService::default();
    for index in 0..extra {
        service
            .save_word_game(WordGame {
                id: None,
                word: format!("word{index:02}"),
                hint: format!("hint {index}"),
                reward_coins: 5,
            })
            .unwrap();
    }
    service
}

fn browse(service: &InMemoryService, page: i64, page_size: i64) -> AdminContext {
    let mut ctx = AdminContext::default();
    ctx.user_info.is_admin = true;
    ctx.request.set("area", "word_games");
    ctx.request.set("page", page);
    ctx.request.set("page_size", page_size);
    admin_dispatch(service, &mut ctx).unwrap();
    ctx
}

#[test]
fn short_catalogs_list_every_page() {
    let service = service_with_games(28);
    let ctx = browse(&service, 1, 10);
    assert_eq!(ctx.context.int("list_count"), Some(30));
    assert_eq!(ctx.context.get("page_links").unwrap(), &json!([1, 2, 3]));
}

#[test]
fn start_window_appears_past_seven_pages() {
    let service = service_with_games(78);
    let ctx = browse(&service, 1, 10);
    assert_eq!(ctx.context.int("page_count"), Some(8));
    assert_eq!(
        ctx.context.get("page_links").unwrap(),
        &json!([1, 2, 3, 4, 5, "...", 8])
    );
}

#[test]
fn middle_window_hugs_the_current_page() {
    let service = service_with_games(88);
    let ctx = browse(&service, 5, 10);
    assert_eq!(
        ctx.context.get("page_links").unwrap(),
        &json!([1, "...", 4, 5, 6, "...", 9])
    );
}

#[test]
fn tail_window_runs_to_the_last_page() {
    let service = service_with_games(78);
    let ctx = browse(&service, 8, 10);
    assert_eq!(
        ctx.context.get("page_links").unwrap(),
        &json!([1, "...", 4, 5, 6, 7, 8])
    );
}

#[test]
fn out_of_range_page_clamps_to_the_last() {
    let service = service_with_games(78);
    let ctx = browse(&service, 99, 10);
    assert_eq!(ctx.context.int("page_number"), Some(8));
    let rows = ctx.context.get("word_games").unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 10);
}

#[test]
fn oversized_page_size_is_capped() {
    let service = service_with_games(78);
    let mut ctx = AdminContext::default();
    ctx.user_info.is_admin = true;
    ctx.request.set("area", "word_games");
    ctx.request.set("page_size", 1000);
    admin_dispatch(&service, &mut ctx).unwrap();
    assert_eq!(ctx.context.int("page_size"), Some(100));
    assert_eq!(ctx.context.int("page_count"), Some(1));
}
