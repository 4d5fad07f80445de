mod admin;
mod auth;
mod errors;
mod logging;
mod manage_categories;
mod manage_children;
mod manage_gifts;
mod manage_levels;
mod manage_notifications;
mod manage_parents;
mod manage_payments;
mod manage_plans;
mod manage_tasks;
mod manage_word_games;
mod pagination;
mod rest;
mod security;
mod services;
mod templates;

use std::env;
use std::sync::Arc;

use auth::EnvToken;
use pagination::page_tokens;
use rest::RestClient;
use services::rest::RestService;
use services::{AdminContext, AdminService, InMemoryService};
use templates::listing_template::render_pagination;

fn main() {
    match env::var("EDUCOIN_API_URL") {
        Ok(_) => match RestClient::from_env(Arc::new(EnvToken)) {
            Ok(client) => run_demo(&RestService::new(client)),
            Err(error) => eprintln!("client init -> {error}"),
        },
        Err(_) => run_demo(&InMemoryService::default()),
    }
}

fn run_demo<S: AdminService + Clone>(service: &S) {
    let mut ctx = AdminContext::default();
    ctx.user_info.id = 1;
    ctx.user_info.is_guest = false;
    ctx.user_info.is_admin = true;
    ctx.dashboard_url = "/admin".into();

    if let Err(error) = admin::admin_main(service, &mut ctx) {
        eprintln!("dashboard -> {error}");
    }
    if let Some(counts) = ctx.context.get("dashboard_counts") {
        println!("dashboard counts: {counts}");
    }

    let mut list_ctx = AdminContext::default();
    list_ctx.user_info.is_admin = true;
    list_ctx.request.set("area", "children");
    list_ctx.request.set("page_size", 2);
    if let Err(error) = admin::admin_dispatch(service, &mut list_ctx) {
        eprintln!("children listing -> {error}");
    }
    let current = list_ctx.context.int("page_number").unwrap_or(1);
    let pages = list_ctx.context.int("page_count").unwrap_or(0);
    println!(
        "children, page {current} of {pages}: {}",
        render_pagination(&page_tokens(current, pages), current, "/admin?area=children")
    );

    let mut gift_ctx = AdminContext::default();
    gift_ctx.user_info.is_admin = true;
    gift_ctx.request.set("area", "gifts");
    gift_ctx.request.set("sa", "add");
    gift_ctx.request.set("save", true);
    gift_ctx.post_vars.set("name", "Zoo trip");
    gift_ctx.post_vars.set("cost_coins", 500);
    gift_ctx.post_vars.set("stock", 2);
    if let Err(error) = admin::admin_dispatch(service, &mut gift_ctx) {
        eprintln!("gift add -> {error}");
    }
    if let Some(id) = gift_ctx.context.int("saved_gift_id") {
        println!("added gift {id}");
    }

    let mut refund_ctx = AdminContext::default();
    refund_ctx.user_info.is_admin = true;
    refund_ctx.request.set("area", "payments");
    refund_ctx.request.set("sa", "refund");
    refund_ctx.request.set("payment", 2);
    refund_ctx.post_vars.set("confirm", true);
    if let Err(error) = admin::admin_dispatch(service, &mut refund_ctx) {
        eprintln!("refund pending payment -> {error}");
    }
}
