use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use dotenvy::dotenv;
use serde_json::{json, Value};
use std::{collections::HashMap, env, net::SocketAddr};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use educoin_admin::{
    admin::admin_dispatch,
    pagination::page_tokens,
    services::{AdminContext, AdminError, AdminService, InMemoryService, ListQuery},
    templates::listing_template::{render_listing, ListingPage},
};

#[derive(Clone)]
struct AppState {
    admin: InMemoryService,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    let admin = InMemoryService::new_with_sample();
    let state = AppState { admin };
    let app = Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/ui/children", get(children_page))
        .route("/admin/:area", get(admin_get).post(admin_post))
        .with_state(state);

    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".into())
        .parse()
        .expect("invalid BIND_ADDR, expected host:port");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind HTTP listener");
    info!("admin console listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server crashed");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.admin.dashboard_counts() {
        Ok(counts) => json!({"status": "ok", "records": counts}),
        Err(err) => {
            error!(error = %err, "record store check failed");
            json!({"status": "error", "message": err.to_string()})
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "service": "ok",
            "store": store_status,
            "timestamp": Utc::now()
        })),
    )
}

/// The `x-operator-role` header selects an operator profile; requests
/// without one act as the full-access console account.
fn operator_context(headers: &HeaderMap) -> AdminContext {
    let mut ctx = AdminContext::default();
    ctx.dashboard_url = "/admin".into();
    ctx.user_info.id = 1;
    ctx.user_info.name = "console".into();
    ctx.user_info.is_guest = false;
    match headers
        .get("x-operator-role")
        .and_then(|value| value.to_str().ok())
    {
        Some(role) => ctx.session.set("operator_role", role),
        None => ctx.user_info.is_admin = true,
    }
    ctx
}

async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut ctx = operator_context(&headers);
    ctx.request.set("area", "index");
    dispatch(&state, ctx)
}

async fn admin_get(
    State(state): State<AppState>,
    Path(area): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut ctx = operator_context(&headers);
    for (key, value) in params {
        ctx.request.set(&key, value);
    }
    ctx.request.set("area", area);
    dispatch(&state, ctx)
}

async fn admin_post(
    State(state): State<AppState>,
    Path(area): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut ctx = operator_context(&headers);
    for (key, value) in params {
        ctx.request.set(&key, value);
    }
    ctx.request.set("area", area);
    if let Value::Object(fields) = body {
        for (key, value) in fields {
            ctx.post_vars.set(&key, value);
        }
    }
    dispatch(&state, ctx)
}

fn dispatch(state: &AppState, mut ctx: AdminContext) -> Response {
    match admin_dispatch(&state.admin, &mut ctx) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "section": ctx.section,
                "context": ctx.context.to_value()
            })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(error: AdminError) -> Response {
    let status = match &error {
        AdminError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        AdminError::Validation(_) => StatusCode::BAD_REQUEST,
        AdminError::NotFound(_) => StatusCode::NOT_FOUND,
        AdminError::SessionTimeout => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({"status": "error", "message": error.to_string()})),
    )
        .into_response()
}

async fn children_page(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let query = ListQuery {
        page: params
            .get("page")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(1),
        search: params
            .get("search")
            .map(|raw| raw.trim().to_string())
            .filter(|term| !term.is_empty()),
        ..ListQuery::default()
    };
    let page = match state.admin.list_children(&query) {
        Ok(page) => page,
        Err(err) => return error_response(err),
    };

    let listing = ListingPage {
        title: "Children".into(),
        base_url: "/ui/children".into(),
        columns: vec!["Name".into(), "Age".into(), "Coins".into()],
        rows: page
            .items
            .iter()
            .map(|child| {
                vec![
                    child.name.clone(),
                    child.age.to_string(),
                    child.coins.to_string(),
                ]
            })
            .collect(),
        current_page: page.page_number,
        page_tokens: page_tokens(page.page_number, page.page_count),
        empty_label: "No children yet".into(),
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>EduCoin Admin - Children</title>
  <style>
    body {{ font-family: Arial, sans-serif; max-width: 720px; margin: 40px auto; line-height: 1.6; }}
    table {{ border-collapse: collapse; width: 100%; }}
    th, td {{ border: 1px solid #ccc; padding: 6px 10px; text-align: left; }}
    .pagination a, .pagination strong {{ margin-right: 6px; }}
  </style>
</head>
<body>
{listing}
</body>
</html>"#,
        listing = render_listing(&listing)
    ))
    .into_response()
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    }
}
