mod api;
mod auth;
mod response;
mod web;

pub use api::ServerStats;
pub use auth::auth_middleware;
pub use response::outcome_response;
pub use web::parse_ids;

use crate::state::AppState;
use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use tower_http::trace::TraceLayer;

async fn health_check() -> &'static str {
    "OK"
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/{id}/details", post(web::set_details))
        .route("/{id}/manage/toggle", post(web::toggle_install))
        .route("/{id}/manage/reinstall", post(web::reinstall))
        .route("/{id}/manage/suspension", post(web::manage_suspension))
        .route("/{id}/build", post(web::update_build))
        .route("/{id}/startup", post(web::save_startup))
        .route("/{id}/delete", post(web::delete))
        .route(
            "/{id}/database",
            post(web::new_database).patch(web::reset_database_password),
        )
        .route("/{id}/database/{database}", delete(web::delete_database))
        .route(
            "/{id}/mounts/{mount}",
            post(web::add_mount).delete(web::delete_mount),
        );

    let application = Router::new()
        .route("/servers", post(api::create_server))
        .route("/servers/stats", get(api::stats))
        .route("/servers/{id}", get(api::view_server).delete(api::delete))
        .route("/servers/{id}/force", delete(api::force_delete))
        .route("/servers/{id}/details", patch(api::update_details))
        .route("/servers/{id}/build", patch(api::update_build))
        .route("/servers/{id}/startup", patch(api::update_startup))
        .route("/servers/{id}/suspend", post(api::suspend))
        .route("/servers/{id}/unsuspend", post(api::unsuspend))
        .route("/servers/{id}/reinstall", post(api::reinstall))
        .route("/servers/{id}/archive", post(api::archive))
        .route("/servers/{id}/ws/deny", post(api::revoke_tokens))
        .route("/nodes/{id}/servers", get(api::node_servers));

    let client = Router::new()
        .route(
            "/servers/{identifier}/settings/reinstall",
            post(api::client_reinstall),
        )
        .route(
            "/servers/{identifier}/settings/rename",
            post(api::client_rename),
        )
        .route("/servers/{identifier}/resources", get(api::client_resources));

    Router::new()
        .route("/health", get(health_check))
        .nest("/admin/servers/view", admin)
        .nest("/api/application", application)
        .nest("/api/client", client)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
