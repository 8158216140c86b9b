//! JSON handlers for the application and client APIs.

use super::response::outcome_response;
use super::web::parse_ids;
use crate::daemon::ServerDetails;
use crate::error::PanelError;
use crate::models::Server;
use crate::repository::PowerActionScope;
use crate::services::{
    BuildUpdate, DetailsUpdate, NewServer, StartupUpdate, SuspensionAction,
};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

type ApiResult<T = Response> = Result<T, PanelError>;

pub async fn create_server(
    State(state): State<AppState>,
    Json(request): Json<NewServer>,
) -> ApiResult {
    let outcome = state.lifecycle.create_server(request).await?;
    let server = state.repository.find(outcome.server_id).await?;
    Ok((StatusCode::CREATED, Json(server)).into_response())
}

pub async fn view_server(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Server>> {
    Ok(Json(state.repository.find(id).await?))
}

pub async fn update_details(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<DetailsUpdate>,
) -> ApiResult {
    Ok(outcome_response(state.lifecycle.set_details(id, update).await?))
}

pub async fn update_build(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<BuildUpdate>,
) -> ApiResult {
    Ok(outcome_response(state.lifecycle.update_build(id, update).await?))
}

pub async fn update_startup(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<StartupUpdate>,
) -> ApiResult {
    Ok(outcome_response(state.lifecycle.save_startup(id, update).await?))
}

pub async fn suspend(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let outcome = state
        .lifecycle
        .apply_suspension(id, SuspensionAction::Suspend)
        .await?;
    Ok(outcome_response(outcome))
}

pub async fn unsuspend(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let outcome = state
        .lifecycle
        .apply_suspension(id, SuspensionAction::Unsuspend)
        .await?;
    Ok(outcome_response(outcome))
}

pub async fn reinstall(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    Ok(outcome_response(state.lifecycle.reinstall(id).await?))
}

pub async fn archive(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    Ok(outcome_response(state.lifecycle.request_archive(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub jtis: Vec<String>,
}

pub async fn revoke_tokens(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<RevokeRequest>,
) -> ApiResult {
    Ok(outcome_response(
        state.lifecycle.revoke_tokens(id, &request.jtis).await?,
    ))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    Ok(outcome_response(state.lifecycle.delete(id, false).await?))
}

pub async fn force_delete(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    Ok(outcome_response(state.lifecycle.delete(id, true).await?))
}

#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    pub servers: Option<String>,
    pub nodes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ServerStats {
    pub suspended: i64,
    pub power_action: i64,
}

/// Suspended server count, and how many servers a power action on the
/// given `servers`/`nodes` would touch.
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Json<ServerStats>> {
    let scope = PowerActionScope {
        servers: parse_ids("servers", query.servers.as_deref().unwrap_or_default())?,
        nodes: parse_ids("nodes", query.nodes.as_deref().unwrap_or_default())?,
    };

    Ok(Json(ServerStats {
        suspended: state.repository.suspended_count().await?,
        power_action: state.repository.power_action_count(&scope).await?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn node_servers(
    State(state): State<AppState>,
    Path(node_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Server>>> {
    let servers = state
        .repository
        .servers_for_node(
            node_id,
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(50).min(100),
        )
        .await?;
    Ok(Json(servers))
}

pub async fn client_reinstall(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> ApiResult {
    let server = state.repository.get_by_uuid(&identifier).await?;
    Ok(outcome_response(state.lifecycle.reinstall(server.id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

pub async fn client_rename(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult {
    Ok(outcome_response(
        state.lifecycle.rename(&identifier, &request.name).await?,
    ))
}

pub async fn client_resources(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> ApiResult<Json<ServerDetails>> {
    Ok(Json(state.lifecycle.resources(&identifier).await?))
}
