//! Admin form handlers. Each posts to a service and redirects back to the page
//! it came from with `?alert=<action>` or `?error=<code>[&field=<field>]`.

use crate::error::{PanelError, PanelResult};
use crate::services::{
    BuildUpdate, DetailsUpdate, LifecycleOutcome, NewDatabase, StartupUpdate,
};
use crate::state::AppState;
use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

fn view(id: i64, page: &str) -> String {
    format!("/admin/servers/view/{}/{}", id, page)
}

fn error_redirect(back: &str, error: &PanelError) -> Redirect {
    tracing::warn!(target_page = back, error = %error, "admin action failed");
    let field = match error {
        PanelError::Validation(errors) => errors.iter().next().map(|e| e.field.clone()),
        _ => None,
    };
    match field {
        Some(field) => Redirect::to(&format!("{}?error={}&field={}", back, error.code(), field)),
        None => Redirect::to(&format!("{}?error={}", back, error.code())),
    }
}

fn redirect(result: PanelResult<LifecycleOutcome>, back: &str) -> Redirect {
    match result {
        Ok(outcome) => {
            let mut target = format!("{}?alert={}", back, outcome.action.alert());
            if !outcome.warnings.is_empty() {
                target.push_str("&warnings=");
                target.push_str(&outcome.warnings.len().to_string());
            }
            Redirect::to(&target)
        }
        Err(e) => error_redirect(back, &e),
    }
}

/// Widest range accepted in one `start-end` entry.
pub const MAX_ID_RANGE: i64 = 1000;

/// Parses `"3,4,10-12"` into ids. Blank input is an empty list.
pub fn parse_ids(field: &str, input: &str) -> PanelResult<Vec<i64>> {
    let mut result = Vec::new();

    for part in input.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }

        let invalid = || PanelError::validation(field, format!("{:?} is not a valid id", trimmed));
        match trimmed.split_once('-') {
            Some((start, end)) => {
                let start = start.trim().parse::<i64>().map_err(|_| invalid())?;
                let end = end.trim().parse::<i64>().map_err(|_| invalid())?;
                if start > end {
                    return Err(invalid());
                }
                if end.checked_sub(start).is_none_or(|width| width >= MAX_ID_RANGE) {
                    return Err(PanelError::validation(
                        field,
                        format!("ranges may span at most {} ids", MAX_ID_RANGE),
                    ));
                }
                result.extend(start..=end);
            }
            None => result.push(trimmed.parse::<i64>().map_err(|_| invalid())?),
        }
    }

    Ok(result)
}

fn optional_number(field: &str, input: &Option<String>) -> PanelResult<Option<i64>> {
    match input.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| PanelError::validation(field, "must be a whole number")),
    }
}

fn checked(input: &Option<String>) -> bool {
    matches!(input.as_deref(), Some(v) if !v.is_empty() && v != "0")
}

#[derive(Debug, Deserialize)]
pub struct DetailsForm {
    pub owner_id: i64,
    pub external_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
}

pub async fn set_details(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<DetailsForm>,
) -> Redirect {
    let update = DetailsUpdate {
        owner_id: form.owner_id,
        external_id: form.external_id,
        name: form.name,
        description: form.description.unwrap_or_default(),
    };
    redirect(state.lifecycle.set_details(id, update).await, &view(id, "details"))
}

pub async fn toggle_install(State(state): State<AppState>, Path(id): Path<i64>) -> Redirect {
    redirect(state.lifecycle.toggle_install(id).await, &view(id, "manage"))
}

pub async fn reinstall(State(state): State<AppState>, Path(id): Path<i64>) -> Redirect {
    redirect(state.lifecycle.reinstall(id).await, &view(id, "manage"))
}

#[derive(Debug, Deserialize)]
pub struct SuspensionForm {
    #[serde(default)]
    pub action: String,
}

pub async fn manage_suspension(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<SuspensionForm>,
) -> Redirect {
    redirect(
        state.lifecycle.manage_suspension(id, &form.action).await,
        &view(id, "manage"),
    )
}

#[derive(Debug, Deserialize)]
pub struct BuildForm {
    pub allocation_id: Option<String>,
    pub add_allocations: Option<String>,
    pub remove_allocations: Option<String>,
    pub memory: i64,
    pub swap: i64,
    pub io: i64,
    pub cpu: i64,
    pub disk: i64,
    pub threads: Option<String>,
    pub oom_disabled: Option<String>,
    pub database_limit: Option<String>,
    pub allocation_limit: Option<String>,
    pub backup_limit: Option<String>,
}

impl BuildForm {
    fn into_update(self) -> PanelResult<BuildUpdate> {
        Ok(BuildUpdate {
            allocation_id: optional_number("allocation_id", &self.allocation_id)?,
            add_allocations: parse_ids(
                "add_allocations",
                self.add_allocations.as_deref().unwrap_or_default(),
            )?,
            remove_allocations: parse_ids(
                "remove_allocations",
                self.remove_allocations.as_deref().unwrap_or_default(),
            )?,
            memory: self.memory,
            swap: self.swap,
            io: self.io,
            cpu: self.cpu,
            disk: self.disk,
            threads: self.threads,
            oom_disabled: checked(&self.oom_disabled),
            database_limit: optional_number("database_limit", &self.database_limit)?,
            allocation_limit: optional_number("allocation_limit", &self.allocation_limit)?,
            backup_limit: optional_number("backup_limit", &self.backup_limit)?,
        })
    }
}

pub async fn update_build(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<BuildForm>,
) -> Redirect {
    let back = view(id, "build");
    match form.into_update() {
        Ok(update) => redirect(state.lifecycle.update_build(id, update).await, &back),
        Err(e) => error_redirect(&back, &e),
    }
}

/// Startup form fields, with variables posted as `environment[KEY]=value`.
fn startup_from_form(form: HashMap<String, String>) -> PanelResult<StartupUpdate> {
    let mut environment = BTreeMap::new();
    let mut startup = String::new();
    let mut image = String::new();
    let mut egg_id = None;

    for (key, value) in form {
        if let Some(name) = key
            .strip_prefix("environment[")
            .and_then(|k| k.strip_suffix(']'))
        {
            environment.insert(name.to_string(), value);
            continue;
        }
        match key.as_str() {
            "startup" => startup = value,
            "image" | "docker_image" => image = value,
            "egg_id" => egg_id = optional_number("egg_id", &Some(value))?,
            _ => {}
        }
    }

    Ok(StartupUpdate {
        startup,
        image,
        egg_id,
        environment,
    })
}

pub async fn save_startup(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<HashMap<String, String>>,
) -> Redirect {
    let back = view(id, "startup");
    match startup_from_form(form) {
        Ok(update) => redirect(state.lifecycle.save_startup(id, update).await, &back),
        Err(e) => error_redirect(&back, &e),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    pub force_delete: Option<String>,
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<DeleteForm>,
) -> Redirect {
    let force = checked(&form.force_delete);
    match state.lifecycle.delete(id, force).await {
        Ok(outcome) => redirect(Ok(outcome), "/admin/servers"),
        Err(e) => error_redirect(&view(id, "delete"), &e),
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseForm {
    pub database: String,
    pub remote: Option<String>,
    pub database_host_id: i64,
    pub max_connections: Option<String>,
}

pub async fn new_database(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<DatabaseForm>,
) -> Redirect {
    let back = view(id, "database");
    let max_connections = match optional_number("max_connections", &form.max_connections) {
        Ok(value) => value.map(|v| v.clamp(0, i32::MAX as i64) as i32),
        Err(e) => return error_redirect(&back, &e),
    };
    let request = NewDatabase {
        database: form.database,
        remote: form.remote.filter(|r| !r.is_empty()).unwrap_or_else(|| "%".to_string()),
        database_host_id: form.database_host_id,
        max_connections,
    };

    match state.databases.create(id, request).await {
        Ok(_) => Redirect::to(&format!("{}?alert=database_created", back)),
        Err(e) => error_redirect(&back, &e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub database: i64,
}

pub async fn reset_database_password(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<ResetPasswordForm>,
) -> Response {
    match state.databases.reset_password(id, form.database).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_database(
    State(state): State<AppState>,
    Path((id, database)): Path<(i64, i64)>,
) -> Response {
    match state.databases.delete(id, database).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn add_mount(
    State(state): State<AppState>,
    Path((id, mount)): Path<(i64, i64)>,
) -> Redirect {
    let back = view(id, "mounts");
    match state.mounts.attach(id, mount).await {
        Ok(_) => Redirect::to(&format!("{}?alert=mount_added", back)),
        Err(e) => error_redirect(&back, &e),
    }
}

pub async fn delete_mount(
    State(state): State<AppState>,
    Path((id, mount)): Path<(i64, i64)>,
) -> Response {
    match state.mounts.detach(id, mount).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lists_and_ranges() {
        assert_eq!(parse_ids("add", " 3, 4,10-12 ,").unwrap(), vec![3, 4, 10, 11, 12]);
        assert!(parse_ids("add", "").unwrap().is_empty());
        assert!(parse_ids("add", "4,x").unwrap_err().is_validation());
        assert!(parse_ids("add", "9-3").is_err());
    }

    #[test]
    fn wide_ranges_are_rejected() {
        assert_eq!(parse_ids("add", "1-1000").unwrap().len(), 1000);

        let err = parse_ids("remove", "1-3000000000").unwrap_err();
        assert!(err.is_validation());
        match err {
            PanelError::Validation(errors) => assert!(errors.has("remove")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(parse_ids("add", &format!("0-{}", i64::MAX)).is_err());
    }

    #[test]
    fn startup_form_collects_environment() {
        let form = HashMap::from([
            ("startup".to_string(), "./run.sh".to_string()),
            ("docker_image".to_string(), "ghcr.io/games/base".to_string()),
            ("egg_id".to_string(), "".to_string()),
            ("environment[MOTD]".to_string(), "hi".to_string()),
        ]);

        let update = startup_from_form(form).unwrap();
        assert_eq!(update.startup, "./run.sh");
        assert_eq!(update.image, "ghcr.io/games/base");
        assert_eq!(update.egg_id, None);
        assert_eq!(update.environment.get("MOTD").map(String::as_str), Some("hi"));
    }

    #[test]
    fn checkboxes() {
        assert!(checked(&Some("1".to_string())));
        assert!(checked(&Some("on".to_string())));
        assert!(!checked(&Some("0".to_string())));
        assert!(!checked(&None));
    }
}
