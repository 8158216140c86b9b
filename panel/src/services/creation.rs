use super::build::{Limits, check_claimable, normalize_threads, validate_limits};
use super::startup::resolve_environment;
use super::{LifecycleAction, LifecycleOutcome, LifecycleService, check_length};
use crate::daemon::DaemonTarget;
use crate::error::{PanelError, PanelResult, ValidationErrors};
use crate::models::{InstallStatus, Relation, RelationData, Server, ServerRelations};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

const UUID_ATTEMPTS: usize = 5;

fn default_io() -> i64 {
    500
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewServer {
    #[serde(default)]
    pub external_id: Option<String>,
    pub owner_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub node_id: i64,
    pub allocation_id: i64,
    #[serde(default)]
    pub additional_allocations: Vec<i64>,
    pub egg_id: i64,
    pub startup: String,
    pub image: String,
    pub memory: i64,
    pub swap: i64,
    pub disk: i64,
    #[serde(default = "default_io")]
    pub io: i64,
    pub cpu: i64,
    #[serde(default)]
    pub threads: Option<String>,
    #[serde(default = "default_true")]
    pub oom_disabled: bool,
    #[serde(default)]
    pub database_limit: Option<i64>,
    #[serde(default)]
    pub allocation_limit: Option<i64>,
    #[serde(default)]
    pub backup_limit: Option<i64>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub start_on_completion: bool,
}

impl NewServer {
    fn limits(&self) -> Limits<'_> {
        Limits {
            memory: self.memory,
            swap: self.swap,
            io: self.io,
            cpu: self.cpu,
            disk: self.disk,
            threads: self.threads.as_deref(),
            database_limit: self.database_limit,
            allocation_limit: self.allocation_limit,
            backup_limit: self.backup_limit,
        }
    }

    fn allocation_ids(&self) -> Vec<i64> {
        let mut ids = vec![self.allocation_id];
        for id in &self.additional_allocations {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

/// The short identifier is the first block of the hyphenated uuid.
pub fn short_uuid(uuid: &Uuid) -> String {
    uuid.to_string()[..8].to_string()
}

impl LifecycleService {
    async fn unique_uuid(&self) -> PanelResult<(Uuid, String)> {
        for _ in 0..UUID_ATTEMPTS {
            let uuid = Uuid::new_v4();
            let short = short_uuid(&uuid);
            if self.repository.is_unique_uuid_combo(uuid, &short).await? {
                return Ok((uuid, short));
            }
        }
        Err(PanelError::Internal(
            "could not generate a unique server identifier".to_string(),
        ))
    }

    /// Provisions a server locally and asks the daemon to create it. A daemon
    /// failure removes the local record again.
    pub async fn create_server(&self, request: NewServer) -> PanelResult<LifecycleOutcome> {
        let store = self.repository.store();
        let mut errors = ValidationErrors::new();

        check_length(&mut errors, "name", &request.name);
        check_length(&mut errors, "image", &request.image);
        if request.startup.trim().is_empty() {
            errors.add("startup", "must not be empty");
        }
        if request.owner_id <= 0 {
            errors.add("owner_id", "must reference a user");
        }
        validate_limits(&request.limits(), &mut errors);

        let external_id = request
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        if let Some(external_id) = &external_id {
            check_length(&mut errors, "external_id", external_id);
            if store.external_id_in_use(external_id, None).await? {
                errors.add("external_id", "is already in use by another server");
            }
        }

        let node = store.find_node(request.node_id).await?;
        if node.is_none() {
            errors.add("node_id", format!("node {} does not exist", request.node_id));
        }

        let egg = store.find_egg(request.egg_id).await?;
        if egg.is_none() {
            errors.add("egg_id", format!("egg {} does not exist", request.egg_id));
        }

        let allocation_ids = request.allocation_ids();
        let allocations = store.find_allocations(&allocation_ids).await?;
        check_claimable(
            "allocation_id",
            &allocation_ids[..1],
            &allocations,
            request.node_id,
            None,
            &mut errors,
        );
        check_claimable(
            "additional_allocations",
            &allocation_ids[1..],
            &allocations,
            request.node_id,
            None,
            &mut errors,
        );
        if let Some(limit) = request.allocation_limit {
            if allocation_ids.len() as i64 > limit {
                errors.add(
                    "allocation_limit",
                    format!("{} allocations requested, limit is {}", allocation_ids.len(), limit),
                );
            }
        }

        let (uuid, uuid_short) = self.unique_uuid().await?;
        let now = Utc::now();
        let mut server = Server {
            id: 0,
            uuid,
            uuid_short,
            external_id,
            owner_id: request.owner_id,
            node_id: request.node_id,
            name: request.name.trim().to_string(),
            description: request.description.clone(),
            allocation_id: request.allocation_id,
            nest_id: egg.as_ref().map(|e| e.nest_id).unwrap_or_default(),
            egg_id: request.egg_id,
            startup: request.startup.clone(),
            image: request.image.trim().to_string(),
            memory: request.memory,
            swap: request.swap,
            disk: request.disk,
            io: request.io,
            cpu: request.cpu,
            threads: normalize_threads(request.threads.as_deref()),
            oom_disabled: request.oom_disabled,
            database_limit: request.database_limit,
            allocation_limit: request.allocation_limit,
            backup_limit: request.backup_limit,
            installed: InstallStatus::Installing,
            suspended: false,
            created_at: now,
            updated_at: now,
            relations: ServerRelations::default(),
        };

        let variables = if egg.is_some() {
            match store.fetch_relation(&server, Relation::Variables).await? {
                RelationData::Variables(variables) => variables,
                _ => Vec::new(),
            }
        } else {
            Vec::new()
        };
        let values = resolve_environment(&variables, &request.environment, &mut errors);

        errors.into_result()?;
        let node = node.ok_or_else(|| PanelError::not_found("node", request.node_id))?;

        server.id = store.insert(&server, &allocation_ids).await?;
        if !values.is_empty() {
            store.save_startup(&server, &values).await?;
        }
        tracing::info!(server_id = server.id, uuid = %server.uuid, node = %node.name, "server record created");

        let target = DaemonTarget::new(&server, &node);
        let payload = json!({
            "uuid": server.uuid,
            "start_on_completion": request.start_on_completion,
        });

        if let Err(e) = self.daemon.create(&target, &payload).await {
            tracing::error!(server_id = server.id, node = %node.name, error = %e, "daemon refused server creation, removing record");
            if let Err(cleanup) = store.delete(server.id).await {
                tracing::error!(server_id = server.id, error = %cleanup, "failed to remove server record after daemon failure");
            }
            return Err(PanelError::DaemonUnreachable(e));
        }

        Ok(LifecycleOutcome::new(server.id, LifecycleAction::Created).notified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uuid_is_first_block() {
        let uuid = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        assert_eq!(short_uuid(&uuid), "a1b2c3d4");
    }

    #[test]
    fn primary_allocation_comes_first_without_duplicates() {
        let request: NewServer = serde_json::from_value(serde_json::json!({
            "owner_id": 1,
            "name": "lobby",
            "node_id": 1,
            "allocation_id": 3,
            "additional_allocations": [4, 3, 5],
            "egg_id": 1,
            "startup": "java -jar server.jar",
            "image": "ghcr.io/games/java:21",
            "memory": 1024,
            "swap": 0,
            "disk": 4096,
            "cpu": 100
        }))
        .unwrap();

        assert_eq!(request.allocation_ids(), vec![3, 4, 5]);
        assert_eq!(request.io, 500);
        assert!(request.oom_disabled);
    }
}
