use super::{LifecycleAction, LifecycleOutcome, LifecycleService, partial};
use crate::daemon::DaemonTarget;
use crate::error::{PanelError, PanelResult, ValidationErrors};
use crate::models::{Allocation, Relation, Server};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Requested resource limits and allocation changes for a server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildUpdate {
    #[serde(default)]
    pub allocation_id: Option<i64>,
    #[serde(default)]
    pub add_allocations: Vec<i64>,
    #[serde(default)]
    pub remove_allocations: Vec<i64>,
    pub memory: i64,
    pub swap: i64,
    pub io: i64,
    pub cpu: i64,
    pub disk: i64,
    #[serde(default)]
    pub threads: Option<String>,
    #[serde(default)]
    pub oom_disabled: bool,
    #[serde(default)]
    pub database_limit: Option<i64>,
    #[serde(default)]
    pub allocation_limit: Option<i64>,
    #[serde(default)]
    pub backup_limit: Option<i64>,
}

/// Resource limits shared by build changes and new servers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits<'a> {
    pub memory: i64,
    pub swap: i64,
    pub io: i64,
    pub cpu: i64,
    pub disk: i64,
    pub threads: Option<&'a str>,
    pub database_limit: Option<i64>,
    pub allocation_limit: Option<i64>,
    pub backup_limit: Option<i64>,
}

impl BuildUpdate {
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
}

pub(crate) fn normalize_threads(threads: Option<&str>) -> Option<String> {
    threads
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub(crate) fn validate_limits(limits: &Limits<'_>, errors: &mut ValidationErrors) {
    if limits.memory < 0 {
        errors.add("memory", "must be at least 0");
    }
    if limits.swap < -1 {
        errors.add("swap", "must be at least -1");
    }
    if !(10..=1000).contains(&limits.io) {
        errors.add("io", "must be between 10 and 1000");
    }
    if limits.cpu < 0 {
        errors.add("cpu", "must be at least 0");
    }
    if limits.disk < 0 {
        errors.add("disk", "must be at least 0");
    }
    if let Some(threads) = normalize_threads(limits.threads) {
        if !threads
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-' || c == ',')
        {
            errors.add("threads", "may only contain digits, commas and dashes");
        }
    }
    for (field, value) in [
        ("database_limit", limits.database_limit),
        ("allocation_limit", limits.allocation_limit),
        ("backup_limit", limits.backup_limit),
    ] {
        if matches!(value, Some(v) if v < 0) {
            errors.add(field, "must be at least 0");
        }
    }
}

/// Checks that allocations can be claimed by a server on `node_id`.
/// `requested` ids missing from `found` are reported as unknown.
pub(crate) fn check_claimable(
    field: &str,
    requested: &[i64],
    found: &[Allocation],
    node_id: i64,
    server_id: Option<i64>,
    errors: &mut ValidationErrors,
) {
    for id in requested {
        match found.iter().find(|a| a.id == *id) {
            None => errors.add(field, format!("allocation {} does not exist", id)),
            Some(allocation) if allocation.node_id != node_id => errors.add(
                field,
                format!("allocation {} does not belong to node {}", id, node_id),
            ),
            Some(allocation) => {
                if let Some(owner) = allocation.server_id {
                    if Some(owner) != server_id {
                        errors.add(
                            field,
                            format!("allocation {} is already assigned to another server", id),
                        );
                    }
                }
            }
        }
    }
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Allocation changes that passed validation.
#[derive(Debug, PartialEq)]
struct AllocationPlan {
    primary: i64,
    add: Vec<i64>,
    remove: Vec<i64>,
}

fn plan_allocations(
    server: &Server,
    update: &BuildUpdate,
    candidates: &[Allocation],
    errors: &mut ValidationErrors,
) -> Option<AllocationPlan> {
    let current: BTreeSet<i64> = server
        .relations
        .allocations
        .iter()
        .flatten()
        .map(|a| a.id)
        .collect();

    let add = dedup(&update.add_allocations);
    // An id listed on both sides stays assigned.
    let remove: Vec<i64> = dedup(&update.remove_allocations)
        .into_iter()
        .filter(|id| !add.contains(id))
        .collect();
    let before = errors.len();

    check_claimable(
        "add_allocations",
        &add,
        candidates,
        server.node_id,
        Some(server.id),
        errors,
    );

    for id in &remove {
        if !current.contains(id) {
            errors.add(
                "remove_allocations",
                format!("allocation {} is not assigned to this server", id),
            );
        }
    }

    let mut result = current.clone();
    for id in &remove {
        result.remove(id);
    }
    result.extend(add.iter().copied());

    if let Some(limit) = update.allocation_limit {
        if result.len() as i64 > limit {
            errors.add(
                "allocation_limit",
                format!("server would have {} allocations, limit is {}", result.len(), limit),
            );
        }
    }

    let primary = match update.allocation_id {
        Some(id) if result.contains(&id) => Some(id),
        Some(id) => {
            errors.add(
                "allocation_id",
                format!("allocation {} is not assigned to this server", id),
            );
            None
        }
        None if result.contains(&server.allocation_id) => Some(server.allocation_id),
        None => match result.iter().next() {
            Some(fallback) => Some(*fallback),
            None => {
                errors.add(
                    "allocation_id",
                    "the primary allocation cannot be removed without assigning another",
                );
                None
            }
        },
    };

    if errors.len() > before {
        return None;
    }

    Some(AllocationPlan {
        primary: primary?,
        add: add.into_iter().filter(|id| !current.contains(id)).collect(),
        remove,
    })
}

impl LifecycleService {
    /// Changes limits and allocations, then pushes the new build to the daemon.
    pub async fn update_build(&self, id: i64, update: BuildUpdate) -> PanelResult<LifecycleOutcome> {
        let mut server = self.repository.find(id).await?;
        self.repository
            .load(&mut server, &[Relation::Allocations], true)
            .await?;

        let mut errors = ValidationErrors::new();
        validate_limits(&update.limits(), &mut errors);

        let candidates = if update.add_allocations.is_empty() {
            Vec::new()
        } else {
            self.repository
                .store()
                .find_allocations(&dedup(&update.add_allocations))
                .await?
        };
        let plan = plan_allocations(&server, &update, &candidates, &mut errors);
        errors.into_result()?;
        let plan = plan.ok_or_else(|| PanelError::Internal("allocation plan missing".into()))?;

        server.memory = update.memory;
        server.swap = update.swap;
        server.io = update.io;
        server.cpu = update.cpu;
        server.disk = update.disk;
        server.threads = normalize_threads(update.threads.as_deref());
        server.oom_disabled = update.oom_disabled;
        server.database_limit = update.database_limit;
        server.allocation_limit = update.allocation_limit;
        server.backup_limit = update.backup_limit;
        server.allocation_id = plan.primary;

        self.repository
            .store()
            .save_build(&server, &plan.add, &plan.remove)
            .await?;
        tracing::info!(
            server_id = id,
            added = plan.add.len(),
            removed = plan.remove.len(),
            "build configuration saved"
        );

        self.repository.load_rebuild_data(&mut server, true).await?;
        let node = self.repository.load_node(&mut server, false).await?;
        let target = DaemonTarget::new(&server, &node);

        self.daemon
            .update(&target, &server.build_payload())
            .await
            .map_err(|e| partial(id, e))?;

        Ok(LifecycleOutcome::new(id, LifecycleAction::BuildUpdated).notified())
    }
}
