//! Lifecycle operations that keep the panel database and the node daemon in step.
//!
//! Local state is the source of truth. When a daemon call fails after a local
//! commit the operation reports [`PanelError::PartialApplication`] and leaves
//! the committed state in place; nothing reconciles it automatically.

mod build;
mod creation;
mod databases;
mod deletion;
mod details;
mod install;
mod mounts;
mod remote;
mod startup;
mod suspension;

pub use build::BuildUpdate;
pub use creation::{NewServer, short_uuid};
pub use databases::{DatabaseService, NewDatabase};
pub use details::{DetailsUpdate, owner_jti};
pub use mounts::MountService;
pub use startup::StartupUpdate;
pub use suspension::SuspensionAction;

use crate::daemon::{DaemonClient, DaemonTarget};
use crate::error::{PanelError, PanelResult, ValidationErrors};
use crate::models::Server;
use crate::repository::ServerRepository;
use serde::Serialize;
use std::sync::Arc;

/// Longest value accepted for names, images and external ids.
pub const MAX_STRING_LENGTH: usize = 191;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Created,
    DetailsUpdated,
    Renamed,
    InstallToggled,
    Reinstalled,
    Suspended,
    Unsuspended,
    BuildUpdated,
    StartupUpdated,
    Deleted,
    ArchiveRequested,
    TokensRevoked,
}

impl LifecycleAction {
    pub fn message(self) -> &'static str {
        match self {
            LifecycleAction::Created => "Server has been created.",
            LifecycleAction::DetailsUpdated => "Server details have been updated.",
            LifecycleAction::Renamed => "Server has been renamed.",
            LifecycleAction::InstallToggled => "Server install status has been toggled.",
            LifecycleAction::Reinstalled => "Server reinstall has been started.",
            LifecycleAction::Suspended => "Server has been suspended.",
            LifecycleAction::Unsuspended => "Server has been unsuspended.",
            LifecycleAction::BuildUpdated => "Server build configuration has been updated.",
            LifecycleAction::StartupUpdated => "Server startup configuration has been updated.",
            LifecycleAction::Deleted => "Server has been deleted.",
            LifecycleAction::ArchiveRequested => "Server archive has been requested.",
            LifecycleAction::TokensRevoked => "Websocket tokens have been revoked.",
        }
    }

    /// Short token used in redirect query strings.
    pub fn alert(self) -> &'static str {
        match self {
            LifecycleAction::Created => "created",
            LifecycleAction::DetailsUpdated => "details_updated",
            LifecycleAction::Renamed => "renamed",
            LifecycleAction::InstallToggled => "install_toggled",
            LifecycleAction::Reinstalled => "reinstalled",
            LifecycleAction::Suspended => "suspended",
            LifecycleAction::Unsuspended => "unsuspended",
            LifecycleAction::BuildUpdated => "build_updated",
            LifecycleAction::StartupUpdated => "startup_updated",
            LifecycleAction::Deleted => "deleted",
            LifecycleAction::ArchiveRequested => "archive_requested",
            LifecycleAction::TokensRevoked => "tokens_revoked",
        }
    }

    /// Work continues on the daemon after the call returns.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            LifecycleAction::Reinstalled | LifecycleAction::ArchiveRequested
        )
    }
}

/// Result of a lifecycle operation, rendered by both the web and JSON adapters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleOutcome {
    pub server_id: i64,
    pub action: LifecycleAction,
    pub daemon_notified: bool,
    pub warnings: Vec<String>,
}

impl LifecycleOutcome {
    pub fn new(server_id: i64, action: LifecycleAction) -> Self {
        Self {
            server_id,
            action,
            daemon_notified: false,
            warnings: Vec::new(),
        }
    }

    pub fn notified(mut self) -> Self {
        self.daemon_notified = true;
        self
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

#[derive(Clone)]
pub struct LifecycleService {
    repository: ServerRepository,
    daemon: Arc<dyn DaemonClient>,
}

impl LifecycleService {
    pub fn new(repository: ServerRepository, daemon: Arc<dyn DaemonClient>) -> Self {
        Self { repository, daemon }
    }

    pub fn repository(&self) -> &ServerRepository {
        &self.repository
    }

    async fn target(&self, server: &mut Server) -> PanelResult<DaemonTarget> {
        let node = self.repository.load_node(server, false).await?;
        Ok(DaemonTarget::new(server, &node))
    }
}

pub(crate) fn check_length(errors: &mut ValidationErrors, field: &str, value: &str) {
    let length = value.chars().count();
    if length == 0 {
        errors.add(field, "must not be empty");
    } else if length > MAX_STRING_LENGTH {
        errors.add(
            field,
            format!("must not be longer than {} characters", MAX_STRING_LENGTH),
        );
    }
}

pub(crate) fn partial(server_id: i64, source: crate::daemon::DaemonConnectionError) -> PanelError {
    tracing::error!(server_id, node = %source.node(), error = %source, "daemon out of sync after local commit");
    PanelError::PartialApplication { server_id, source }
}
