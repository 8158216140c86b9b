use super::{LifecycleAction, LifecycleOutcome, LifecycleService};
use crate::error::{PanelError, PanelResult};
use crate::models::InstallStatus;

impl LifecycleService {
    /// Flips a server between installing and installed without involving the
    /// daemon. Servers whose install failed must be reinstalled instead.
    pub async fn toggle_install(&self, id: i64) -> PanelResult<LifecycleOutcome> {
        let mut server = self.repository.find(id).await?;

        server.installed = match server.installed {
            InstallStatus::Installing => InstallStatus::Installed,
            InstallStatus::Installed => InstallStatus::Installing,
            InstallStatus::Failed => {
                return Err(PanelError::validation(
                    "installed",
                    "this server's installation failed and it must be reinstalled",
                ));
            }
        };

        self.repository.store().update(&server).await?;
        tracing::info!(server_id = id, installed = server.installed.code(), "install status toggled");

        Ok(LifecycleOutcome::new(id, LifecycleAction::InstallToggled))
    }

    /// Asks the daemon to rerun the install script. Completion is reported by
    /// the daemon later; the server is marked as installing once accepted.
    pub async fn reinstall(&self, id: i64) -> PanelResult<LifecycleOutcome> {
        let mut server = self.repository.find(id).await?;
        self.repository.load_egg_relations(&mut server, false).await?;
        let target = self.target(&mut server).await?;

        if let Err(e) = self.daemon.reinstall(&target).await {
            tracing::error!(server_id = id, node = %e.node(), error = %e, "daemon rejected reinstall");
            return Err(e.into());
        }

        server.installed = InstallStatus::Installing;
        self.repository.store().update(&server).await?;
        tracing::info!(server_id = id, uuid = %server.uuid, "reinstall started");

        Ok(LifecycleOutcome::new(id, LifecycleAction::Reinstalled).notified())
    }
}
