use super::{LifecycleAction, LifecycleOutcome, LifecycleService};
use crate::daemon::ServerDetails;
use crate::error::{PanelError, PanelResult};

impl LifecycleService {
    pub async fn request_archive(&self, id: i64) -> PanelResult<LifecycleOutcome> {
        let mut server = self.repository.find(id).await?;
        let target = self.target(&mut server).await?;

        self.daemon.request_archive(&target).await?;
        tracing::info!(server_id = id, "archive requested");

        Ok(LifecycleOutcome::new(id, LifecycleAction::ArchiveRequested).notified())
    }

    /// Invalidates websocket sessions issued with the given token ids.
    pub async fn revoke_tokens(&self, id: i64, jtis: &[String]) -> PanelResult<LifecycleOutcome> {
        if jtis.is_empty() {
            return Err(PanelError::validation("jtis", "at least one token id is required"));
        }

        let mut server = self.repository.find(id).await?;
        let target = self.target(&mut server).await?;

        self.daemon.revoke_tokens(&target, jtis).await?;
        tracing::info!(server_id = id, count = jtis.len(), "websocket tokens revoked");

        Ok(LifecycleOutcome::new(id, LifecycleAction::TokensRevoked).notified())
    }

    /// Live state and utilization as reported by the daemon.
    pub async fn resources(&self, identifier: &str) -> PanelResult<ServerDetails> {
        let mut server = self.repository.get_by_uuid(identifier).await?;
        let target = self.target(&mut server).await?;

        match self.daemon.get_details(&target).await {
            Ok(details) => Ok(details),
            Err(e) => {
                tracing::warn!(server_id = server.id, node = %e.node(), error = %e, "could not fetch server details");
                Err(e.into())
            }
        }
    }
}
