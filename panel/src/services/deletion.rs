use super::{LifecycleAction, LifecycleOutcome, LifecycleService};
use crate::error::{PanelError, PanelResult};

impl LifecycleService {
    /// Removes the container on the daemon, then the local record.
    ///
    /// Without `force` any daemon failure other than a 404 aborts and the record
    /// stays. With `force` daemon failures become warnings and the record is
    /// always removed.
    pub async fn delete(&self, id: i64, force: bool) -> PanelResult<LifecycleOutcome> {
        let mut server = self.repository.find(id).await?;
        let mut outcome = LifecycleOutcome::new(id, LifecycleAction::Deleted);

        match self.target(&mut server).await {
            Ok(target) => match self.daemon.delete(&target).await {
                Ok(()) => outcome = outcome.notified(),
                Err(e) if e.is_not_found() => {
                    tracing::info!(server_id = id, node = %e.node(), "server already absent on daemon");
                    outcome = outcome.notified();
                }
                Err(e) if force => {
                    let e = e.downgrade();
                    tracing::warn!(server_id = id, node = %e.node(), error = %e, "daemon delete failed, continuing with forced deletion");
                    outcome.warn(e.to_string());
                }
                Err(e) => {
                    tracing::error!(server_id = id, node = %e.node(), error = %e, "daemon delete failed, keeping server record");
                    return Err(PanelError::DaemonUnreachable(e));
                }
            },
            Err(e) if force => {
                tracing::warn!(server_id = id, error = %e, "node unavailable, continuing with forced deletion");
                outcome.warn(e.to_string());
            }
            Err(e) => return Err(e),
        }

        self.repository.store().delete(id).await?;
        tracing::info!(server_id = id, uuid = %server.uuid, force, "server deleted");

        Ok(outcome)
    }
}
