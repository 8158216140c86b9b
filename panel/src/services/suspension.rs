use super::{LifecycleAction, LifecycleOutcome, LifecycleService, partial};
use crate::error::{PanelError, PanelResult};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionAction {
    Suspend,
    Unsuspend,
}

impl FromStr for SuspensionAction {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suspend" => Ok(SuspensionAction::Suspend),
            "unsuspend" => Ok(SuspensionAction::Unsuspend),
            other => Err(PanelError::validation(
                "action",
                format!("expected suspend or unsuspend, got {:?}", other),
            )),
        }
    }
}

impl fmt::Display for SuspensionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspensionAction::Suspend => write!(f, "suspend"),
            SuspensionAction::Unsuspend => write!(f, "unsuspend"),
        }
    }
}

impl LifecycleService {
    /// Suspension driven by a raw `action` token from a form or request body.
    pub async fn manage_suspension(&self, id: i64, action: &str) -> PanelResult<LifecycleOutcome> {
        let action = action.parse::<SuspensionAction>()?;
        self.apply_suspension(id, action).await
    }

    /// Writes the flag locally, then tells the daemon. The daemon is told on
    /// every call, even when the flag already had the requested value.
    pub async fn apply_suspension(
        &self,
        id: i64,
        action: SuspensionAction,
    ) -> PanelResult<LifecycleOutcome> {
        let mut server = self.repository.find(id).await?;
        let suspend = action == SuspensionAction::Suspend;

        server.suspended = suspend;
        self.repository.store().update(&server).await?;
        tracing::info!(server_id = id, %action, "suspension flag saved");

        let target = self.target(&mut server).await?;
        self.daemon
            .suspend(&target, !suspend)
            .await
            .map_err(|e| partial(id, e))?;

        let done = match action {
            SuspensionAction::Suspend => LifecycleAction::Suspended,
            SuspensionAction::Unsuspend => LifecycleAction::Unsuspended,
        };
        Ok(LifecycleOutcome::new(id, done).notified())
    }
}
