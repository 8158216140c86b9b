use crate::error::{PanelError, PanelResult};
use crate::models::Mount;
use crate::repository::{MountStore, ServerRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct MountService {
    repository: ServerRepository,
    store: Arc<dyn MountStore>,
}

impl MountService {
    pub fn new(repository: ServerRepository, store: Arc<dyn MountStore>) -> Self {
        Self { repository, store }
    }

    async fn mount(&self, mount_id: i64) -> PanelResult<Mount> {
        self.store
            .find_mount(mount_id)
            .await?
            .ok_or_else(|| PanelError::not_found("mount", mount_id))
    }

    /// Links a mount to a server. Linking twice is not an error.
    pub async fn attach(&self, server_id: i64, mount_id: i64) -> PanelResult<Mount> {
        let server = self.repository.find(server_id).await?;
        let mount = self.mount(mount_id).await?;

        self.store.attach_mount(server.id, mount.id).await?;
        tracing::info!(server_id, mount_id, mount = %mount.name, "mount attached");
        Ok(mount)
    }

    pub async fn detach(&self, server_id: i64, mount_id: i64) -> PanelResult<Mount> {
        let server = self.repository.find(server_id).await?;
        let mount = self.mount(mount_id).await?;

        if self.store.detach_mount(server.id, mount.id).await? {
            tracing::info!(server_id, mount_id, "mount detached");
        } else {
            tracing::debug!(server_id, mount_id, "mount was not attached");
        }
        Ok(mount)
    }
}
