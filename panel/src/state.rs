use crate::crypto::Encrypter;
use crate::daemon::DaemonClient;
use crate::repository::{DatabaseStore, MountStore, ServerRepository, ServerStore};
use crate::services::{DatabaseService, LifecycleService, MountService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repository: ServerRepository,
    pub lifecycle: LifecycleService,
    pub databases: DatabaseService,
    pub mounts: MountService,
    pub api_key: Arc<String>,
}

impl AppState {
    /// Wires the services around one store. Postgres in production, memory in tests.
    pub fn new<S>(
        store: Arc<S>,
        daemon: Arc<dyn DaemonClient>,
        encrypter: Encrypter,
        api_key: impl Into<String>,
    ) -> Self
    where
        S: ServerStore + DatabaseStore + MountStore + 'static,
    {
        let repository = ServerRepository::new(store.clone());
        Self {
            lifecycle: LifecycleService::new(repository.clone(), daemon),
            databases: DatabaseService::new(repository.clone(), store.clone(), encrypter),
            mounts: MountService::new(repository.clone(), store),
            repository,
            api_key: Arc::new(api_key.into()),
        }
    }
}
