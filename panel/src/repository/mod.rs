//! Read and write access to persisted servers.
//!
//! [`ServerStore`] is the persistence seam; [`ServerRepository`] sits on top
//! of it and decides when relations are fetched. A relation already present
//! on a [`Server`] instance is reused unless the caller asks for a refresh,
//! so concurrent changes in the database are not observed until then.

mod postgres;

pub use postgres::PgStore;

use crate::error::{PanelError, PanelResult};
use crate::models::{
    Allocation, Database, Egg, Mount, Node, Relation, RelationData, Server,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

/// Which servers a mass power action applies to. With both lists set, a
/// server matches when its id OR its node is listed. With neither, all match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerActionScope {
    pub servers: Vec<i64>,
    pub nodes: Vec<i64>,
}

impl PowerActionScope {
    pub fn matches(&self, server: &Server) -> bool {
        match (self.servers.is_empty(), self.nodes.is_empty()) {
            (false, false) => {
                self.servers.contains(&server.id) || self.nodes.contains(&server.node_id)
            }
            (false, true) => self.servers.contains(&server.id),
            (true, false) => self.nodes.contains(&server.node_id),
            (true, true) => true,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn find(&self, id: i64) -> PanelResult<Option<Server>>;

    /// Matches either the full uuid or the short uuid.
    async fn find_by_identifier(&self, identifier: &str) -> PanelResult<Option<Server>>;

    /// Inserts the server and claims the given allocations for it. Returns the new id.
    async fn insert(&self, server: &Server, allocations: &[i64]) -> PanelResult<i64>;

    async fn update(&self, server: &Server) -> PanelResult<()>;

    /// Saves the server row and allocation changes in one transaction.
    async fn save_build(&self, server: &Server, add: &[i64], remove: &[i64]) -> PanelResult<()>;

    /// Saves the server row and variable values `(variable_id, value)` in one transaction.
    async fn save_startup(&self, server: &Server, variables: &[(i64, String)]) -> PanelResult<()>;

    /// Removes the server and everything hanging off it, releasing its allocations.
    async fn delete(&self, id: i64) -> PanelResult<()>;

    async fn fetch_relation(&self, server: &Server, relation: Relation)
    -> PanelResult<RelationData>;

    async fn find_allocations(&self, ids: &[i64]) -> PanelResult<Vec<Allocation>>;

    async fn find_egg(&self, id: i64) -> PanelResult<Option<Egg>>;

    async fn find_node(&self, id: i64) -> PanelResult<Option<Node>>;

    async fn external_id_in_use(&self, external_id: &str, except: Option<i64>)
    -> PanelResult<bool>;

    async fn is_unique_uuid_combo(&self, uuid: Uuid, short: &str) -> PanelResult<bool>;

    async fn count_suspended(&self) -> PanelResult<i64>;

    async fn for_power_action(&self, scope: &PowerActionScope) -> PanelResult<Vec<Server>>;

    async fn count_for_power_action(&self, scope: &PowerActionScope) -> PanelResult<i64>;

    async fn for_node(&self, node_id: i64, limit: i64, offset: i64) -> PanelResult<Vec<Server>>;
}

#[async_trait]
pub trait DatabaseStore: Send + Sync {
    async fn find_database(&self, server_id: i64, id: i64) -> PanelResult<Option<Database>>;

    async fn database_name_taken(&self, host_id: i64, name: &str) -> PanelResult<bool>;

    async fn insert_database(&self, database: &Database) -> PanelResult<i64>;

    async fn update_database_password(&self, id: i64, password: &str) -> PanelResult<()>;

    async fn delete_database(&self, id: i64) -> PanelResult<()>;
}

#[async_trait]
pub trait MountStore: Send + Sync {
    async fn find_mount(&self, id: i64) -> PanelResult<Option<Mount>>;

    /// Linking an already linked mount is a no-op.
    async fn attach_mount(&self, server_id: i64, mount_id: i64) -> PanelResult<()>;

    /// Returns whether a link was removed.
    async fn detach_mount(&self, server_id: i64, mount_id: i64) -> PanelResult<bool>;
}

#[derive(Clone)]
pub struct ServerRepository {
    store: Arc<dyn ServerStore>,
}

impl ServerRepository {
    pub fn new(store: Arc<dyn ServerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn ServerStore {
        self.store.as_ref()
    }

    pub async fn find(&self, id: i64) -> PanelResult<Server> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| PanelError::not_found("server", id))
    }

    /// Server by uuid or short uuid, with its nest and node loaded.
    pub async fn get_by_uuid(&self, identifier: &str) -> PanelResult<Server> {
        let mut server = self
            .store
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| PanelError::not_found("server", identifier))?;
        self.load(&mut server, &[Relation::Nest, Relation::Node], true)
            .await?;
        Ok(server)
    }

    pub async fn find_with_variables(&self, id: i64) -> PanelResult<Server> {
        let mut server = self.find(id).await?;
        self.load(&mut server, &[Relation::Egg, Relation::Variables], true)
            .await?;
        Ok(server)
    }

    pub async fn load_egg_relations(&self, server: &mut Server, refresh: bool) -> PanelResult<()> {
        self.load(server, &[Relation::Egg], refresh).await
    }

    pub async fn load_primary_allocation(
        &self,
        server: &mut Server,
        refresh: bool,
    ) -> PanelResult<()> {
        self.load(server, &[Relation::Allocation], refresh).await
    }

    /// Everything needed to describe the server to the daemon on creation.
    pub async fn load_creation_data(&self, server: &mut Server, refresh: bool) -> PanelResult<()> {
        self.load(
            server,
            &[Relation::Allocation, Relation::Allocations, Relation::Egg],
            refresh,
        )
        .await
    }

    pub async fn load_rebuild_data(&self, server: &mut Server, refresh: bool) -> PanelResult<()> {
        self.load(
            server,
            &[
                Relation::Allocation,
                Relation::Allocations,
                Relation::Egg,
                Relation::Node,
            ],
            refresh,
        )
        .await
    }

    pub async fn load_database_relations(
        &self,
        server: &mut Server,
        refresh: bool,
    ) -> PanelResult<()> {
        self.load(server, &[Relation::Databases], refresh).await
    }

    pub async fn load_node(&self, server: &mut Server, refresh: bool) -> PanelResult<Node> {
        self.load(server, &[Relation::Node], refresh).await?;
        server
            .relations
            .node
            .clone()
            .ok_or_else(|| PanelError::not_found("node", server.node_id))
    }

    pub async fn daemon_service_data(&self, server: &mut Server, refresh: bool) -> PanelResult<Value> {
        self.load_egg_relations(server, refresh).await?;
        let egg = server
            .relations
            .egg
            .as_ref()
            .ok_or_else(|| PanelError::not_found("egg", server.egg_id))?;
        Ok(json!({ "egg": egg.uuid }))
    }

    pub async fn load(
        &self,
        server: &mut Server,
        relations: &[Relation],
        refresh: bool,
    ) -> PanelResult<()> {
        for relation in relations {
            if refresh || !server.relations.is_loaded(*relation) {
                let data = self.store.fetch_relation(server, *relation).await?;
                server.relations.set(data);
            }
        }
        Ok(())
    }

    pub async fn suspended_count(&self) -> PanelResult<i64> {
        self.store.count_suspended().await
    }

    pub async fn is_unique_uuid_combo(&self, uuid: Uuid, short: &str) -> PanelResult<bool> {
        self.store.is_unique_uuid_combo(uuid, short).await
    }

    /// Servers targeted by a mass power action, each with its node loaded.
    pub async fn servers_for_power_action(
        &self,
        scope: &PowerActionScope,
    ) -> PanelResult<Vec<Server>> {
        let mut servers = self.store.for_power_action(scope).await?;
        for server in servers.iter_mut() {
            self.load(server, &[Relation::Node], false).await?;
        }
        Ok(servers)
    }

    pub async fn power_action_count(&self, scope: &PowerActionScope) -> PanelResult<i64> {
        self.store.count_for_power_action(scope).await
    }

    /// One page of a node's servers; pages start at 1.
    pub async fn servers_for_node(
        &self,
        node_id: i64,
        page: i64,
        per_page: i64,
    ) -> PanelResult<Vec<Server>> {
        let per_page = per_page.max(1);
        let offset = (page.max(1) - 1).saturating_mul(per_page);
        self.store.for_node(node_id, per_page, offset).await
    }
}
