use crate::crypto::Encrypter;
use crate::daemon::{DaemonClient, DaemonConnectionError, DaemonFailure};
use crate::error::{PanelError, PanelResult};
use crate::models::{
    Allocation, Database, Egg, InstallStatus, Mount, Nest, Node, Relation, RelationData, Server,
    ServerRelations, ServerVariable,
};
use crate::repository::{
    DatabaseStore, MountStore, PowerActionScope, ServerRepository, ServerStore,
};
use crate::services::LifecycleService;
use crate::state::AppState;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub const API_KEY: &str = "test-api-key";
pub const ENCRYPTION_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

pub fn server(id: i64) -> Server {
    let uuid = Uuid::new_v4();
    let now = Utc::now();
    Server {
        id,
        uuid,
        uuid_short: uuid.to_string()[..8].to_string(),
        external_id: None,
        owner_id: 1,
        node_id: 1,
        name: format!("server-{}", id),
        description: String::new(),
        allocation_id: 1,
        nest_id: 1,
        egg_id: 1,
        startup: "java -jar {{SERVER_JARFILE}}".to_string(),
        image: "ghcr.io/games/java:21".to_string(),
        memory: 1024,
        swap: 0,
        disk: 4096,
        io: 500,
        cpu: 100,
        threads: None,
        oom_disabled: true,
        database_limit: None,
        allocation_limit: None,
        backup_limit: None,
        installed: InstallStatus::Installed,
        suspended: false,
        created_at: now,
        updated_at: now,
        relations: ServerRelations::default(),
    }
}

pub fn allocation(id: i64, node_id: i64, server_id: Option<i64>) -> Allocation {
    Allocation {
        id,
        node_id,
        ip: "10.0.0.1".to_string(),
        port: 25000 + id as i32,
        server_id,
    }
}

pub fn node(id: i64) -> Node {
    Node {
        id,
        name: format!("node-{}", id),
        scheme: "http".to_string(),
        ip: "127.0.0.1".to_string(),
        port: 8080,
        token: "node-secret".to_string(),
    }
}

pub fn egg(id: i64) -> Egg {
    Egg {
        id,
        uuid: Uuid::new_v4(),
        nest_id: 1,
        name: format!("egg-{}", id),
        docker_image: "ghcr.io/games/java:21".to_string(),
        startup: "java -jar {{SERVER_JARFILE}}".to_string(),
    }
}

pub fn daemon_error(status: StatusCode) -> DaemonConnectionError {
    DaemonConnectionError::new("node-1", true, DaemonFailure::Status(status))
}

#[derive(Default)]
pub struct Data {
    pub servers: BTreeMap<i64, Server>,
    pub nodes: BTreeMap<i64, Node>,
    pub nests: BTreeMap<i64, Nest>,
    pub eggs: BTreeMap<i64, Egg>,
    /// Egg id and the variable definition, without a server value.
    pub egg_variables: Vec<(i64, ServerVariable)>,
    pub server_values: BTreeMap<(i64, i64), String>,
    pub allocations: BTreeMap<i64, Allocation>,
    pub databases: BTreeMap<i64, Database>,
    pub mounts: BTreeMap<i64, Mount>,
    pub mount_links: BTreeSet<(i64, i64)>,
    pub next_id: i64,
}

impl Data {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// State-backed store for lifecycle and HTTP tests.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

impl MemoryStore {
    /// Two nodes, one egg with two variables, and server 1 on node 1 holding
    /// allocation 1. Allocations 2 and 3 are free on node 1, 4 is free on node 2.
    pub fn seeded() -> Arc<Self> {
        let store = Self::default();
        {
            let mut data = store.data();
            data.next_id = 100;
            data.nodes.insert(1, node(1));
            data.nodes.insert(2, node(2));
            data.nests.insert(
                1,
                Nest {
                    id: 1,
                    uuid: Uuid::new_v4(),
                    name: "Minecraft".to_string(),
                },
            );
            data.eggs.insert(1, egg(1));
            data.egg_variables.push((
                1,
                ServerVariable {
                    variable_id: 1,
                    name: "Server Jar File".to_string(),
                    env_variable: "SERVER_JARFILE".to_string(),
                    default_value: "server.jar".to_string(),
                    server_value: None,
                    user_editable: true,
                    required: true,
                },
            ));
            data.egg_variables.push((
                1,
                ServerVariable {
                    variable_id: 2,
                    name: "Message of the day".to_string(),
                    env_variable: "MOTD".to_string(),
                    default_value: String::new(),
                    server_value: None,
                    user_editable: true,
                    required: false,
                },
            ));
            data.allocations.insert(1, allocation(1, 1, Some(1)));
            data.allocations.insert(2, allocation(2, 1, None));
            data.allocations.insert(3, allocation(3, 1, None));
            data.allocations.insert(4, allocation(4, 2, None));
            data.servers.insert(1, server(1));
            data.mounts.insert(
                1,
                Mount {
                    id: 1,
                    name: "maps".to_string(),
                    source: "/srv/maps".to_string(),
                    target: "/home/container/maps".to_string(),
                    read_only: true,
                },
            );
        }
        Arc::new(store)
    }

    pub fn data(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn server(&self, id: i64) -> Option<Server> {
        self.data().servers.get(&id).cloned()
    }

    pub fn insert_server(&self, server: Server) {
        self.data().servers.insert(server.id, server);
    }

    pub fn allocation(&self, id: i64) -> Option<Allocation> {
        self.data().allocations.get(&id).cloned()
    }
}

fn write_server(data: &mut Data, server: &Server) -> PanelResult<()> {
    match data.servers.get_mut(&server.id) {
        Some(existing) => {
            let mut updated = server.clone();
            updated.relations = ServerRelations::default();
            updated.updated_at = Utc::now();
            *existing = updated;
            Ok(())
        }
        None => Err(PanelError::not_found("server", server.id)),
    }
}

#[async_trait]
impl ServerStore for MemoryStore {
    async fn find(&self, id: i64) -> PanelResult<Option<Server>> {
        Ok(self.server(id))
    }

    async fn find_by_identifier(&self, identifier: &str) -> PanelResult<Option<Server>> {
        Ok(self
            .data()
            .servers
            .values()
            .find(|s| s.uuid_short == identifier || s.uuid.to_string() == identifier)
            .cloned())
    }

    async fn insert(&self, server: &Server, allocations: &[i64]) -> PanelResult<i64> {
        let mut data = self.data();
        let free = allocations.iter().all(|id| {
            data.allocations
                .get(id)
                .is_some_and(|a| a.server_id.is_none())
        });
        if !free {
            return Err(PanelError::validation("allocation_id", "allocation already taken"));
        }
        let id = data.next_id();
        let mut record = server.clone();
        record.id = id;
        record.relations = ServerRelations::default();
        data.servers.insert(id, record);
        for allocation_id in allocations {
            if let Some(allocation) = data.allocations.get_mut(allocation_id) {
                allocation.server_id = Some(id);
            }
        }
        Ok(id)
    }

    async fn update(&self, server: &Server) -> PanelResult<()> {
        write_server(&mut self.data(), server)
    }

    async fn save_build(&self, server: &Server, add: &[i64], remove: &[i64]) -> PanelResult<()> {
        let mut data = self.data();
        let claimable = add.iter().all(|id| {
            data.allocations.get(id).is_some_and(|a| {
                a.node_id == server.node_id && a.server_id.is_none_or(|owner| owner == server.id)
            })
        });
        if !claimable {
            return Err(PanelError::validation("add_allocations", "allocation already taken"));
        }
        write_server(&mut data, server)?;
        for allocation in data.allocations.values_mut() {
            if allocation.server_id == Some(server.id) && remove.contains(&allocation.id) {
                allocation.server_id = None;
            }
            if add.contains(&allocation.id) {
                allocation.server_id = Some(server.id);
            }
        }
        Ok(())
    }

    async fn save_startup(&self, server: &Server, variables: &[(i64, String)]) -> PanelResult<()> {
        let mut data = self.data();
        write_server(&mut data, server)?;
        for (variable_id, value) in variables {
            data.server_values
                .insert((server.id, *variable_id), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> PanelResult<()> {
        let mut data = self.data();
        for allocation in data.allocations.values_mut() {
            if allocation.server_id == Some(id) {
                allocation.server_id = None;
            }
        }
        data.server_values.retain(|(server_id, _), _| *server_id != id);
        data.databases.retain(|_, d| d.server_id != id);
        data.mount_links.retain(|(server_id, _)| *server_id != id);
        data.servers.remove(&id);
        Ok(())
    }

    async fn fetch_relation(
        &self,
        server: &Server,
        relation: Relation,
    ) -> PanelResult<RelationData> {
        let data = self.data();
        let found = match relation {
            Relation::Allocation => data
                .allocations
                .get(&server.allocation_id)
                .cloned()
                .map(RelationData::Allocation),
            Relation::Allocations => Some(RelationData::Allocations(
                data.allocations
                    .values()
                    .filter(|a| a.server_id == Some(server.id))
                    .cloned()
                    .collect(),
            )),
            Relation::Egg => data.eggs.get(&server.egg_id).cloned().map(RelationData::Egg),
            Relation::Nest => data.nests.get(&server.nest_id).cloned().map(RelationData::Nest),
            Relation::Node => data.nodes.get(&server.node_id).cloned().map(RelationData::Node),
            Relation::Variables => Some(RelationData::Variables(
                data.egg_variables
                    .iter()
                    .filter(|(egg_id, _)| *egg_id == server.egg_id)
                    .map(|(_, variable)| {
                        let mut variable = variable.clone();
                        variable.server_value = data
                            .server_values
                            .get(&(server.id, variable.variable_id))
                            .cloned();
                        variable
                    })
                    .collect(),
            )),
            Relation::Databases => Some(RelationData::Databases(
                data.databases
                    .values()
                    .filter(|d| d.server_id == server.id)
                    .cloned()
                    .collect(),
            )),
            Relation::Mounts => Some(RelationData::Mounts(
                data.mount_links
                    .iter()
                    .filter(|(server_id, _)| *server_id == server.id)
                    .filter_map(|(_, mount_id)| data.mounts.get(mount_id).cloned())
                    .collect(),
            )),
        };

        found.ok_or_else(|| PanelError::not_found("relation", format!("{:?}", relation)))
    }

    async fn find_allocations(&self, ids: &[i64]) -> PanelResult<Vec<Allocation>> {
        let data = self.data();
        Ok(ids
            .iter()
            .filter_map(|id| data.allocations.get(id).cloned())
            .collect())
    }

    async fn find_egg(&self, id: i64) -> PanelResult<Option<Egg>> {
        Ok(self.data().eggs.get(&id).cloned())
    }

    async fn find_node(&self, id: i64) -> PanelResult<Option<Node>> {
        Ok(self.data().nodes.get(&id).cloned())
    }

    async fn external_id_in_use(
        &self,
        external_id: &str,
        except: Option<i64>,
    ) -> PanelResult<bool> {
        Ok(self.data().servers.values().any(|s| {
            s.external_id.as_deref() == Some(external_id) && Some(s.id) != except
        }))
    }

    async fn is_unique_uuid_combo(&self, uuid: Uuid, short: &str) -> PanelResult<bool> {
        Ok(!self
            .data()
            .servers
            .values()
            .any(|s| s.uuid == uuid || s.uuid_short == short))
    }

    async fn count_suspended(&self) -> PanelResult<i64> {
        Ok(self.data().servers.values().filter(|s| s.suspended).count() as i64)
    }

    async fn for_power_action(&self, scope: &PowerActionScope) -> PanelResult<Vec<Server>> {
        Ok(self
            .data()
            .servers
            .values()
            .filter(|s| scope.matches(s))
            .cloned()
            .collect())
    }

    async fn count_for_power_action(&self, scope: &PowerActionScope) -> PanelResult<i64> {
        Ok(self.for_power_action(scope).await?.len() as i64)
    }

    async fn for_node(&self, node_id: i64, limit: i64, offset: i64) -> PanelResult<Vec<Server>> {
        Ok(self
            .data()
            .servers
            .values()
            .filter(|s| s.node_id == node_id)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DatabaseStore for MemoryStore {
    async fn find_database(&self, server_id: i64, id: i64) -> PanelResult<Option<Database>> {
        Ok(self
            .data()
            .databases
            .get(&id)
            .filter(|d| d.server_id == server_id)
            .cloned())
    }

    async fn database_name_taken(&self, host_id: i64, name: &str) -> PanelResult<bool> {
        Ok(self
            .data()
            .databases
            .values()
            .any(|d| d.database_host_id == host_id && d.database == name))
    }

    async fn insert_database(&self, database: &Database) -> PanelResult<i64> {
        let mut data = self.data();
        let id = data.next_id();
        let mut record = database.clone();
        record.id = id;
        data.databases.insert(id, record);
        Ok(id)
    }

    async fn update_database_password(&self, id: i64, password: &str) -> PanelResult<()> {
        if let Some(database) = self.data().databases.get_mut(&id) {
            database.password = password.to_string();
        }
        Ok(())
    }

    async fn delete_database(&self, id: i64) -> PanelResult<()> {
        self.data().databases.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl MountStore for MemoryStore {
    async fn find_mount(&self, id: i64) -> PanelResult<Option<Mount>> {
        Ok(self.data().mounts.get(&id).cloned())
    }

    async fn attach_mount(&self, server_id: i64, mount_id: i64) -> PanelResult<()> {
        self.data().mount_links.insert((server_id, mount_id));
        Ok(())
    }

    async fn detach_mount(&self, server_id: i64, mount_id: i64) -> PanelResult<bool> {
        Ok(self.data().mount_links.remove(&(server_id, mount_id)))
    }
}

pub fn lifecycle<D>(store: &Arc<MemoryStore>, daemon: D) -> LifecycleService
where
    D: DaemonClient + 'static,
{
    LifecycleService::new(ServerRepository::new(store.clone()), Arc::new(daemon))
}

pub fn app_state<D>(store: &Arc<MemoryStore>, daemon: D) -> AppState
where
    D: DaemonClient + 'static,
{
    let encrypter = Encrypter::from_base64_key(ENCRYPTION_KEY).unwrap();
    AppState::new(store.clone(), Arc::new(daemon), encrypter, API_KEY)
}
