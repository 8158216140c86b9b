use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Installation state of a server as reported back by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    #[default]
    Installing = 0,
    Installed = 1,
    Failed = 2,
}

impl InstallStatus {
    pub fn code(self) -> i16 {
        self as i16
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub scheme: String,
    pub ip: String,
    pub port: i32,
    #[serde(skip_serializing)]
    pub token: String,
}

impl Node {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.ip, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Allocation {
    pub id: i64,
    pub node_id: i64,
    pub ip: String,
    pub port: i32,
    pub server_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Nest {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Egg {
    pub id: i64,
    pub uuid: Uuid,
    pub nest_id: i64,
    pub name: String,
    pub docker_image: String,
    pub startup: String,
}

/// An egg variable joined with the value a server has set for it, if any.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ServerVariable {
    pub variable_id: i64,
    pub name: String,
    pub env_variable: String,
    pub default_value: String,
    pub server_value: Option<String>,
    pub user_editable: bool,
    pub required: bool,
}

impl ServerVariable {
    pub fn effective_value(&self) -> &str {
        self.server_value.as_deref().unwrap_or(&self.default_value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Database {
    pub id: i64,
    pub server_id: i64,
    pub database_host_id: i64,
    pub database: String,
    pub username: String,
    pub remote: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub max_connections: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Mount {
    pub id: i64,
    pub name: String,
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Relations that can be loaded onto an in-memory [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Allocation,
    Allocations,
    Egg,
    Nest,
    Node,
    Variables,
    Databases,
    Mounts,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationData {
    Allocation(Allocation),
    Allocations(Vec<Allocation>),
    Egg(Egg),
    Nest(Nest),
    Node(Node),
    Variables(Vec<ServerVariable>),
    Databases(Vec<Database>),
    Mounts(Vec<Mount>),
}

/// Relations currently held by a server instance. `None` means "not loaded",
/// which is different from loaded-but-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerRelations {
    pub allocation: Option<Allocation>,
    pub allocations: Option<Vec<Allocation>>,
    pub egg: Option<Egg>,
    pub nest: Option<Nest>,
    pub node: Option<Node>,
    pub variables: Option<Vec<ServerVariable>>,
    pub databases: Option<Vec<Database>>,
    pub mounts: Option<Vec<Mount>>,
}

impl ServerRelations {
    pub fn is_loaded(&self, relation: Relation) -> bool {
        match relation {
            Relation::Allocation => self.allocation.is_some(),
            Relation::Allocations => self.allocations.is_some(),
            Relation::Egg => self.egg.is_some(),
            Relation::Nest => self.nest.is_some(),
            Relation::Node => self.node.is_some(),
            Relation::Variables => self.variables.is_some(),
            Relation::Databases => self.databases.is_some(),
            Relation::Mounts => self.mounts.is_some(),
        }
    }

    pub fn set(&mut self, data: RelationData) {
        match data {
            RelationData::Allocation(a) => self.allocation = Some(a),
            RelationData::Allocations(a) => self.allocations = Some(a),
            RelationData::Egg(e) => self.egg = Some(e),
            RelationData::Nest(n) => self.nest = Some(n),
            RelationData::Node(n) => self.node = Some(n),
            RelationData::Variables(v) => self.variables = Some(v),
            RelationData::Databases(d) => self.databases = Some(d),
            RelationData::Mounts(m) => self.mounts = Some(m),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Server {
    pub id: i64,
    pub uuid: Uuid,
    pub uuid_short: String,
    pub external_id: Option<String>,
    pub owner_id: i64,
    pub node_id: i64,
    pub name: String,
    pub description: String,
    pub allocation_id: i64,
    pub nest_id: i64,
    pub egg_id: i64,
    pub startup: String,
    pub image: String,
    pub memory: i64,
    pub swap: i64,
    pub disk: i64,
    pub io: i64,
    pub cpu: i64,
    pub threads: Option<String>,
    pub oom_disabled: bool,
    pub database_limit: Option<i64>,
    pub allocation_limit: Option<i64>,
    pub backup_limit: Option<i64>,
    pub installed: InstallStatus,
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip)]
    pub relations: ServerRelations,
}

impl Server {
    /// Ports grouped by IP, only for allocations living on the server's node.
    pub fn allocation_mappings(&self) -> BTreeMap<String, Vec<i32>> {
        let mut mappings: BTreeMap<String, Vec<i32>> = BTreeMap::new();
        for allocation in self.relations.allocations.iter().flatten() {
            if allocation.node_id != self.node_id {
                continue;
            }
            mappings
                .entry(allocation.ip.clone())
                .or_default()
                .push(allocation.port);
        }
        for ports in mappings.values_mut() {
            ports.sort_unstable();
        }
        mappings
    }

    /// Build section pushed to the daemon after a build modification.
    pub fn build_payload(&self) -> Value {
        let default = self
            .relations
            .allocation
            .as_ref()
            .map(|a| json!({ "ip": a.ip, "port": a.port }))
            .unwrap_or(Value::Null);

        json!({
            "build": {
                "memory_limit": self.memory,
                "swap": self.swap,
                "io_weight": self.io,
                "cpu_limit": self.cpu,
                "threads": self.threads,
                "disk_space": self.disk,
                "oom_disabled": self.oom_disabled,
            },
            "allocations": {
                "default": default,
                "mappings": self.allocation_mappings(),
            },
        })
    }
}
