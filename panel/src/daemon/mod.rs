//! Typed access to the daemon running on each node.
//!
//! Every call names the server it acts on through a [`DaemonTarget`]; the
//! client itself carries no per-server state and can be shared freely.

mod client;
mod error;

pub use client::HttpDaemonClient;
pub use error::{DaemonConnectionError, DaemonFailure};

use crate::models::{Node, Server};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The server a daemon request is about, and how to reach its node.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonTarget {
    pub uuid: Uuid,
    pub node_name: String,
    pub base_url: String,
    pub token: String,
}

impl DaemonTarget {
    pub fn new(server: &Server, node: &Node) -> Self {
        Self {
            uuid: server.uuid,
            node_name: node.name.clone(),
            base_url: node.base_url(),
            token: node.token.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkUsage {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub memory_limit_bytes: u64,
    pub cpu_absolute: f64,
    pub disk_bytes: u64,
    pub network: NetworkUsage,
    pub uptime: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerDetails {
    pub state: String,
    pub is_suspended: bool,
    pub utilization: ResourceUsage,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DaemonClient: Send + Sync {
    async fn get_details(&self, target: &DaemonTarget)
    -> Result<ServerDetails, DaemonConnectionError>;

    async fn create(&self, target: &DaemonTarget, payload: &Value)
    -> Result<(), DaemonConnectionError>;

    async fn update(&self, target: &DaemonTarget, payload: &Value)
    -> Result<(), DaemonConnectionError>;

    async fn delete(&self, target: &DaemonTarget) -> Result<(), DaemonConnectionError>;

    async fn reinstall(&self, target: &DaemonTarget) -> Result<(), DaemonConnectionError>;

    /// Suspends the server, or lifts the suspension when `unsuspend` is set.
    async fn suspend(&self, target: &DaemonTarget, unsuspend: bool)
    -> Result<(), DaemonConnectionError>;

    /// The daemon reports completion of the archive out of band.
    async fn request_archive(&self, target: &DaemonTarget) -> Result<(), DaemonConnectionError>;

    async fn revoke_tokens(&self, target: &DaemonTarget, jtis: &[String])
    -> Result<(), DaemonConnectionError>;
}
