use crate::crypto::{Encrypter, random_string};
use crate::error::{PanelError, PanelResult, ValidationErrors};
use crate::models::Database;
use crate::repository::{DatabaseStore, ServerRepository};
use serde::Deserialize;
use std::sync::Arc;

const PASSWORD_LENGTH: usize = 24;

fn default_remote() -> String {
    "%".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewDatabase {
    pub database: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    pub database_host_id: i64,
    #[serde(default)]
    pub max_connections: Option<i32>,
}

fn valid_name(name: &str) -> bool {
    (1..=48).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn valid_remote(remote: &str) -> bool {
    (1..=15).contains(&remote.len())
        && remote
            .chars()
            .all(|c| c.is_ascii_digit() || c == '%' || c == '.')
}

/// Database records owned by a server. Passwords are stored encrypted.
#[derive(Clone)]
pub struct DatabaseService {
    repository: ServerRepository,
    store: Arc<dyn DatabaseStore>,
    encrypter: Encrypter,
}

impl DatabaseService {
    pub fn new(
        repository: ServerRepository,
        store: Arc<dyn DatabaseStore>,
        encrypter: Encrypter,
    ) -> Self {
        Self {
            repository,
            store,
            encrypter,
        }
    }

    pub async fn create(&self, server_id: i64, request: NewDatabase) -> PanelResult<Database> {
        let mut server = self.repository.find(server_id).await?;
        self.repository
            .load_database_relations(&mut server, true)
            .await?;

        let mut errors = ValidationErrors::new();
        let name = request.database.trim();
        if !valid_name(name) {
            errors.add(
                "database",
                "must be 1 to 48 letters, digits, dashes or underscores",
            );
        }
        if !valid_remote(&request.remote) {
            errors.add("remote", "must be an IP address or wildcard pattern");
        }
        if request.database_host_id <= 0 {
            errors.add("database_host_id", "must reference a database host");
        }
        if matches!(request.max_connections, Some(max) if max < 0) {
            errors.add("max_connections", "must be at least 0");
        }

        let existing = server.relations.databases.as_ref().map_or(0, Vec::len);
        if let Some(limit) = server.database_limit {
            if existing as i64 >= limit {
                errors.add("database", "server has reached its database limit");
            }
        }

        let database = format!("s{}_{}", server_id, name);
        if errors.is_empty()
            && self
                .store
                .database_name_taken(request.database_host_id, &database)
                .await?
        {
            errors.add("database", "a database with this name already exists on the host");
        }
        errors.into_result()?;

        let password = self
            .encrypter
            .encrypt(&random_string(PASSWORD_LENGTH))
            .map_err(|e| PanelError::Internal(e.to_string()))?;

        let mut record = Database {
            id: 0,
            server_id,
            database_host_id: request.database_host_id,
            database,
            username: format!("u{}_{}", server_id, random_string(10)),
            remote: request.remote,
            password,
            max_connections: request.max_connections,
        };
        record.id = self.store.insert_database(&record).await?;
        tracing::info!(server_id, database_id = record.id, database = %record.database, "database created");

        Ok(record)
    }

    async fn owned(&self, server_id: i64, database_id: i64) -> PanelResult<Database> {
        self.store
            .find_database(server_id, database_id)
            .await?
            .ok_or_else(|| PanelError::not_found("database", database_id))
    }

    pub async fn reset_password(&self, server_id: i64, database_id: i64) -> PanelResult<()> {
        let database = self.owned(server_id, database_id).await?;
        let password = self
            .encrypter
            .encrypt(&random_string(PASSWORD_LENGTH))
            .map_err(|e| PanelError::Internal(e.to_string()))?;

        self.store
            .update_database_password(database.id, &password)
            .await?;
        tracing::info!(server_id, database_id, "database password rotated");
        Ok(())
    }

    /// Plaintext password of a database, for display to its owner.
    pub async fn password(&self, server_id: i64, database_id: i64) -> PanelResult<String> {
        let database = self.owned(server_id, database_id).await?;
        self.encrypter
            .decrypt(&database.password)
            .map_err(|e| PanelError::Internal(e.to_string()))
    }

    pub async fn delete(&self, server_id: i64, database_id: i64) -> PanelResult<()> {
        let database = self.owned(server_id, database_id).await?;
        self.store.delete_database(database.id).await?;
        tracing::info!(server_id, database_id, "database deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_remotes_follow_the_allowed_alphabet() {
        assert!(valid_name("world_data-1"));
        assert!(!valid_name(""));
        assert!(!valid_name("drop table"));
        assert!(!valid_name(&"a".repeat(49)));

        assert!(valid_remote("%"));
        assert!(valid_remote("192.168.%"));
        assert!(!valid_remote("example.com"));
    }
}
