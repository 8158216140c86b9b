use super::{LifecycleAction, LifecycleOutcome, LifecycleService, check_length};
use crate::error::{PanelResult, ValidationErrors};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetailsUpdate {
    pub owner_id: i64,
    #[serde(default)]
    pub external_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Token id the panel issues for a user's websocket session on a server.
pub fn owner_jti(owner_id: i64, uuid: &Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}{}", owner_id, uuid).as_bytes());
    hex::encode(hasher.finalize())
}

impl LifecycleService {
    /// Updates owner, name, description and external id. Changing the owner
    /// revokes the previous owner's websocket token; a failure there is a warning.
    pub async fn set_details(&self, id: i64, update: DetailsUpdate) -> PanelResult<LifecycleOutcome> {
        let store = self.repository.store();
        let mut server = self.repository.find(id).await?;
        let mut errors = ValidationErrors::new();

        check_length(&mut errors, "name", update.name.trim());
        if update.owner_id <= 0 {
            errors.add("owner_id", "must reference a user");
        }

        let external_id = update
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        if let Some(external_id) = &external_id {
            check_length(&mut errors, "external_id", external_id);
            if store.external_id_in_use(external_id, Some(id)).await? {
                errors.add("external_id", "is already in use by another server");
            }
        }

        errors.into_result()?;

        let previous_owner = server.owner_id;
        server.owner_id = update.owner_id;
        server.external_id = external_id;
        server.name = update.name.trim().to_string();
        server.description = update.description;
        store.update(&server).await?;
        tracing::info!(server_id = id, "server details updated");

        let mut outcome = LifecycleOutcome::new(id, LifecycleAction::DetailsUpdated);
        if previous_owner == server.owner_id {
            return Ok(outcome);
        }

        let jti = owner_jti(previous_owner, &server.uuid);
        let revoked = match self.target(&mut server).await {
            Ok(target) => self
                .daemon
                .revoke_tokens(&target, &[jti])
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match revoked {
            Ok(()) => outcome = outcome.notified(),
            Err(e) => {
                tracing::warn!(server_id = id, previous_owner, error = %e, "could not revoke previous owner's websocket token");
                outcome.warn(format!("previous owner's websocket token was not revoked: {}", e));
            }
        }

        Ok(outcome)
    }

    /// Renames a server looked up by uuid or short uuid.
    pub async fn rename(&self, identifier: &str, name: &str) -> PanelResult<LifecycleOutcome> {
        let mut server = self.repository.get_by_uuid(identifier).await?;

        let mut errors = ValidationErrors::new();
        check_length(&mut errors, "name", name.trim());
        errors.into_result()?;

        server.name = name.trim().to_string();
        self.repository.store().update(&server).await?;
        tracing::info!(server_id = server.id, "server renamed");

        Ok(LifecycleOutcome::new(server.id, LifecycleAction::Renamed))
    }
}
