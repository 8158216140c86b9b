use super::{LifecycleAction, LifecycleOutcome, LifecycleService, check_length};
use crate::error::{PanelResult, ValidationErrors};
use crate::models::{Relation, ServerVariable};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StartupUpdate {
    pub startup: String,
    pub image: String,
    #[serde(default)]
    pub egg_id: Option<i64>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Maps submitted environment values onto egg variables. Unknown keys and
/// required variables left empty are reported on `environment.<KEY>`.
pub(crate) fn resolve_environment(
    variables: &[ServerVariable],
    environment: &BTreeMap<String, String>,
    errors: &mut ValidationErrors,
) -> Vec<(i64, String)> {
    for key in environment.keys() {
        if !variables.iter().any(|v| &v.env_variable == key) {
            errors.add(
                format!("environment.{}", key),
                "is not a variable of the selected egg",
            );
        }
    }

    let mut values = Vec::new();
    for variable in variables {
        let submitted = environment.get(&variable.env_variable);
        let effective = submitted
            .map(String::as_str)
            .unwrap_or_else(|| variable.effective_value());

        if variable.required && effective.trim().is_empty() {
            errors.add(
                format!("environment.{}", variable.env_variable),
                "is required",
            );
        }
        if let Some(value) = submitted {
            values.push((variable.variable_id, value.clone()));
        }
    }
    values
}

impl LifecycleService {
    /// Saves the startup command, image, egg and variable values. The daemon
    /// picks these up on the next boot, so it is not contacted.
    pub async fn save_startup(&self, id: i64, update: StartupUpdate) -> PanelResult<LifecycleOutcome> {
        let store = self.repository.store();
        let mut server = self.repository.find(id).await?;
        let mut errors = ValidationErrors::new();

        if update.startup.trim().is_empty() {
            errors.add("startup", "must not be empty");
        }
        check_length(&mut errors, "image", update.image.trim());

        if let Some(egg_id) = update.egg_id.filter(|e| *e != server.egg_id) {
            match store.find_egg(egg_id).await? {
                Some(egg) => {
                    server.egg_id = egg.id;
                    server.nest_id = egg.nest_id;
                }
                None => errors.add("egg_id", format!("egg {} does not exist", egg_id)),
            }
        }

        self.repository
            .load(&mut server, &[Relation::Egg, Relation::Variables], true)
            .await?;
        let variables = server.relations.variables.clone().unwrap_or_default();
        let values = resolve_environment(&variables, &update.environment, &mut errors);

        errors.into_result()?;

        server.startup = update.startup;
        server.image = update.image.trim().to_string();
        store.save_startup(&server, &values).await?;
        tracing::info!(server_id = id, egg_id = server.egg_id, variables = values.len(), "startup configuration saved");

        Ok(LifecycleOutcome::new(id, LifecycleAction::StartupUpdated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(id: i64, key: &str, default: &str, required: bool) -> ServerVariable {
        ServerVariable {
            variable_id: id,
            name: key.to_lowercase(),
            env_variable: key.to_string(),
            default_value: default.to_string(),
            server_value: None,
            user_editable: true,
            required,
        }
    }

    #[test]
    fn unknown_keys_and_empty_required_values_are_rejected() {
        let variables = vec![
            variable(1, "SERVER_JARFILE", "server.jar", true),
            variable(2, "MOTD", "", false),
        ];
        let environment = BTreeMap::from([
            ("SERVER_JARFILE".to_string(), " ".to_string()),
            ("UNKNOWN".to_string(), "x".to_string()),
        ]);

        let mut errors = ValidationErrors::new();
        resolve_environment(&variables, &environment, &mut errors);

        assert!(errors.has("environment.UNKNOWN"));
        assert!(errors.has("environment.SERVER_JARFILE"));
        assert!(!errors.has("environment.MOTD"));
    }

    #[test]
    fn only_submitted_values_are_written() {
        let variables = vec![
            variable(1, "SERVER_JARFILE", "server.jar", true),
            variable(2, "MOTD", "", false),
        ];
        let environment = BTreeMap::from([("MOTD".to_string(), "hello".to_string())]);

        let mut errors = ValidationErrors::new();
        let values = resolve_environment(&variables, &environment, &mut errors);

        assert!(errors.is_empty());
        assert_eq!(values, vec![(2, "hello".to_string())]);
    }
}
