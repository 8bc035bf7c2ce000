//! Runtime secret resolution.
//!
//! Config stores env var NAMES (`target.database_url_env`,
//! `reconcile.api_token_env`). Binaries call [`resolve_secrets`] once at
//! startup and pass the values into constructors. Errors name the variable,
//! never the value, and `Debug` redacts.

use anyhow::{bail, Result};

use crate::settings::BridgeSettings;

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Postgres connection URL. Always present once resolved.
    pub database_url: String,
    /// Bearer token for the upstream `find` endpoint.
    pub find_api_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url", &"<REDACTED>")
            .field("find_api_token", &self.find_api_token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

/// Unset and blank are treated the same.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

pub fn resolve_secrets(settings: &BridgeSettings) -> Result<ResolvedSecrets> {
    let db_var = &settings.target.database_url_env;
    let Some(database_url) = resolve_env(db_var) else {
        bail!("SECRETS_MISSING: required env var '{db_var}' (database url) is not set or empty");
    };

    Ok(ResolvedSecrets {
        database_url,
        find_api_token: resolve_find_token(settings)?,
    })
}

/// Bearer token only; for callers that never touch the database.
pub fn resolve_find_token(settings: &BridgeSettings) -> Result<Option<String>> {
    match &settings.reconcile.api_token_env {
        Some(var) => match resolve_env(var) {
            Some(v) => Ok(Some(v)),
            // a configured but absent token is a deployment mistake
            None => bail!("SECRETS_MISSING: env var '{var}' (find api token) is configured but not set"),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(db_env: &str, token_env: Option<&str>) -> BridgeSettings {
        let mut cfg = json!({
            "target": {"database_url_env": db_env},
            "reconcile": {"endpoint": "http://x"}
        });
        if let Some(t) = token_env {
            cfg["reconcile"]["api_token_env"] = json!(t);
        }
        BridgeSettings::from_config_json(&cfg).unwrap()
    }

    #[test]
    fn missing_database_url_names_the_variable() {
        let err = resolve_secrets(&settings("BRIDGE_TEST_SECRETS_DB_UNSET_1", None)).unwrap_err();
        assert!(err.to_string().contains("BRIDGE_TEST_SECRETS_DB_UNSET_1"));
    }

    #[test]
    fn debug_redacts_values() {
        std::env::set_var("BRIDGE_TEST_SECRETS_DB_2", "postgres://user:hunter2@db/bridge");
        std::env::set_var("BRIDGE_TEST_SECRETS_TOKEN_2", "tok-very-secret");
        let s = resolve_secrets(&settings(
            "BRIDGE_TEST_SECRETS_DB_2",
            Some("BRIDGE_TEST_SECRETS_TOKEN_2"),
        ))
        .unwrap();
        assert_eq!(s.find_api_token.as_deref(), Some("tok-very-secret"));

        let dbg = format!("{s:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("tok-very-secret"));
        assert!(dbg.contains("<REDACTED>"));
    }

    #[test]
    fn configured_but_unset_token_is_an_error() {
        std::env::set_var("BRIDGE_TEST_SECRETS_DB_3", "postgres://db/bridge");
        let err = resolve_secrets(&settings(
            "BRIDGE_TEST_SECRETS_DB_3",
            Some("BRIDGE_TEST_SECRETS_TOKEN_UNSET_3"),
        ))
        .unwrap_err();
        assert!(err.to_string().contains("BRIDGE_TEST_SECRETS_TOKEN_UNSET_3"));
    }
}
