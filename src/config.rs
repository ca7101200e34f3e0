use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SPREADSHEET_NAME: &str = "Training_Platform_DB";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Google,
    Memory,
}

/// Service account credentials, read from the JSON key Google issues.
#[derive(Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: SecretString,
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

// Plain strings on the wire; the key moves into a SecretString right after parsing.
#[derive(Deserialize)]
struct RawServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, String> {
        let raw: RawServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| format!("service account JSON is invalid: {}", e))?;
        if raw.client_email.trim().is_empty() || raw.private_key.trim().is_empty() {
            return Err("service account JSON lacks client_email or private_key".to_string());
        }
        Ok(Self {
            client_email: raw.client_email,
            private_key: SecretString::from(raw.private_key),
            token_uri: raw
                .token_uri
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub spreadsheet_name: String,
    pub spreadsheet_id: Option<String>,
    pub service_account: Option<ServiceAccountKey>,
    pub sheets_timeout: Duration,
    pub max_upload_bytes: usize,
    pub template_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Ok(Self::from_lookup(|key| vars.get(key).cloned())?)
    }

    /// Builds the config from any key lookup. Missing credentials are fatal
    /// for the google backend.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("SHEETS_BACKEND")
            .unwrap_or_else(|| "google".to_string())
            .to_lowercase()
            .as_str()
        {
            "google" => Backend::Google,
            "memory" => Backend::Memory,
            other => return Err(format!("SHEETS_BACKEND must be 'google' or 'memory', got '{}'", other)),
        };

        let service_account = match (lookup("GCP_SERVICE_ACCOUNT"), lookup("GCP_SERVICE_ACCOUNT_FILE")) {
            (Some(json), _) if !json.trim().is_empty() => Some(ServiceAccountKey::from_json(&json)?),
            (_, Some(path)) if !path.trim().is_empty() => {
                let json = std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read GCP_SERVICE_ACCOUNT_FILE {}: {}", path, e))?;
                Some(ServiceAccountKey::from_json(&json)?)
            }
            _ => None,
        };

        if backend == Backend::Google && service_account.is_none() {
            return Err(
                "GCP_SERVICE_ACCOUNT or GCP_SERVICE_ACCOUNT_FILE must be set for the google backend"
                    .to_string(),
            );
        }

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8501);
        let sheets_timeout = Duration::from_secs(
            lookup("SHEETS_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        );
        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(25 * 1024 * 1024);

        Ok(Self {
            host,
            port,
            backend,
            spreadsheet_name: lookup("SPREADSHEET_NAME")
                .unwrap_or_else(|| DEFAULT_SPREADSHEET_NAME.to_string()),
            spreadsheet_id: lookup("SPREADSHEET_ID").filter(|s| !s.trim().is_empty()),
            service_account,
            sheets_timeout,
            max_upload_bytes,
            template_dir: PathBuf::from(lookup("TEMPLATE_DIR").unwrap_or_else(|| "templates".to_string())),
        })
    }

    /// Config for local runs and tests against the in-memory store.
    pub fn memory() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            backend: Backend::Memory,
            spreadsheet_name: DEFAULT_SPREADSHEET_NAME.to_string(),
            spreadsheet_id: None,
            service_account: None,
            sheets_timeout: Duration::from_secs(30),
            max_upload_bytes: 25 * 1024 * 1024,
            template_dir: PathBuf::from("templates"),
        }
    }
}
