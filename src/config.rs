//! Client configuration from the environment

use crate::state_machine::SessionContext;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATIENT_NAME: &str = "Patient";
const DEFAULT_DESTINATION: &str = "your clinician";

/// Settings for the triage client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the triage backend
    pub api_url: String,
    /// Sent as `x-api-key` when set
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    /// SQLite file holding the transcript cache
    pub db_path: PathBuf,
    /// Where downloaded reports are written
    pub report_dir: PathBuf,
    /// Program invoked with a saved report's path to share it
    pub share_command: Option<String>,
    pub patient_name: String,
    /// Who receives the finalized report, as shown to the patient
    pub delivery_destination: String,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
        let data_dir = PathBuf::from(home).join(".triage-client");

        let request_timeout = var("TRIAGE_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);

        Self {
            api_url: var("TRIAGE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: var("TRIAGE_API_KEY"),
            request_timeout,
            db_path: var("TRIAGE_DB_PATH").map_or_else(|| data_dir.join("cache.db"), PathBuf::from),
            report_dir: var("TRIAGE_REPORT_DIR")
                .map_or_else(|| data_dir.join("reports"), PathBuf::from),
            share_command: var("TRIAGE_SHARE_COMMAND"),
            patient_name: var("TRIAGE_PATIENT_NAME")
                .unwrap_or_else(|| DEFAULT_PATIENT_NAME.to_string()),
            delivery_destination: var("TRIAGE_DELIVERY_DESTINATION")
                .unwrap_or_else(|| DEFAULT_DESTINATION.to_string()),
        }
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext::new(&self.patient_name, &self.delivery_destination)
    }
}
