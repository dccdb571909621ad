use crate::controller::SessionState;
use crate::status_store::StatusSnapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Exported view of the tracking status, written for dashboards and the JNI host
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LiveStatus {
    pub timestamp: String,
    pub session_state: SessionState,
    pub tracking_enabled: bool,
    pub current_activity: Option<String>,
    pub label: String,
    pub update_count: u64,
    pub in_vehicle: bool,
}

impl LiveStatus {
    pub fn new(snapshot: &StatusSnapshot, session_state: SessionState) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            session_state,
            tracking_enabled: snapshot.tracking_enabled,
            current_activity: snapshot.current_activity.map(|a| format!("{:?}", a)),
            label: snapshot.label().to_string(),
            update_count: snapshot.update_count,
            in_vehicle: snapshot.is_in_vehicle(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
