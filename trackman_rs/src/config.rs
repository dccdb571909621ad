use crate::error::ConfigError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Known OpenTracks package variants
pub mod open_tracks_packages {
    pub const FDROID: &str = "de.dennisguse.opentracks";
    pub const PLAY_STORE: &str = "de.dennisguse.opentracks.playStore";
    pub const DEBUG: &str = "de.dennisguse.opentracks.debug";
    pub const NIGHTLY: &str = "de.dennisguse.opentracks.nightly";

    pub const ALL: [&str; 4] = [FDROID, PLAY_STORE, DEBUG, NIGHTLY];

    pub fn is_known(package: &str) -> bool {
        ALL.contains(&package)
    }
}

pub const GEO_TRACKER_PACKAGE: &str = "com.ilyabogdanovich.geotracker";

pub const DEFAULT_TRACK_CATEGORY: &str = "In Vehicle Detection";

/// Start extras sent to OpenTracks; unset fields are omitted from the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub icon: Option<String>,
}

impl Default for TrackMetadata {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            category: Some(DEFAULT_TRACK_CATEGORY.to_string()),
            icon: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenTracksConfig {
    pub package: String,
    pub start_metadata: TrackMetadata,
}

impl Default for OpenTracksConfig {
    fn default() -> Self {
        Self {
            package: open_tracks_packages::FDROID.to_string(),
            start_metadata: TrackMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoTrackerConfig {
    pub package: String,
}

impl Default for GeoTrackerConfig {
    fn default() -> Self {
        Self {
            package: GEO_TRACKER_PACKAGE.to_string(),
        }
    }
}

/// Persistent indicator (foreground notification) settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub channel_id: String,
    pub channel_name: String,
    pub channel_description: String,
    pub notification_id: i32,
    pub title: String,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            channel_id: "ActivityTrackingChannel".to_string(),
            channel_name: "Activity Tracking".to_string(),
            channel_description: "Notifications showing current detected activity".to_string(),
            notification_id: 2,
            title: "Activity Tracking".to_string(),
        }
    }
}

/// Top level configuration, every field has a default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrackmanConfig {
    pub open_tracks: OpenTracksConfig,
    pub geo_tracker: GeoTrackerConfig,
    pub indicator: IndicatorConfig,
}

impl TrackmanConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        if !open_tracks_packages::is_known(&config.open_tracks.package) {
            warn!(
                target: "config",
                "{} is not a known OpenTracks build, requests may go unanswered",
                config.open_tracks.package
            );
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
