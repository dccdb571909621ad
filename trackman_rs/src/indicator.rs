use crate::activity::ActivityCategory;
use crate::config::IndicatorConfig;
use crate::status_store::PLACEHOLDER_LABEL;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Content of the single-slot persistent indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorContent {
    pub title: String,
    pub text: String,
}

impl IndicatorContent {
    pub fn for_activity(config: &IndicatorConfig, activity: Option<ActivityCategory>) -> Self {
        Self {
            title: config.title.clone(),
            text: activity
                .map(|a| a.label().to_string())
                .unwrap_or_else(|| PLACEHOLDER_LABEL.to_string()),
        }
    }
}

/// Persistent user-visible status indicator (foreground notification)
pub trait StatusIndicator: Send + Sync {
    fn show(&self, content: &IndicatorContent);

    fn update(&self, content: &IndicatorContent);

    fn clear(&self);
}

pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn show(&self, content: &IndicatorContent) {
        info!(target: "indicator", "[{}] {}", content.title, content.text);
    }

    fn update(&self, content: &IndicatorContent) {
        info!(target: "indicator", "[{}] {}", content.title, content.text);
    }

    fn clear(&self) {
        info!(target: "indicator", "cleared");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorOp {
    Show(IndicatorContent),
    Update(IndicatorContent),
    Clear,
}

/// Indicator that remembers every operation and the currently visible content
#[derive(Default)]
pub struct RecordingIndicator {
    ops: Mutex<Vec<IndicatorOp>>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<IndicatorOp> {
        self.ops.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// What the user would see right now, `None` when cleared
    pub fn visible(&self) -> Option<IndicatorContent> {
        let mut visible = None;
        for op in self.ops() {
            visible = match op {
                IndicatorOp::Show(c) | IndicatorOp::Update(c) => Some(c),
                IndicatorOp::Clear => None,
            };
        }
        visible
    }

    fn push(&self, op: IndicatorOp) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op);
        }
    }
}

impl StatusIndicator for RecordingIndicator {
    fn show(&self, content: &IndicatorContent) {
        self.push(IndicatorOp::Show(content.clone()));
    }

    fn update(&self, content: &IndicatorContent) {
        self.push(IndicatorOp::Update(content.clone()));
    }

    fn clear(&self) {
        self.push(IndicatorOp::Clear);
    }
}
