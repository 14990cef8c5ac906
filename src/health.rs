use serde::Serialize;

use crate::model::{Status, Timestamp};

/// Per-component detail line in a `HealthReport` (§4.11, §7 "the engine
/// exposes a health query with overall status and per-component detail").
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: Status,
    pub detail: String,
}

/// `HealthChecker` collaborator (§9): a read-only surface over the
/// engine's latest run-fatal/tick-fatal error history and risk status.
/// Health transitions to `Critical` on run-fatal errors; the hosting
/// deployment is expected to restart the process on that transition.
pub trait HealthChecker: Send + Sync {
    fn health(&self) -> HealthReport;
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub timestamp: Timestamp,
    pub overall_status: Status,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    pub fn safe(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            overall_status: Status::Safe,
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: impl Into<String>, status: Status, detail: impl Into<String>) -> Self {
        self.overall_status = self.overall_status.worst(status);
        self.components.push(ComponentHealth {
            component: component.into(),
            status,
            detail: detail.into(),
        });
        self
    }
}
