//! Unit status aggregation
//!
//! Statuses are appended to a [`StatusCollector`] in a fixed order every
//! status-collection pass. Exactly one is surfaced: the most severe, and the
//! earliest added among equally severe ones.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workload::{CheckInfo, CheckStatus};

/// Severity of a unit status, least severe first
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusLevel {
    Active,
    Waiting,
    Blocked,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusLevel::Active => "active",
            StatusLevel::Waiting => "waiting",
            StatusLevel::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub level: StatusLevel,
    pub message: String,
}

impl UnitStatus {
    pub fn active(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Active,
            message: message.into(),
        }
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Waiting,
            message: message.into(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Blocked,
            message: message.into(),
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.level)
        } else {
            write!(f, "{}: {}", self.level, self.message)
        }
    }
}

/// Ordered-append sink for one status-collection pass
#[derive(Clone, Debug, Default)]
pub struct StatusCollector {
    statuses: Vec<UnitStatus>,
}

impl StatusCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, status: UnitStatus) {
        self.statuses.push(status);
    }

    pub fn statuses(&self) -> &[UnitStatus] {
        &self.statuses
    }

    /// The single status to surface; Active with no message if none was added
    pub fn resolve(&self) -> UnitStatus {
        let mut winner: Option<&UnitStatus> = None;
        for status in &self.statuses {
            match winner {
                Some(current) if current.level >= status.level => {}
                _ => winner = Some(status),
            }
        }
        winner.cloned().unwrap_or_else(|| UnitStatus::active(""))
    }
}

fn bracketed(names: &[&str]) -> String {
    format!("[{}]", names.join(", "))
}

/// Collects the checks that feed a unit's status and appends them in order
///
/// Evaluation order: missing integrations (Blocked), missing configuration
/// (Waiting), inconsistent configuration (Blocked), failing workload checks
/// (Blocked, only once configuration is complete), then the Active fallback.
#[derive(Clone, Debug, Default)]
pub struct StatusManager {
    missing_relations: Vec<&'static str>,
    missing_configs: Vec<&'static str>,
    inconsistent: Vec<&'static str>,
    failing_checks: Vec<String>,
    active_message: String,
}

impl StatusManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require an integration to be connected
    pub fn require_relation(mut self, name: &'static str, connected: bool) -> Self {
        if !connected {
            self.missing_relations.push(name);
        }
        self
    }

    /// Require a configuration fragment to be present
    pub fn require_config(mut self, name: &'static str, present: bool) -> Self {
        if !present {
            self.missing_configs.push(name);
        }
        self
    }

    /// Requirements synthesized by a consistency check
    pub fn require_consistency(mut self, missing: Vec<&'static str>) -> Self {
        self.inconsistent.extend(missing);
        self
    }

    pub fn checks(mut self, checks: &[CheckInfo]) -> Self {
        self.failing_checks.extend(
            checks
                .iter()
                .filter(|c| c.status == CheckStatus::Down)
                .map(|c| c.name.clone()),
        );
        self
    }

    pub fn active_message(mut self, message: impl Into<String>) -> Self {
        self.active_message = message.into();
        self
    }

    pub fn missing_relations(&self) -> &[&'static str] {
        &self.missing_relations
    }

    pub fn missing_configs(&self) -> &[&'static str] {
        &self.missing_configs
    }

    pub fn collect(&self, sink: &mut StatusCollector) {
        if !self.missing_relations.is_empty() {
            sink.add(UnitStatus::blocked(format!(
                "Missing {} integration(s).",
                bracketed(&self.missing_relations)
            )));
        }
        if !self.missing_configs.is_empty() {
            sink.add(UnitStatus::waiting(format!(
                "{} not provided yet.",
                bracketed(&self.missing_configs)
            )));
        }
        if !self.inconsistent.is_empty() {
            sink.add(UnitStatus::blocked(format!(
                "Missing {} required by peer configuration.",
                bracketed(&self.inconsistent)
            )));
        }
        let configured = self.missing_relations.is_empty() && self.missing_configs.is_empty();
        if configured && !self.failing_checks.is_empty() {
            let names: Vec<&str> = self.failing_checks.iter().map(String::as_str).collect();
            sink.add(UnitStatus::blocked(format!(
                "Workload checks failing: {}.",
                bracketed(&names)
            )));
        }
        sink.add(UnitStatus::active(self.active_message.clone()));
    }

    /// Collect into a fresh sink and resolve
    pub fn resolve(&self) -> UnitStatus {
        let mut sink = StatusCollector::new();
        self.collect(&mut sink);
        sink.resolve()
    }
}
