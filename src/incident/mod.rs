//! Incident boundary
//!
//! The engine does not own incidents. It reads a snapshot for condition
//! evaluation and SLA checks and appends to the incident timeline through an
//! `IncidentGateway` supplied by the host application.

use crate::runtime::timeline::TimelineEvent;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// SLA deadlines carried by an incident
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaInfo {
    pub response_deadline: Option<DateTime<Utc>>,
    pub resolution_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub breached: bool,
}

/// Read-mostly incident snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Condition-visible fields; missing values make comparisons fail closed
    pub severity: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    #[serde(default)]
    pub sla: SlaInfo,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
}

impl Incident {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }
}

/// Host-provided access to the incident-management subsystem
#[async_trait]
pub trait IncidentGateway: Send + Sync {
    async fn get_incident_snapshot(&self, incident_id: &str) -> Result<Option<Incident>>;

    async fn append_timeline_event(&self, incident_id: &str, event: &TimelineEvent) -> Result<()>;

    async fn mark_sla_breached(&self, incident_id: &str) -> Result<()>;
}

/// In-process gateway used by the demo server and tests
#[derive(Debug, Default)]
pub struct MemoryIncidentGateway {
    incidents: RwLock<HashMap<String, Incident>>,
}

impl MemoryIncidentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, incident: Incident) {
        self.incidents.write().await.insert(incident.id.clone(), incident);
    }

    pub async fn timeline(&self, incident_id: &str) -> Vec<TimelineEvent> {
        self.incidents.read().await
            .get(incident_id)
            .map(|incident| incident.timeline.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl IncidentGateway for MemoryIncidentGateway {
    async fn get_incident_snapshot(&self, incident_id: &str) -> Result<Option<Incident>> {
        Ok(self.incidents.read().await.get(incident_id).cloned())
    }

    async fn append_timeline_event(&self, incident_id: &str, event: &TimelineEvent) -> Result<()> {
        let mut incidents = self.incidents.write().await;
        let incident = incidents.get_mut(incident_id)
            .ok_or_else(|| anyhow::anyhow!("Incident not found: {}", incident_id))?;
        incident.timeline.push(event.clone());
        Ok(())
    }

    async fn mark_sla_breached(&self, incident_id: &str) -> Result<()> {
        if let Some(incident) = self.incidents.write().await.get_mut(incident_id) {
            incident.sla.breached = true;
        }
        Ok(())
    }
}
