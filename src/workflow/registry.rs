//! Hot-reload playbook registry using ArcSwap
//!
//! Holds every published version of every playbook, compiled and validated.
//! Publishing swaps the whole map atomically, so executions that already
//! resolved their `CompiledWorkflow` keep running against it untouched.

use crate::error::EngineError;
use crate::workflow::{graph::CompiledWorkflow, storage::WorkflowStorage, types::WorkflowDefinition};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// All versions of one playbook, ordered by version number
type Versions = BTreeMap<u32, Arc<CompiledWorkflow>>;

/// Lock-free playbook registry
///
/// Key: workflow id, Value: compiled versions. Readers never block; writers
/// are serialized by `publish_lock` so version numbers stay dense.
#[derive(Debug)]
pub struct WorkflowRegistry {
    workflows: ArcSwap<HashMap<String, Versions>>,
    /// Optional persistent storage; `None` keeps the registry purely in memory
    storage: Option<WorkflowStorage>,
    publish_lock: tokio::sync::Mutex<()>,
}

impl WorkflowRegistry {
    pub fn new(storage: WorkflowStorage) -> Self {
        Self::with_storage(Some(storage))
    }

    /// Registry without persistence (embedding, tests)
    pub fn in_memory() -> Self {
        Self::with_storage(None)
    }

    fn with_storage(storage: Option<WorkflowStorage>) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Initialize registry by loading all versions from storage
    ///
    /// A stored version that no longer compiles is skipped with an error log
    /// rather than blocking startup.
    pub async fn init_from_storage(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        let mut loaded: HashMap<String, Versions> = HashMap::new();
        for definition in storage.load_all().await? {
            let (id, version) = (definition.id.clone(), definition.version);
            match CompiledWorkflow::compile(definition) {
                Ok(compiled) => {
                    loaded.entry(id).or_default().insert(version, Arc::new(compiled));
                }
                Err(e) => tracing::error!("❌ Skipping stored workflow {} v{}: {}", id, version, e),
            }
        }

        self.workflows.store(Arc::new(loaded));
        tracing::info!("Initialized workflow registry with {} workflows", self.workflows.load().len());
        Ok(())
    }

    /// Publish a new version of a playbook
    ///
    /// Validates the graph, assigns `latest + 1` as the version, persists the
    /// row, then swaps it into the in-memory map.
    pub async fn publish(&self, mut definition: WorkflowDefinition) -> Result<Arc<CompiledWorkflow>, EngineError> {
        if definition.id.trim().is_empty() || definition.name.trim().is_empty() {
            return Err(EngineError::InvalidDefinition("workflow id and name are required".into()));
        }

        let _guard = self.publish_lock.lock().await;

        let current = self.workflows.load_full();
        definition.version = current
            .get(&definition.id)
            .and_then(|versions| versions.keys().next_back().copied())
            .unwrap_or(0)
            + 1;

        let compiled = Arc::new(CompiledWorkflow::compile(definition)?);

        if let Some(storage) = &self.storage {
            storage.insert_version(&compiled.definition).await?;
        }

        let mut next = (*current).clone();
        next.entry(compiled.definition.id.clone())
            .or_default()
            .insert(compiled.definition.version, Arc::clone(&compiled));
        self.workflows.store(Arc::new(next));

        tracing::info!("📦 Published workflow {} v{}", compiled.definition.id, compiled.definition.version);
        Ok(compiled)
    }

    /// Latest version of a workflow (lock-free read)
    pub fn get(&self, workflow_id: &str) -> Option<Arc<CompiledWorkflow>> {
        self.workflows.load()
            .get(workflow_id)
            .and_then(|versions| versions.values().next_back().cloned())
    }

    /// Exact version, used when resuming or recovering an execution
    pub fn get_version(&self, workflow_id: &str, version: u32) -> Option<Arc<CompiledWorkflow>> {
        self.workflows.load()
            .get(workflow_id)
            .and_then(|versions| versions.get(&version).cloned())
    }

    /// Latest version of every workflow
    pub fn latest_definitions(&self) -> Vec<Arc<CompiledWorkflow>> {
        self.workflows.load()
            .values()
            .filter_map(|versions| versions.values().next_back().cloned())
            .collect()
    }

    /// Toggle `is_active` on every version of a workflow
    pub async fn set_active(&self, workflow_id: &str, active: bool) -> Result<bool, EngineError> {
        let _guard = self.publish_lock.lock().await;

        let current = self.workflows.load_full();
        let Some(versions) = current.get(workflow_id) else {
            return Ok(false);
        };

        if let Some(storage) = &self.storage {
            storage.set_active(workflow_id, active).await?;
        }

        let mut toggled = Versions::new();
        for (version, compiled) in versions {
            let mut definition = (*compiled.definition).clone();
            definition.is_active = active;
            toggled.insert(*version, Arc::new(CompiledWorkflow::compile(definition)?));
        }

        let mut next = (*current).clone();
        next.insert(workflow_id.to_string(), toggled);
        self.workflows.store(Arc::new(next));

        tracing::info!("🔁 Workflow {} is now {}", workflow_id, if active { "active" } else { "inactive" });
        Ok(true)
    }
}
