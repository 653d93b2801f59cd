//! In-memory `ClusterStore` for unit testing
//!
//! Objects are keyed by `(namespace, name)`. Every write bumps a global
//! resource version and is counted, so tests can assert idempotence
//! ("second reconcile makes no writes") and exercise conflicts.

use super::{ClusterStore, StoreError};
use crds::{CullingPolicy, Notebook, NotebookStatus, STOP_ANNOTATION};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::{Resource, ResourceExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (String, String);

/// Concurrent edit applied to the stored workload right before the next
/// workload write, after the caller already read its copy
struct RacingEdit(Box<dyn FnOnce(&mut StatefulSet) + Send>);

impl fmt::Debug for RacingEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RacingEdit")
    }
}

/// Warning event captured by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// `namespace/name` of the notebook the event was attached to
    pub object: String,
    /// Event reason
    pub reason: String,
    /// Event note
    pub message: String,
}

#[derive(Debug, Default)]
struct State {
    notebooks: HashMap<Key, Notebook>,
    workloads: HashMap<Key, StatefulSet>,
    services: HashMap<Key, Service>,
    pods: HashMap<Key, Pod>,
    policies: HashMap<Key, CullingPolicy>,
    events: Vec<RecordedEvent>,
    next_version: u64,
    writes: usize,
    fail_reads: Option<String>,
    fail_workload_writes: Option<String>,
    fail_service_writes: Option<String>,
    racing_edit: Option<RacingEdit>,
}

impl State {
    fn bump<K: Resource>(&mut self, obj: &mut K) {
        self.next_version += 1;
        obj.meta_mut().resource_version = Some(self.next_version.to_string());
    }

    /// Apply a pending racing edit to the stored copy of `workload`
    fn race_workload(&mut self, workload: &StatefulSet) {
        let Some(RacingEdit(edit)) = self.racing_edit.take() else {
            return;
        };
        if let Some(mut current) = self.workloads.remove(&key_of(workload)) {
            edit(&mut current);
            self.bump(&mut current);
            self.workloads.insert(key_of(&current), current);
        }
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        match &self.fail_reads {
            Some(msg) => Err(StoreError::Unavailable(msg.clone())),
            None => Ok(()),
        }
    }
}

fn key_of<K: Resource>(obj: &K) -> Key {
    (
        obj.meta().namespace.clone().unwrap_or_default(),
        obj.meta().name.clone().unwrap_or_default(),
    )
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn check_version<K: Resource>(current: &K, incoming: &K, what: &str) -> Result<(), StoreError> {
    if current.meta().resource_version == incoming.meta().resource_version {
        Ok(())
    } else {
        Err(StoreError::Conflict(what.to_string()))
    }
}

/// In-memory cluster
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<State>>,
}

impl MockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a notebook (not counted as a write)
    pub fn insert_notebook(&self, mut notebook: Notebook) {
        let mut state = self.lock();
        state.bump(&mut notebook);
        state.notebooks.insert(key_of(&notebook), notebook);
    }

    /// Seed a workload (not counted as a write)
    pub fn insert_workload(&self, mut workload: StatefulSet) {
        let mut state = self.lock();
        state.bump(&mut workload);
        state.workloads.insert(key_of(&workload), workload);
    }

    /// Seed a service (not counted as a write)
    pub fn insert_service(&self, mut service: Service) {
        let mut state = self.lock();
        state.bump(&mut service);
        state.services.insert(key_of(&service), service);
    }

    /// Seed a pod
    pub fn insert_pod(&self, mut pod: Pod) {
        let mut state = self.lock();
        state.bump(&mut pod);
        state.pods.insert(key_of(&pod), pod);
    }

    /// Seed a culling policy
    pub fn insert_policy(&self, mut policy: CullingPolicy) {
        let mut state = self.lock();
        state.bump(&mut policy);
        state.policies.insert(key_of(&policy), policy);
    }

    /// Simulate an out-of-band change to a stored workload
    pub fn update_workload(&self, namespace: &str, name: &str, f: impl FnOnce(&mut StatefulSet)) {
        let mut state = self.lock();
        if let Some(mut workload) = state.workloads.remove(&key(namespace, name)) {
            f(&mut workload);
            state.bump(&mut workload);
            state.workloads.insert(key(namespace, name), workload);
        }
    }

    /// Let another writer edit the workload between the caller's read and its
    /// next workload replace or stop
    pub fn race_next_workload_write(&self, f: impl FnOnce(&mut StatefulSet) + Send + 'static) {
        self.lock().racing_edit = Some(RacingEdit(Box::new(f)));
    }

    /// Current copy of a notebook
    pub fn notebook(&self, namespace: &str, name: &str) -> Option<Notebook> {
        self.lock().notebooks.get(&key(namespace, name)).cloned()
    }

    /// Current copy of a workload
    pub fn workload(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
        self.lock().workloads.get(&key(namespace, name)).cloned()
    }

    /// Current copy of a service
    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.lock().services.get(&key(namespace, name)).cloned()
    }

    /// Number of successful writes since creation
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Warning events published so far
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().events.clone()
    }

    /// Make every read fail with `message`
    pub fn fail_reads(&self, message: &str) {
        self.lock().fail_reads = Some(message.to_string());
    }

    /// Make workload create/replace/stop fail with `message`
    pub fn fail_workload_writes(&self, message: &str) {
        self.lock().fail_workload_writes = Some(message.to_string());
    }

    /// Make service create/replace fail with `message`
    pub fn fail_service_writes(&self, message: &str) {
        self.lock().fail_service_writes = Some(message.to_string());
    }
}

#[async_trait::async_trait]
impl ClusterStore for MockStore {
    async fn get_notebook(&self, namespace: &str, name: &str) -> Result<Option<Notebook>, StoreError> {
        let state = self.lock();
        state.check_reads()?;
        Ok(state.notebooks.get(&key(namespace, name)).cloned())
    }

    async fn patch_notebook_status(
        &self,
        notebook: &Notebook,
        status: &NotebookStatus,
    ) -> Result<Notebook, StoreError> {
        let mut state = self.lock();
        let what = format!("Notebook {}", notebook.name_any());
        let mut current = state
            .notebooks
            .get(&key_of(notebook))
            .cloned()
            .ok_or_else(|| StoreError::Unavailable(format!("{what} not found")))?;
        check_version(&current, notebook, &what)?;
        current.status = Some(status.clone());
        state.bump(&mut current);
        state.writes += 1;
        state.notebooks.insert(key_of(&current), current.clone());
        Ok(current)
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, StoreError> {
        let state = self.lock();
        state.check_reads()?;
        Ok(state.workloads.get(&key(namespace, name)).cloned())
    }

    async fn create_workload(&self, workload: &StatefulSet) -> Result<StatefulSet, StoreError> {
        let mut state = self.lock();
        if let Some(msg) = &state.fail_workload_writes {
            return Err(StoreError::Unavailable(msg.clone()));
        }
        if state.workloads.contains_key(&key_of(workload)) {
            return Err(StoreError::AlreadyExists(workload.name_any()));
        }
        let mut created = workload.clone();
        state.bump(&mut created);
        state.writes += 1;
        state.workloads.insert(key_of(&created), created.clone());
        Ok(created)
    }

    async fn replace_workload(&self, workload: &StatefulSet) -> Result<StatefulSet, StoreError> {
        let mut state = self.lock();
        if let Some(msg) = &state.fail_workload_writes {
            return Err(StoreError::Unavailable(msg.clone()));
        }
        state.race_workload(workload);
        let what = format!("StatefulSet {}", workload.name_any());
        let current = state
            .workloads
            .get(&key_of(workload))
            .ok_or_else(|| StoreError::Unavailable(format!("{what} not found")))?;
        check_version(current, workload, &what)?;
        let mut replaced = workload.clone();
        state.bump(&mut replaced);
        state.writes += 1;
        state.workloads.insert(key_of(&replaced), replaced.clone());
        Ok(replaced)
    }

    async fn stop_workload(&self, workload: &StatefulSet) -> Result<StatefulSet, StoreError> {
        let mut state = self.lock();
        if let Some(msg) = &state.fail_workload_writes {
            return Err(StoreError::Unavailable(msg.clone()));
        }
        state.race_workload(workload);
        let what = format!("StatefulSet {}", workload.name_any());
        let mut current = state
            .workloads
            .get(&key_of(workload))
            .cloned()
            .ok_or_else(|| StoreError::Unavailable(format!("{what} not found")))?;
        check_version(&current, workload, &what)?;
        current
            .annotations_mut()
            .insert(STOP_ANNOTATION.to_string(), "true".to_string());
        if let Some(spec) = current.spec.as_mut() {
            spec.replicas = Some(0);
        }
        state.bump(&mut current);
        state.writes += 1;
        state.workloads.insert(key_of(&current), current.clone());
        Ok(current)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, StoreError> {
        let state = self.lock();
        state.check_reads()?;
        Ok(state.services.get(&key(namespace, name)).cloned())
    }

    async fn create_service(&self, service: &Service) -> Result<Service, StoreError> {
        let mut state = self.lock();
        if let Some(msg) = &state.fail_service_writes {
            return Err(StoreError::Unavailable(msg.clone()));
        }
        if state.services.contains_key(&key_of(service)) {
            return Err(StoreError::AlreadyExists(service.name_any()));
        }
        let mut created = service.clone();
        state.bump(&mut created);
        state.writes += 1;
        state.services.insert(key_of(&created), created.clone());
        Ok(created)
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, StoreError> {
        let mut state = self.lock();
        if let Some(msg) = &state.fail_service_writes {
            return Err(StoreError::Unavailable(msg.clone()));
        }
        let what = format!("Service {}", service.name_any());
        let current = state
            .services
            .get(&key_of(service))
            .ok_or_else(|| StoreError::Unavailable(format!("{what} not found")))?;
        check_version(current, service, &what)?;
        let mut replaced = service.clone();
        state.bump(&mut replaced);
        state.writes += 1;
        state.services.insert(key_of(&replaced), replaced.clone());
        Ok(replaced)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError> {
        let state = self.lock();
        state.check_reads()?;
        Ok(state.pods.get(&key(namespace, name)).cloned())
    }

    async fn get_culling_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CullingPolicy>, StoreError> {
        let state = self.lock();
        state.check_reads()?;
        Ok(state.policies.get(&key(namespace, name)).cloned())
    }

    async fn publish_warning(
        &self,
        notebook: &Notebook,
        reason: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let (namespace, name) = key_of(notebook);
        self.lock().events.push(RecordedEvent {
            object: format!("{namespace}/{name}"),
            reason: reason.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}
