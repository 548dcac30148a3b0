//! Shared test utilities for tfc-operator integration tests.
//!
//! Everything the orchestrator talks to is faked in memory: the object store,
//! secrets and config maps, the event sink and the remote service.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::Resource;
use kube::runtime::controller::Action;
use serde_json::{Value, json};
use tfc_client::{
    AgentPool, AgentPoolApi, AgentPoolOptions, AgentToken, ClientError, ClientFactory,
    ConfigurationVersion, ConfigurationVersionOptions, ListOptions, NotificationApi,
    NotificationConfiguration, NotificationOptions, OrganizationApi, OrganizationMembership, Page,
    Project, ProjectApi, ProjectOptions, ProjectTeamAccess, ProjectTeamAccessOptions,
    RemoteStateApi, Run, RunApi, RunOptions, RunTrigger, RunTriggerApi, SshKey, StateOutput, Tag,
    TagApi, Team, TeamAccess, TeamAccessOptions, TeamApi, TfcApi, Variable, VariableApi,
    VariableOptions, Workspace, WorkspaceApi, WorkspaceOptions,
};
use tfc_operator::OperatorConfig;
use tfc_operator::crd::ManagedResource;
use tfc_operator::events::{Event, EventSink};
use tfc_operator::reconciler::{Orchestrator, Reconciler};
use tfc_operator::store::{ObjectKey, ObjectStore, SecretStore, StoreError};

pub const NAMESPACE: &str = "default";
pub const ORG: &str = "acme";
pub const TOKEN: &str = "test-token";
pub const DEFAULT_PROJECT: &str = "prj-default";

// =============================================================================
// Object store
// =============================================================================

/// Managed objects of one kind, with API server semantics for finalizers and
/// resource versions.
pub struct FakeStore<K> {
    objects: Mutex<BTreeMap<ObjectKey, K>>,
    versions: AtomicUsize,
    status_writes: AtomicUsize,
}

impl<K: ManagedResource> FakeStore<K> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            versions: AtomicUsize::new(1),
            status_writes: AtomicUsize::new(0),
        }
    }

    fn next_version(&self) -> Option<String> {
        Some(self.versions.fetch_add(1, Ordering::SeqCst).to_string())
    }

    /// Create the object at generation 1.
    pub fn insert(&self, mut obj: K) -> ObjectKey {
        let meta = obj.meta_mut();
        meta.namespace = Some(NAMESPACE.to_string());
        meta.uid = Some(format!("uid-{}", meta.name.clone().unwrap_or_default()));
        meta.generation = Some(1);
        meta.resource_version = self.next_version();
        let key = ObjectKey::of(&obj);
        self.objects.lock().unwrap().insert(key.clone(), obj);
        key
    }

    pub fn get_now(&self, key: &ObjectKey) -> Option<K> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Spec edit: applies `edit` and bumps the generation.
    pub fn edit_spec(&self, key: &ObjectKey, edit: impl FnOnce(&mut K)) {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(key).expect("object exists");
        edit(obj);
        let meta = obj.meta_mut();
        meta.generation = Some(meta.generation.unwrap_or_default() + 1);
        meta.resource_version = version;
    }

    /// Request deletion. Without finalizers the object goes immediately.
    pub fn mark_deleted(&self, key: &ObjectKey) {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let finalized = objects
            .get(key)
            .expect("object exists")
            .meta()
            .finalizers
            .as_ref()
            .is_some_and(|f| !f.is_empty());
        if !finalized {
            objects.remove(key);
            return;
        }
        let meta = objects.get_mut(key).expect("object exists").meta_mut();
        meta.deletion_timestamp = Some(Time(Utc::now()));
        meta.resource_version = version;
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K: ManagedResource> ObjectStore<K> for FakeStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        Ok(self.get_now(key))
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(StoreError::Conflict(format!("{} is gone", key)));
        };
        if stored.meta().resource_version != obj.meta().resource_version {
            return Err(StoreError::Conflict(format!("{} was modified", key)));
        }
        stored.meta_mut().finalizers = obj.meta().finalizers.clone();
        stored.meta_mut().resource_version = version;
        let updated = stored.clone();

        let deleting = updated.meta().deletion_timestamp.is_some();
        if deleting && updated.meta().finalizers.as_ref().is_none_or(Vec::is_empty) {
            objects.remove(&key);
        }
        Ok(updated)
    }

    async fn update_status(&self, obj: &K) -> Result<(), StoreError> {
        let key = ObjectKey::of(obj);
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(StoreError::Conflict(format!("{} is gone", key)));
        };
        *stored.status_mut() = obj.status().cloned().unwrap_or_default();
        stored.meta_mut().resource_version = version;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Secrets and config maps
// =============================================================================

type Data = BTreeMap<String, String>;

#[derive(Default)]
pub struct FakeSecrets {
    secrets: Mutex<BTreeMap<String, Data>>,
    config_maps: Mutex<BTreeMap<String, Data>>,
    owners: Mutex<BTreeMap<String, Option<OwnerReference>>>,
}

impl FakeSecrets {
    /// Pre-loaded with the `tfc` credential secret.
    pub fn new() -> Self {
        let store = Self::default();
        store.put_secret("tfc", &[("token", TOKEN)]);
        store
    }

    pub fn put_secret(&self, name: &str, data: &[(&str, &str)]) {
        self.secrets.lock().unwrap().insert(name.to_string(), to_data(data));
    }

    pub fn put_config_map(&self, name: &str, data: &[(&str, &str)]) {
        self.config_maps
            .lock()
            .unwrap()
            .insert(name.to_string(), to_data(data));
    }

    pub fn secret(&self, name: &str) -> Option<Data> {
        self.secrets.lock().unwrap().get(name).cloned()
    }

    pub fn config_map(&self, name: &str) -> Option<Data> {
        self.config_maps.lock().unwrap().get(name).cloned()
    }

    pub fn owner(&self, name: &str) -> Option<OwnerReference> {
        self.owners.lock().unwrap().get(name).cloned().flatten()
    }
}

fn to_data(data: &[(&str, &str)]) -> Data {
    data.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl SecretStore for FakeSecrets {
    async fn secret_data(&self, _namespace: &str, name: &str) -> Result<Option<Data>, StoreError> {
        Ok(self.secret(name))
    }

    async fn config_map_data(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<Data>, StoreError> {
        Ok(self.config_map(name))
    }

    async fn apply_secret(
        &self,
        _namespace: &str,
        name: &str,
        owner: Option<OwnerReference>,
        data: Data,
    ) -> Result<(), StoreError> {
        self.owners.lock().unwrap().insert(name.to_string(), owner);
        self.secrets.lock().unwrap().insert(name.to_string(), data);
        Ok(())
    }

    async fn apply_config_map(
        &self,
        _namespace: &str,
        name: &str,
        owner: Option<OwnerReference>,
        data: Data,
    ) -> Result<(), StoreError> {
        self.owners.lock().unwrap().insert(name.to_string(), owner);
        self.config_maps.lock().unwrap().insert(name.to_string(), data);
        Ok(())
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<Event>>,
}

impl RecordingEvents {
    pub fn reasons(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.reason).collect()
    }

    pub fn has(&self, reason: &str) -> bool {
        self.reasons().contains(&reason)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventSink for RecordingEvents {
    async fn publish(&self, _regarding: &ObjectReference, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

// =============================================================================
// Remote service
// =============================================================================

#[derive(Default)]
struct RemoteState {
    next_id: u64,
    clock: i64,
    workspaces: BTreeMap<String, Workspace>,
    tags: BTreeMap<String, Vec<Tag>>,
    variables: BTreeMap<String, Vec<Variable>>,
    teams: Vec<Team>,
    team_access: Vec<(String, TeamAccess)>,
    memberships: Vec<OrganizationMembership>,
    ssh_keys: Vec<SshKey>,
    notifications: Vec<(String, NotificationConfiguration)>,
    run_triggers: Vec<(String, RunTrigger)>,
    consumers: BTreeMap<String, BTreeSet<String>>,
    projects: BTreeMap<String, Project>,
    project_team_access: Vec<(String, ProjectTeamAccess)>,
    agent_pools: BTreeMap<String, AgentPool>,
    agent_tokens: Vec<(String, AgentToken)>,
    runs: BTreeMap<String, Run>,
    configuration_versions: BTreeMap<String, ConfigurationVersion>,
    uploads: BTreeMap<String, Vec<u8>>,
    outputs: BTreeMap<String, Vec<StateOutput>>,
    refuse_delete: BTreeSet<String>,
    withhold_upload_url: bool,
}

impl RemoteState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn tick(&mut self) -> Option<DateTime<Utc>> {
        self.clock += 1;
        DateTime::from_timestamp(1_700_000_000 + self.clock, 0)
    }

    fn workspace_mut(&mut self, id: &str) -> tfc_client::Result<&mut Workspace> {
        self.workspaces
            .get_mut(id)
            .ok_or_else(|| ClientError::NotFound(format!("workspace {}", id)))
    }
}

fn not_found(what: &str, id: &str) -> ClientError {
    ClientError::NotFound(format!("{} {}", what, id))
}

/// Slice `items` into the page `opts` asks for.
fn page<T>(items: Vec<T>, opts: &ListOptions) -> tfc_client::Result<Page<T>> {
    let size = opts.page_size.max(1) as usize;
    let start = (opts.page_number.max(1) as usize - 1) * size;
    let total = items.len();
    let items: Vec<T> = items.into_iter().skip(start).take(size).collect();
    let next_page = (start + size < total).then_some(opts.page_number + 1);
    Ok(Page { items, next_page })
}

fn matches(opts: &ListOptions, name: &str) -> bool {
    opts.search.as_deref().is_none_or(|s| name.contains(s))
}

/// In-memory remote service. Every write bumps the mutation counter.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
    mutations: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.state.lock().unwrap().projects.insert(
            DEFAULT_PROJECT.to_string(),
            Project {
                id: DEFAULT_PROJECT.to_string(),
                name: "Default Project".to_string(),
            },
        );
        remote
    }

    /// Lock for a remote write.
    fn write(&self) -> std::sync::MutexGuard<'_, RemoteState> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    // Seeding, none of these count as mutations.

    pub fn seed_workspace(&self, name: &str) -> String {
        let mut st = self.state();
        let id = st.id("ws");
        let updated_at = st.tick();
        st.workspaces.insert(
            id.clone(),
            Workspace {
                id: id.clone(),
                name: name.to_string(),
                execution_mode: "remote".to_string(),
                project_id: Some(DEFAULT_PROJECT.to_string()),
                updated_at,
                ..Default::default()
            },
        );
        id
    }

    pub fn seed_project(&self, name: &str) -> String {
        let mut st = self.state();
        let id = st.id("prj");
        st.projects.insert(
            id.clone(),
            Project {
                id: id.clone(),
                name: name.to_string(),
            },
        );
        id
    }

    pub fn seed_team(&self, name: &str) -> String {
        let mut st = self.state();
        let id = st.id("team");
        st.teams.push(Team {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    pub fn seed_member(&self, email: &str) -> String {
        let mut st = self.state();
        let user_id = st.id("user");
        let id = st.id("ou");
        st.memberships.push(OrganizationMembership {
            id,
            email: email.to_string(),
            user_id: Some(user_id.clone()),
        });
        user_id
    }

    pub fn seed_ssh_key(&self, name: &str) -> String {
        let mut st = self.state();
        let id = st.id("sshkey");
        st.ssh_keys.push(SshKey {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    pub fn seed_outputs(&self, workspace_id: &str, outputs: &[(&str, Value, bool)]) {
        let mut st = self.state();
        let outputs = outputs
            .iter()
            .enumerate()
            .map(|(i, (name, value, sensitive))| StateOutput {
                id: format!("wsout-{}", i),
                name: name.to_string(),
                value: value.clone(),
                sensitive: *sensitive,
            })
            .collect();
        st.outputs.insert(workspace_id.to_string(), outputs);
    }

    // Out-of-band changes.

    pub fn remove_workspace(&self, id: &str) {
        self.state().workspaces.remove(id);
    }

    pub fn modify_workspace(&self, id: &str, edit: impl FnOnce(&mut Workspace)) {
        let mut st = self.state();
        let updated_at = st.tick();
        let ws = st.workspaces.get_mut(id).expect("workspace exists");
        edit(ws);
        ws.updated_at = updated_at;
    }

    pub fn modify_project(&self, id: &str, edit: impl FnOnce(&mut Project)) {
        edit(self.state().projects.get_mut(id).expect("project exists"));
    }

    pub fn modify_agent_pool(&self, id: &str, edit: impl FnOnce(&mut AgentPool)) {
        edit(self.state().agent_pools.get_mut(id).expect("agent pool exists"));
    }

    pub fn remove_project(&self, id: &str) {
        self.state().projects.remove(id);
    }

    pub fn remove_agent_pool(&self, id: &str) {
        self.state().agent_pools.remove(id);
    }

    pub fn refuse_delete(&self, id: &str) {
        self.state().refuse_delete.insert(id.to_string());
    }

    pub fn allow_delete(&self, id: &str) {
        self.state().refuse_delete.remove(id);
    }

    /// Configuration versions created from now on carry no upload URL.
    pub fn withhold_upload_url(&self, withhold: bool) {
        self.state().withhold_upload_url = withhold;
    }

    pub fn set_run_status(&self, id: &str, status: &str) {
        let mut st = self.state();
        let run = st.runs.get_mut(id).expect("run exists");
        run.status = status.to_string();
    }

    // Inspection.

    pub fn workspace(&self, id: &str) -> Option<Workspace> {
        self.state().workspaces.get(id).cloned()
    }

    pub fn workspace_count(&self) -> usize {
        self.state().workspaces.len()
    }

    pub fn tag_names(&self, workspace_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .state()
            .tags
            .get(workspace_id)
            .map(|tags| tags.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Variables with their real values, sensitive ones included.
    pub fn variables(&self, workspace_id: &str) -> Vec<Variable> {
        let mut vars = self
            .state()
            .variables
            .get(workspace_id)
            .cloned()
            .unwrap_or_default();
        vars.sort_by(|a, b| a.key.cmp(&b.key));
        vars
    }

    pub fn team_access(&self, workspace_id: &str) -> Vec<TeamAccess> {
        self.state()
            .team_access
            .iter()
            .filter(|(ws, _)| ws == workspace_id)
            .map(|(_, a)| a.clone())
            .collect()
    }

    pub fn notifications(&self, workspace_id: &str) -> Vec<NotificationConfiguration> {
        self.state()
            .notifications
            .iter()
            .filter(|(ws, _)| ws == workspace_id)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn run_trigger_sources(&self, workspace_id: &str) -> Vec<String> {
        self.state()
            .run_triggers
            .iter()
            .filter(|(ws, _)| ws == workspace_id)
            .map(|(_, t)| t.sourceable_id.clone())
            .collect()
    }

    pub fn consumers(&self, workspace_id: &str) -> Vec<String> {
        self.state()
            .consumers
            .get(workspace_id)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.state().projects.get(id).cloned()
    }

    pub fn project_team_access(&self, project_id: &str) -> Vec<ProjectTeamAccess> {
        self.state()
            .project_team_access
            .iter()
            .filter(|(p, _)| p == project_id)
            .map(|(_, a)| a.clone())
            .collect()
    }

    pub fn agent_pool(&self, id: &str) -> Option<AgentPool> {
        self.state().agent_pools.get(id).cloned()
    }

    pub fn agent_token_names(&self, pool_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .state()
            .agent_tokens
            .iter()
            .filter(|(p, _)| p == pool_id)
            .map(|(_, t)| t.description.clone())
            .collect();
        names.sort();
        names
    }

    pub fn run(&self, id: &str) -> Option<Run> {
        self.state().runs.get(id).cloned()
    }

    pub fn runs(&self) -> Vec<Run> {
        self.state().runs.values().cloned().collect()
    }

    pub fn uploaded_archive(&self, cv_id: &str) -> Option<Vec<u8>> {
        self.state().uploads.get(cv_id).cloned()
    }

    pub fn configuration_version_count(&self) -> usize {
        self.state().configuration_versions.len()
    }
}

#[async_trait]
impl WorkspaceApi for FakeRemote {
    async fn list_workspaces(&self, _org: &str, opts: &ListOptions) -> tfc_client::Result<Page<Workspace>> {
        let items = self
            .state()
            .workspaces
            .values()
            .filter(|w| matches(opts, &w.name))
            .cloned()
            .collect();
        page(items, opts)
    }

    async fn create_workspace(&self, _org: &str, opts: &WorkspaceOptions) -> tfc_client::Result<Workspace> {
        let mut st = self.write();
        let id = st.id("ws");
        let ws = Workspace {
            id: id.clone(),
            name: opts.name.clone(),
            description: opts.description.clone(),
            auto_apply: opts.auto_apply,
            allow_destroy_plan: opts.allow_destroy_plan,
            execution_mode: opts.execution_mode.clone(),
            terraform_version: opts.terraform_version.clone().or(Some("1.9.0".to_string())),
            working_directory: opts.working_directory.clone(),
            global_remote_state: opts.global_remote_state,
            speculative_enabled: opts.speculative_enabled,
            vcs_repo: opts.vcs_repo.clone(),
            updated_at: st.tick(),
            project_id: opts
                .project_id
                .clone()
                .or(Some(DEFAULT_PROJECT.to_string())),
            agent_pool_id: opts.agent_pool_id.clone(),
            ssh_key_id: None,
            current_run_id: None,
        };
        st.workspaces.insert(id, ws.clone());
        Ok(ws)
    }

    async fn read_workspace(&self, id: &str) -> tfc_client::Result<Workspace> {
        self.state()
            .workspaces
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("workspace", id))
    }

    async fn update_workspace(&self, id: &str, opts: &WorkspaceOptions) -> tfc_client::Result<Workspace> {
        let mut st = self.write();
        let updated_at = st.tick();
        let ws = st.workspace_mut(id)?;
        ws.name = opts.name.clone();
        ws.description = opts.description.clone();
        ws.auto_apply = opts.auto_apply;
        ws.allow_destroy_plan = opts.allow_destroy_plan;
        ws.execution_mode = opts.execution_mode.clone();
        if opts.terraform_version.is_some() {
            ws.terraform_version = opts.terraform_version.clone();
        }
        ws.working_directory = opts.working_directory.clone();
        ws.global_remote_state = opts.global_remote_state;
        ws.speculative_enabled = opts.speculative_enabled;
        ws.vcs_repo = opts.vcs_repo.clone();
        if opts.project_id.is_some() {
            ws.project_id = opts.project_id.clone();
        }
        ws.agent_pool_id = opts.agent_pool_id.clone();
        ws.updated_at = updated_at;
        Ok(ws.clone())
    }

    async fn delete_workspace(&self, id: &str) -> tfc_client::Result<()> {
        self.write()
            .workspaces
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("workspace", id))
    }

    async fn safe_delete_workspace(&self, id: &str) -> tfc_client::Result<()> {
        let mut st = self.write();
        if st.refuse_delete.contains(id) {
            return Err(ClientError::Conflict(format!(
                "workspace {} is currently managing resources",
                id
            )));
        }
        st.workspaces
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("workspace", id))
    }

    async fn assign_ssh_key(&self, workspace_id: &str, ssh_key_id: &str) -> tfc_client::Result<()> {
        let mut st = self.write();
        let updated_at = st.tick();
        let ws = st.workspace_mut(workspace_id)?;
        ws.ssh_key_id = Some(ssh_key_id.to_string());
        ws.updated_at = updated_at;
        Ok(())
    }

    async fn unassign_ssh_key(&self, workspace_id: &str) -> tfc_client::Result<()> {
        let mut st = self.write();
        let updated_at = st.tick();
        let ws = st.workspace_mut(workspace_id)?;
        ws.ssh_key_id = None;
        ws.updated_at = updated_at;
        Ok(())
    }
}

#[async_trait]
impl TagApi for FakeRemote {
    async fn list_workspace_tags(&self, workspace_id: &str, opts: &ListOptions) -> tfc_client::Result<Page<Tag>> {
        let items = self.state().tags.get(workspace_id).cloned().unwrap_or_default();
        page(items, opts)
    }

    async fn add_workspace_tags(&self, workspace_id: &str, names: &[String]) -> tfc_client::Result<()> {
        let mut st = self.write();
        for name in names {
            let id = st.id("tag");
            let tags = st.tags.entry(workspace_id.to_string()).or_default();
            if !tags.iter().any(|t| &t.name == name) {
                tags.push(Tag {
                    id,
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    async fn remove_workspace_tags(&self, workspace_id: &str, tags: &[Tag]) -> tfc_client::Result<()> {
        let mut st = self.write();
        if let Some(existing) = st.tags.get_mut(workspace_id) {
            existing.retain(|t| !tags.iter().any(|r| r.id == t.id));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStateApi for FakeRemote {
    async fn list_remote_state_consumers(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> tfc_client::Result<Page<Workspace>> {
        let st = self.state();
        let items = st
            .consumers
            .get(workspace_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| st.workspaces.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        page(items, opts)
    }

    async fn add_remote_state_consumers(&self, workspace_id: &str, consumer_ids: &[String]) -> tfc_client::Result<()> {
        self.write()
            .consumers
            .entry(workspace_id.to_string())
            .or_default()
            .extend(consumer_ids.iter().cloned());
        Ok(())
    }

    async fn remove_remote_state_consumers(
        &self,
        workspace_id: &str,
        consumer_ids: &[String],
    ) -> tfc_client::Result<()> {
        if let Some(set) = self.write().consumers.get_mut(workspace_id) {
            set.retain(|id| !consumer_ids.contains(id));
        }
        Ok(())
    }
}

#[async_trait]
impl VariableApi for FakeRemote {
    async fn list_variables(&self, workspace_id: &str, opts: &ListOptions) -> tfc_client::Result<Page<Variable>> {
        let items = self
            .state()
            .variables
            .get(workspace_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|mut v| {
                if v.sensitive {
                    v.value = None;
                }
                v
            })
            .collect();
        page(items, opts)
    }

    async fn create_variable(&self, workspace_id: &str, opts: &VariableOptions) -> tfc_client::Result<Variable> {
        let mut st = self.write();
        let id = st.id("var");
        let var = Variable {
            id,
            key: opts.key.clone(),
            value: Some(opts.value.clone()),
            description: opts.description.clone(),
            category: opts.category,
            hcl: opts.hcl,
            sensitive: opts.sensitive,
        };
        st.variables
            .entry(workspace_id.to_string())
            .or_default()
            .push(var.clone());
        Ok(var)
    }

    async fn update_variable(
        &self,
        workspace_id: &str,
        variable_id: &str,
        opts: &VariableOptions,
    ) -> tfc_client::Result<Variable> {
        let mut st = self.write();
        let var = st
            .variables
            .get_mut(workspace_id)
            .and_then(|vars| vars.iter_mut().find(|v| v.id == variable_id))
            .ok_or_else(|| not_found("variable", variable_id))?;
        var.key = opts.key.clone();
        var.value = Some(opts.value.clone());
        var.description = opts.description.clone();
        var.hcl = opts.hcl;
        var.sensitive = opts.sensitive;
        Ok(var.clone())
    }

    async fn delete_variable(&self, workspace_id: &str, variable_id: &str) -> tfc_client::Result<()> {
        if let Some(vars) = self.write().variables.get_mut(workspace_id) {
            vars.retain(|v| v.id != variable_id);
        }
        Ok(())
    }
}

#[async_trait]
impl TeamApi for FakeRemote {
    async fn list_teams(&self, _org: &str, opts: &ListOptions) -> tfc_client::Result<Page<Team>> {
        let items = self
            .state()
            .teams
            .iter()
            .filter(|t| matches(opts, &t.name))
            .cloned()
            .collect();
        page(items, opts)
    }

    async fn list_team_access(&self, workspace_id: &str, opts: &ListOptions) -> tfc_client::Result<Page<TeamAccess>> {
        page(self.team_access(workspace_id), opts)
    }

    async fn add_team_access(&self, workspace_id: &str, opts: &TeamAccessOptions) -> tfc_client::Result<TeamAccess> {
        let mut st = self.write();
        let access = TeamAccess {
            id: st.id("tws"),
            team_id: opts.team_id.clone(),
            access: opts.access.clone(),
            permissions: opts.permissions.clone(),
        };
        st.team_access.push((workspace_id.to_string(), access.clone()));
        Ok(access)
    }

    async fn update_team_access(&self, id: &str, opts: &TeamAccessOptions) -> tfc_client::Result<TeamAccess> {
        let mut st = self.write();
        let (_, access) = st
            .team_access
            .iter_mut()
            .find(|(_, a)| a.id == id)
            .ok_or_else(|| not_found("team access", id))?;
        access.access = opts.access.clone();
        access.permissions = opts.permissions.clone();
        Ok(access.clone())
    }

    async fn remove_team_access(&self, id: &str) -> tfc_client::Result<()> {
        self.write().team_access.retain(|(_, a)| a.id != id);
        Ok(())
    }

    async fn list_project_team_access(
        &self,
        project_id: &str,
        opts: &ListOptions,
    ) -> tfc_client::Result<Page<ProjectTeamAccess>> {
        page(self.project_team_access(project_id), opts)
    }

    async fn add_project_team_access(
        &self,
        project_id: &str,
        opts: &ProjectTeamAccessOptions,
    ) -> tfc_client::Result<ProjectTeamAccess> {
        let mut st = self.write();
        let access = ProjectTeamAccess {
            id: st.id("tprj"),
            team_id: opts.team_id.clone(),
            access: opts.access.clone(),
            permissions: opts.permissions.clone(),
        };
        st.project_team_access
            .push((project_id.to_string(), access.clone()));
        Ok(access)
    }

    async fn update_project_team_access(
        &self,
        id: &str,
        opts: &ProjectTeamAccessOptions,
    ) -> tfc_client::Result<ProjectTeamAccess> {
        let mut st = self.write();
        let (_, access) = st
            .project_team_access
            .iter_mut()
            .find(|(_, a)| a.id == id)
            .ok_or_else(|| not_found("project team access", id))?;
        access.access = opts.access.clone();
        access.permissions = opts.permissions.clone();
        Ok(access.clone())
    }

    async fn remove_project_team_access(&self, id: &str) -> tfc_client::Result<()> {
        self.write().project_team_access.retain(|(_, a)| a.id != id);
        Ok(())
    }
}

#[async_trait]
impl OrganizationApi for FakeRemote {
    async fn list_organization_memberships(
        &self,
        _org: &str,
        opts: &ListOptions,
    ) -> tfc_client::Result<Page<OrganizationMembership>> {
        let items = self
            .state()
            .memberships
            .iter()
            .filter(|m| {
                opts.search
                    .as_deref()
                    .is_none_or(|s| m.email.to_lowercase().contains(&s.to_lowercase()))
            })
            .cloned()
            .collect();
        page(items, opts)
    }

    async fn list_ssh_keys(&self, _org: &str, opts: &ListOptions) -> tfc_client::Result<Page<SshKey>> {
        // The remote ignores `search` for SSH keys.
        page(self.state().ssh_keys.clone(), opts)
    }
}

#[async_trait]
impl NotificationApi for FakeRemote {
    async fn list_notifications(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> tfc_client::Result<Page<NotificationConfiguration>> {
        page(self.notifications(workspace_id), opts)
    }

    async fn create_notification(
        &self,
        workspace_id: &str,
        opts: &NotificationOptions,
    ) -> tfc_client::Result<NotificationConfiguration> {
        let mut st = self.write();
        let n = NotificationConfiguration {
            id: st.id("nc"),
            name: opts.name.clone(),
            destination_type: opts.destination_type.clone(),
            enabled: opts.enabled,
            url: opts.url.clone(),
            triggers: opts.triggers.clone(),
            email_addresses: opts.email_addresses.clone(),
            email_user_ids: opts.email_user_ids.clone(),
        };
        st.notifications.push((workspace_id.to_string(), n.clone()));
        Ok(n)
    }

    async fn update_notification(
        &self,
        id: &str,
        opts: &NotificationOptions,
    ) -> tfc_client::Result<NotificationConfiguration> {
        let mut st = self.write();
        let (_, n) = st
            .notifications
            .iter_mut()
            .find(|(_, n)| n.id == id)
            .ok_or_else(|| not_found("notification configuration", id))?;
        n.name = opts.name.clone();
        n.enabled = opts.enabled;
        n.url = opts.url.clone();
        n.triggers = opts.triggers.clone();
        n.email_addresses = opts.email_addresses.clone();
        n.email_user_ids = opts.email_user_ids.clone();
        Ok(n.clone())
    }

    async fn delete_notification(&self, id: &str) -> tfc_client::Result<()> {
        self.write().notifications.retain(|(_, n)| n.id != id);
        Ok(())
    }
}

#[async_trait]
impl RunTriggerApi for FakeRemote {
    async fn list_run_triggers(&self, workspace_id: &str, opts: &ListOptions) -> tfc_client::Result<Page<RunTrigger>> {
        let items = self
            .state()
            .run_triggers
            .iter()
            .filter(|(ws, _)| ws == workspace_id)
            .map(|(_, t)| t.clone())
            .collect();
        page(items, opts)
    }

    async fn create_run_trigger(&self, workspace_id: &str, sourceable_id: &str) -> tfc_client::Result<RunTrigger> {
        let mut st = self.write();
        let trigger = RunTrigger {
            id: st.id("rt"),
            sourceable_id: sourceable_id.to_string(),
            sourceable_name: st.workspaces.get(sourceable_id).map(|w| w.name.clone()),
        };
        st.run_triggers
            .push((workspace_id.to_string(), trigger.clone()));
        Ok(trigger)
    }

    async fn delete_run_trigger(&self, id: &str) -> tfc_client::Result<()> {
        self.write().run_triggers.retain(|(_, t)| t.id != id);
        Ok(())
    }
}

#[async_trait]
impl ProjectApi for FakeRemote {
    async fn list_projects(&self, _org: &str, opts: &ListOptions) -> tfc_client::Result<Page<Project>> {
        let items = self
            .state()
            .projects
            .values()
            .filter(|p| matches(opts, &p.name))
            .cloned()
            .collect();
        page(items, opts)
    }

    async fn create_project(&self, _org: &str, opts: &ProjectOptions) -> tfc_client::Result<Project> {
        let mut st = self.write();
        let project = Project {
            id: st.id("prj"),
            name: opts.name.clone(),
        };
        st.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn read_project(&self, id: &str) -> tfc_client::Result<Project> {
        self.project(id).ok_or_else(|| not_found("project", id))
    }

    async fn update_project(&self, id: &str, opts: &ProjectOptions) -> tfc_client::Result<Project> {
        let mut st = self.write();
        let project = st
            .projects
            .get_mut(id)
            .ok_or_else(|| not_found("project", id))?;
        project.name = opts.name.clone();
        Ok(project.clone())
    }

    async fn delete_project(&self, id: &str) -> tfc_client::Result<()> {
        let mut st = self.write();
        let in_use = st
            .workspaces
            .values()
            .any(|w| w.project_id.as_deref() == Some(id));
        if in_use || st.refuse_delete.contains(id) {
            return Err(ClientError::Conflict(format!("project {} is not empty", id)));
        }
        st.projects
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("project", id))
    }
}

#[async_trait]
impl AgentPoolApi for FakeRemote {
    async fn list_agent_pools(&self, _org: &str, opts: &ListOptions) -> tfc_client::Result<Page<AgentPool>> {
        let items = self
            .state()
            .agent_pools
            .values()
            .filter(|p| matches(opts, &p.name))
            .cloned()
            .collect();
        page(items, opts)
    }

    async fn create_agent_pool(&self, _org: &str, opts: &AgentPoolOptions) -> tfc_client::Result<AgentPool> {
        let mut st = self.write();
        let pool = AgentPool {
            id: st.id("apool"),
            name: opts.name.clone(),
            organization_scoped: opts.organization_scoped,
            workspace_ids: Vec::new(),
        };
        st.agent_pools.insert(pool.id.clone(), pool.clone());
        Ok(pool)
    }

    async fn read_agent_pool(&self, id: &str) -> tfc_client::Result<AgentPool> {
        self.agent_pool(id).ok_or_else(|| not_found("agent pool", id))
    }

    async fn update_agent_pool(&self, id: &str, opts: &AgentPoolOptions) -> tfc_client::Result<AgentPool> {
        let mut st = self.write();
        let pool = st
            .agent_pools
            .get_mut(id)
            .ok_or_else(|| not_found("agent pool", id))?;
        pool.name = opts.name.clone();
        pool.organization_scoped = opts.organization_scoped;
        Ok(pool.clone())
    }

    async fn delete_agent_pool(&self, id: &str) -> tfc_client::Result<()> {
        let mut st = self.write();
        let in_use = st
            .workspaces
            .values()
            .any(|w| w.agent_pool_id.as_deref() == Some(id));
        if in_use || st.refuse_delete.contains(id) {
            return Err(ClientError::Conflict(format!("agent pool {} is in use", id)));
        }
        st.agent_tokens.retain(|(pool, _)| pool != id);
        st.agent_pools
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("agent pool", id))
    }

    async fn list_agent_tokens(&self, pool_id: &str, opts: &ListOptions) -> tfc_client::Result<Page<AgentToken>> {
        let items = self
            .state()
            .agent_tokens
            .iter()
            .filter(|(p, _)| p == pool_id)
            .map(|(_, t)| AgentToken {
                token: None,
                ..t.clone()
            })
            .collect();
        page(items, opts)
    }

    async fn create_agent_token(&self, pool_id: &str, description: &str) -> tfc_client::Result<AgentToken> {
        let mut st = self.write();
        if !st.agent_pools.contains_key(pool_id) {
            return Err(not_found("agent pool", pool_id));
        }
        let id = st.id("at");
        let token = AgentToken {
            token: Some(format!("secret-{}", id)),
            id,
            description: description.to_string(),
            created_at: st.tick(),
            last_used_at: None,
        };
        st.agent_tokens.push((pool_id.to_string(), token.clone()));
        Ok(token)
    }

    async fn delete_agent_token(&self, id: &str) -> tfc_client::Result<()> {
        let mut st = self.write();
        let before = st.agent_tokens.len();
        st.agent_tokens.retain(|(_, t)| t.id != id);
        if st.agent_tokens.len() == before {
            return Err(not_found("agent token", id));
        }
        Ok(())
    }
}

#[async_trait]
impl RunApi for FakeRemote {
    async fn create_run(&self, opts: &RunOptions) -> tfc_client::Result<Run> {
        let mut st = self.write();
        let id = st.id("run");
        let ws = st.workspace_mut(&opts.workspace_id)?;
        ws.current_run_id = Some(id.clone());
        let run = Run {
            id: id.clone(),
            status: "pending".to_string(),
            is_destroy: opts.is_destroy,
            configuration_version_id: opts.configuration_version_id.clone(),
        };
        st.runs.insert(id, run.clone());
        Ok(run)
    }

    async fn read_run(&self, id: &str) -> tfc_client::Result<Run> {
        self.run(id).ok_or_else(|| not_found("run", id))
    }

    async fn create_configuration_version(
        &self,
        workspace_id: &str,
        _opts: &ConfigurationVersionOptions,
    ) -> tfc_client::Result<ConfigurationVersion> {
        let mut st = self.write();
        st.workspace_mut(workspace_id)?;
        let id = st.id("cv");
        let cv = ConfigurationVersion {
            upload_url: (!st.withhold_upload_url)
                .then(|| format!("https://archivist.test/v1/object/{}", id)),
            id: id.clone(),
            status: "pending".to_string(),
        };
        st.configuration_versions.insert(id, cv.clone());
        Ok(cv)
    }

    async fn read_configuration_version(&self, id: &str) -> tfc_client::Result<ConfigurationVersion> {
        self.state()
            .configuration_versions
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("configuration version", id))
    }

    async fn upload_configuration(&self, upload_url: &str, archive: Vec<u8>) -> tfc_client::Result<()> {
        let mut st = self.write();
        let id = upload_url.rsplit('/').next().unwrap_or_default().to_string();
        let cv = st
            .configuration_versions
            .get_mut(&id)
            .ok_or_else(|| not_found("configuration version", &id))?;
        cv.status = "uploaded".to_string();
        st.uploads.insert(id, archive);
        Ok(())
    }

    async fn list_current_state_outputs(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> tfc_client::Result<Page<StateOutput>> {
        let items = self.state().outputs.get(workspace_id).cloned().unwrap_or_default();
        page(items, opts)
    }
}

/// Hands out the shared [`FakeRemote`] and records the credentials used.
pub struct FakeFactory {
    remote: Arc<FakeRemote>,
    tokens: Mutex<Vec<String>>,
}

impl FakeFactory {
    pub fn new(remote: Arc<FakeRemote>) -> Self {
        Self {
            remote,
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn connections(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

impl ClientFactory for FakeFactory {
    fn connect(&self, token: &str) -> tfc_client::Result<Arc<dyn TfcApi>> {
        self.tokens.lock().unwrap().push(token.to_string());
        let api: Arc<dyn TfcApi> = self.remote.clone();
        Ok(api)
    }
}

// =============================================================================
// Harness
// =============================================================================

/// One orchestrator wired to fresh fakes.
pub struct Harness<R: Reconciler> {
    pub orchestrator: Orchestrator<R>,
    pub store: Arc<FakeStore<R::Resource>>,
    pub secrets: Arc<FakeSecrets>,
    pub events: Arc<RecordingEvents>,
    pub remote: Arc<FakeRemote>,
    pub factory: Arc<FakeFactory>,
    pub config: OperatorConfig,
}

impl<R: Reconciler> Harness<R> {
    pub fn new(reconciler: R) -> Self {
        let store = Arc::new(FakeStore::new());
        let secrets = Arc::new(FakeSecrets::new());
        let events = Arc::new(RecordingEvents::default());
        let remote = Arc::new(FakeRemote::new());
        let factory = Arc::new(FakeFactory::new(remote.clone()));
        let config = OperatorConfig::default();
        let orchestrator = Orchestrator::new(
            reconciler,
            store.clone(),
            secrets.clone(),
            events.clone(),
            factory.clone(),
            Arc::new(config.clone()),
        );
        Self {
            orchestrator,
            store,
            secrets,
            events,
            remote,
            factory,
            config,
        }
    }

    /// One reconciliation pass.
    pub async fn pass(&self, key: &ObjectKey) -> tfc_operator::Result<Action> {
        self.orchestrator.reconcile(key).await
    }

    /// Run passes until one converges and requeues for the periodic resync.
    pub async fn settle(&self, key: &ObjectKey) -> R::Resource {
        let resync = Action::requeue(self.config.sync_period);
        for _ in 0..5 {
            let action = self.pass(key).await.expect("pass succeeds");
            if action == resync {
                return self.object(key);
            }
        }
        panic!("{} did not converge", key);
    }

    /// Run passes until the object is gone from the store.
    pub async fn drain(&self, key: &ObjectKey) {
        for _ in 0..5 {
            if self.store.get_now(key).is_none() {
                return;
            }
            self.pass(key).await.expect("pass succeeds");
        }
        assert!(self.store.get_now(key).is_none(), "{} still present", key);
    }

    pub fn object(&self, key: &ObjectKey) -> R::Resource {
        self.store.get_now(key).expect("object exists")
    }
}

/// Spec JSON with the shared organization and credential filled in.
pub fn spec(mut fields: Value) -> Value {
    let obj = fields.as_object_mut().expect("spec is an object");
    obj.insert("organization".into(), json!(ORG));
    obj.insert(
        "token".into(),
        json!({"secretKeyRef": {"name": "tfc", "key": "token"}}),
    );
    fields
}

pub fn workspace(name: &str, fields: Value) -> tfc_operator::crd::Workspace {
    tfc_operator::crd::Workspace::new(name, serde_json::from_value(spec(fields)).unwrap())
}

pub fn project(name: &str, fields: Value) -> tfc_operator::crd::Project {
    tfc_operator::crd::Project::new(name, serde_json::from_value(spec(fields)).unwrap())
}

pub fn agent_pool(name: &str, fields: Value) -> tfc_operator::crd::AgentPool {
    tfc_operator::crd::AgentPool::new(name, serde_json::from_value(spec(fields)).unwrap())
}

pub fn module(name: &str, fields: Value) -> tfc_operator::crd::Module {
    tfc_operator::crd::Module::new(name, serde_json::from_value(spec(fields)).unwrap())
}
