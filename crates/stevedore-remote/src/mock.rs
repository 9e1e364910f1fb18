use crate::{ControlPlane, RemoteError};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use stevedore_types::{
    App, AppCreateOptions, AppStatus, AppUpdateOptions, Build, BuildId, Parameters, Release,
    ReleaseCreateOptions, ReleaseId, Resource,
};

/// Control-plane operation, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    AppCreate,
    AppGet,
    AppUpdate,
    BuildImport,
    BuildExport,
    ReleaseGet,
    ReleaseCreate,
    ReleasePromote,
    ResourceList,
    ResourceExport,
    ResourceImport,
}

/// One recorded call. `detail` carries the build, release, or resource the
/// call addressed, when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub app: String,
    pub detail: Option<String>,
}

/// Scripted result of the next `app_get` for an existing app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Status(AppStatus),
    /// The app disappears; this and later reads return `NotFound`.
    Missing,
}

#[derive(Default)]
struct State {
    apps: BTreeMap<String, App>,
    observations: HashMap<String, VecDeque<Observation>>,
    releases: HashMap<(String, String), Release>,
    builds: HashMap<(String, String), (Build, Vec<u8>)>,
    resources: BTreeMap<String, BTreeMap<String, (Resource, Vec<u8>)>>,
    failures: Vec<(Op, Option<String>)>,
    updates: Vec<(String, Parameters)>,
    calls: Vec<Call>,
    next_id: u64,
}

impl State {
    fn record(&mut self, op: Op, app: &str, detail: Option<&str>) -> Result<(), RemoteError> {
        self.calls.push(Call {
            op,
            app: app.to_owned(),
            detail: detail.map(str::to_owned),
        });
        let injected = self
            .failures
            .iter()
            .any(|(f, key)| *f == op && (key.is_none() || key.as_deref() == detail));
        if injected {
            return Err(RemoteError::Http(format!(
                "injected failure: {op:?} {app}{}",
                detail.map(|d| format!(" {d}")).unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn app_mut(&mut self, name: &str) -> Result<&mut App, RemoteError> {
        self.apps
            .get_mut(name)
            .ok_or_else(|| RemoteError::NotFound(format!("app {name}")))
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }
}

/// In-memory control plane with scripted status observations, a call log,
/// and failure injection.
///
/// Newly created apps report `running` unless observations are scripted
/// with [`MockControlPlane::script`].
pub struct MockControlPlane {
    state: Mutex<State>,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, RemoteError> {
        self.state
            .lock()
            .map_err(|e| RemoteError::Http(format!("mutex poisoned: {e}")))
    }

    fn inspect(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_app(&self, app: App) {
        self.inspect().apps.insert(app.name.clone(), app);
    }

    pub fn insert_release(&self, release: Release) {
        let key = (release.app.clone(), release.id.to_string());
        self.inspect().releases.insert(key, release);
    }

    pub fn insert_build(&self, build: Build, payload: &[u8]) {
        let key = (build.app.clone(), build.id.to_string());
        self.inspect().builds.insert(key, (build, payload.to_vec()));
    }

    pub fn insert_resource(&self, app: &str, resource: Resource, payload: &[u8]) {
        self.inspect()
            .resources
            .entry(app.to_owned())
            .or_default()
            .insert(resource.name.clone(), (resource, payload.to_vec()));
    }

    /// Queue observations returned by subsequent `app_get` calls for `app`.
    pub fn script(&self, app: &str, observations: impl IntoIterator<Item = Observation>) {
        self.inspect()
            .observations
            .entry(app.to_owned())
            .or_default()
            .extend(observations);
    }

    /// Make every call of `op` fail.
    pub fn fail(&self, op: Op) {
        self.inspect().failures.push((op, None));
    }

    /// Make calls of `op` addressing `detail` fail.
    pub fn fail_for(&self, op: Op, detail: &str) {
        self.inspect().failures.push((op, Some(detail.to_owned())));
    }

    pub fn app(&self, name: &str) -> Option<App> {
        self.inspect().apps.get(name).cloned()
    }

    pub fn release(&self, app: &str, id: &str) -> Option<Release> {
        self.inspect()
            .releases
            .get(&(app.to_owned(), id.to_owned()))
            .cloned()
    }

    pub fn build_payload(&self, app: &str, id: &str) -> Option<Vec<u8>> {
        self.inspect()
            .builds
            .get(&(app.to_owned(), id.to_owned()))
            .map(|(_, payload)| payload.clone())
    }

    pub fn resource_payload(&self, app: &str, name: &str) -> Option<Vec<u8>> {
        self.inspect()
            .resources
            .get(app)
            .and_then(|r| r.get(name))
            .map(|(_, payload)| payload.clone())
    }

    /// Parameter maps passed to `app_update`, in call order.
    pub fn updates(&self) -> Vec<(String, Parameters)> {
        self.inspect().updates.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inspect().calls.clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.inspect().calls.iter().map(|c| c.op).collect()
    }

    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.inspect()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }
}

impl ControlPlane for MockControlPlane {
    fn app_create(&self, name: &str, opts: &AppCreateOptions) -> Result<App, RemoteError> {
        let mut state = self.state()?;
        state.record(Op::AppCreate, name, None)?;
        if state.apps.contains_key(name) {
            return Err(RemoteError::Conflict(format!("app {name} already exists")));
        }
        let app = App {
            generation: opts.generation.clone().unwrap_or_default(),
            name: name.to_owned(),
            status: AppStatus::Running,
            ..App::default()
        };
        state.apps.insert(name.to_owned(), app.clone());
        Ok(app)
    }

    fn app_get(&self, name: &str) -> Result<App, RemoteError> {
        let mut state = self.state()?;
        state.record(Op::AppGet, name, None)?;
        state.app_mut(name)?;
        let next = state
            .observations
            .get_mut(name)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Observation::Missing) => {
                state.apps.remove(name);
                Err(RemoteError::NotFound(format!("app {name}")))
            }
            Some(Observation::Status(status)) => {
                let app = state.app_mut(name)?;
                app.status = status;
                Ok(app.clone())
            }
            None => Ok(state.app_mut(name)?.clone()),
        }
    }

    fn app_update(&self, name: &str, opts: &AppUpdateOptions) -> Result<(), RemoteError> {
        let mut state = self.state()?;
        state.record(Op::AppUpdate, name, None)?;
        let app = state.app_mut(name)?;
        app.parameters
            .extend(opts.parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        state
            .updates
            .push((name.to_owned(), opts.parameters.clone()));
        Ok(())
    }

    fn build_import(&self, app: &str, source: &mut dyn Read) -> Result<Build, RemoteError> {
        let mut state = self.state()?;
        state.record(Op::BuildImport, app, None)?;
        state.app_mut(app)?;
        let mut payload = Vec::new();
        source.read_to_end(&mut payload)?;
        let build = Build {
            id: BuildId::new(state.next_id("B")),
            app: app.to_owned(),
            status: "complete".to_owned(),
            release: None,
            description: None,
        };
        state.builds.insert(
            (app.to_owned(), build.id.to_string()),
            (build.clone(), payload),
        );
        Ok(build)
    }

    fn build_export(
        &self,
        app: &str,
        build_id: &str,
        dest: &mut dyn Write,
    ) -> Result<(), RemoteError> {
        let mut state = self.state()?;
        state.record(Op::BuildExport, app, Some(build_id))?;
        let (_, payload) = state
            .builds
            .get(&(app.to_owned(), build_id.to_owned()))
            .ok_or_else(|| RemoteError::NotFound(format!("build {build_id}")))?;
        dest.write_all(payload)?;
        Ok(())
    }

    fn release_get(&self, app: &str, release_id: &str) -> Result<Release, RemoteError> {
        let mut state = self.state()?;
        state.record(Op::ReleaseGet, app, Some(release_id))?;
        state
            .releases
            .get(&(app.to_owned(), release_id.to_owned()))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("release {release_id}")))
    }

    fn release_create(
        &self,
        app: &str,
        opts: &ReleaseCreateOptions,
    ) -> Result<Release, RemoteError> {
        let mut state = self.state()?;
        state.record(Op::ReleaseCreate, app, None)?;
        state.app_mut(app)?;
        let release = Release {
            id: ReleaseId::new(state.next_id("R")),
            app: app.to_owned(),
            build: opts.build.clone(),
            env: opts.env.clone().unwrap_or_default(),
            created: chrono::Utc::now().to_rfc3339(),
        };
        state.releases.insert(
            (app.to_owned(), release.id.to_string()),
            release.clone(),
        );
        Ok(release)
    }

    fn release_promote(&self, app: &str, release_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state()?;
        state.record(Op::ReleasePromote, app, Some(release_id))?;
        if !state
            .releases
            .contains_key(&(app.to_owned(), release_id.to_owned()))
        {
            return Err(RemoteError::NotFound(format!("release {release_id}")));
        }
        state.app_mut(app)?.release = release_id.to_owned();
        Ok(())
    }

    fn resource_list(&self, app: &str) -> Result<Vec<Resource>, RemoteError> {
        let mut state = self.state()?;
        state.record(Op::ResourceList, app, None)?;
        state.app_mut(app)?;
        Ok(state
            .resources
            .get(app)
            .map(|r| r.values().map(|(res, _)| res.clone()).collect())
            .unwrap_or_default())
    }

    fn resource_export(&self, app: &str, name: &str) -> Result<Box<dyn Read>, RemoteError> {
        let mut state = self.state()?;
        state.record(Op::ResourceExport, app, Some(name))?;
        let (_, payload) = state
            .resources
            .get(app)
            .and_then(|r| r.get(name))
            .ok_or_else(|| RemoteError::NotFound(format!("resource {name}")))?;
        Ok(Box::new(std::io::Cursor::new(payload.clone())))
    }

    fn resource_import(
        &self,
        app: &str,
        name: &str,
        source: &mut dyn Read,
    ) -> Result<(), RemoteError> {
        let mut state = self.state()?;
        state.record(Op::ResourceImport, app, Some(name))?;
        state.app_mut(app)?;
        let mut payload = Vec::new();
        source.read_to_end(&mut payload)?;
        let resource = Resource {
            name: name.to_owned(),
            kind: String::new(),
        };
        state
            .resources
            .entry(app.to_owned())
            .or_default()
            .insert(name.to_owned(), (resource, payload));
        Ok(())
    }
}
