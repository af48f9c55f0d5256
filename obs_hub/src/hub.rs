use crate::aux_sync::AuxiliarySourceSync;
use crate::client::{ObsApi, ObsEvent};
use crate::coalescer::NotificationCoalescer;
use crate::config::HubConfig;
use crate::error::HubError;
use crate::lock;
use crate::mirror::{MirrorState, RemoteStateMirror, Role, Scene, SceneView, TrackedSource};
use crate::supervisor::{ConnectionState, ConnectionSupervisor};
use crate::transition::TransitionScheduler;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const NUDGE_DB: f64 = 0.5;

/// What the notification sink receives.
#[derive(Serialize, Debug, Clone)]
pub struct HubSnapshot {
    pub connection: ConnectionState,
    pub scenes: Vec<Scene>,
    pub preview: SceneView,
    pub program: SceneView,
    pub target_db: f64,
    pub crossfade_secs: f64,
    pub visual_delay_secs: f64,
    pub transition_running: bool,
}

impl HubSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }
}

fn take_snapshot(
    state: &Mutex<MirrorState>,
    supervisor: &ConnectionSupervisor,
    transition: &TransitionScheduler,
) -> HubSnapshot {
    let connection = supervisor.state();
    let transition_running = transition.is_running();
    let st = lock(state);
    HubSnapshot {
        connection,
        scenes: st.scenes.clone(),
        preview: st.preview.clone(),
        program: st.program.clone(),
        target_db: st.transition.target_db,
        crossfade_secs: st.transition.crossfade_secs,
        visual_delay_secs: st.transition.visual_delay_secs,
        transition_running,
    }
}

fn log_failure(op: &'static str, result: Result<(), HubError>) {
    if let Err(e) = result {
        warn!(op, "{e}");
    }
}

/// The surface collaborators drive. Operations are silent no-ops while
/// disconnected or when the source they act on is not cached.
#[derive(Clone)]
pub struct ObsHub {
    state: Arc<Mutex<MirrorState>>,
    supervisor: ConnectionSupervisor,
    mirror: RemoteStateMirror,
    coalescer: NotificationCoalescer,
    transition: TransitionScheduler,
    aux: AuxiliarySourceSync,
    event_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ObsHub {
    pub fn new(
        config: &HubConfig,
        api: Arc<dyn ObsApi>,
        sink: impl Fn(HubSnapshot) + Send + Sync + 'static,
    ) -> Self {
        let state = Arc::new(Mutex::new(MirrorState::new(config)));
        let supervisor = ConnectionSupervisor::new(Arc::clone(&api), config.reconnect_interval);
        let mirror = RemoteStateMirror::new(Arc::clone(&api), Arc::clone(&state));
        let transition = TransitionScheduler::new(Arc::clone(&api), Arc::clone(&state));
        let aux = AuxiliarySourceSync::new(api, config.aux_scene.clone());

        let coalescer = {
            let state = Arc::clone(&state);
            let supervisor = supervisor.clone();
            let transition = transition.clone();
            NotificationCoalescer::new(config.notify_interval, move || {
                sink(take_snapshot(&state, &supervisor, &transition))
            })
        };

        Self {
            state,
            supervisor,
            mirror,
            coalescer,
            transition,
            aux,
            event_loop: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawns the event loop and begins connecting.
    pub fn start(&self, mut events: mpsc::Receiver<ObsEvent>) {
        let hub = self.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                hub.handle(event);
            }
            debug!("event channel closed");
        });
        if let Some(prev) = lock(&self.event_loop).replace(task) {
            prev.abort();
        }
        self.supervisor.start();
    }

    pub fn shutdown(&self) {
        if let Some(task) = lock(&self.event_loop).take() {
            task.abort();
        }
        self.supervisor.shutdown();
        self.coalescer.cancel();
        self.transition.shutdown();
        info!("hub stopped");
    }

    fn handle(&self, event: ObsEvent) {
        match event {
            ObsEvent::ConnectionOpened => {
                self.supervisor.on_opened();
                let hub = self.clone();
                tokio::spawn(async move { hub.sync_after_connect().await });
            }
            ObsEvent::ConnectionClosed => {
                if self.supervisor.on_closed() {
                    self.mirror.reset_disconnected();
                    self.aux.clear();
                    self.coalescer.notify();
                }
            }
            ObsEvent::ProgramSceneChanged { scene_name } => {
                self.spawn_refresh(Role::Program, scene_name)
            }
            ObsEvent::PreviewSceneChanged { scene_name } => {
                self.spawn_refresh(Role::Preview, scene_name)
            }
            ObsEvent::SceneListChanged => {
                let hub = self.clone();
                tokio::spawn(async move {
                    match hub.mirror.refresh_scene_list().await {
                        Ok(_) => hub.coalescer.notify(),
                        Err(e) => warn!("scene list refresh failed: {e}"),
                    }
                });
            }
            ObsEvent::InputVolumeChanged { input_name, volume_db } => {
                if self.mirror.apply_volume(&input_name, volume_db) {
                    self.coalescer.notify();
                }
            }
            ObsEvent::InputMuteChanged { input_name, muted } => {
                if self.mirror.apply_mute(&input_name, muted) {
                    self.coalescer.notify();
                }
            }
        }
    }

    async fn sync_after_connect(&self) {
        if let Err(e) = self.mirror.sync_on_connect().await {
            warn!("initial sync failed: {e}");
        }
        match self.aux.load().await {
            Ok(_) => self.sync_aux().await,
            Err(e) => warn!("aux scene unavailable: {e}"),
        }
        self.coalescer.notify();
    }

    fn spawn_refresh(&self, role: Role, scene_name: String) {
        let hub = self.clone();
        tokio::spawn(async move {
            match hub.mirror.update_scene(role, &scene_name).await {
                Ok(false) => return,
                Ok(true) => hub.sync_aux().await,
                Err(e) => warn!(?role, scene = %scene_name, "source refresh failed: {e}"),
            }
            hub.coalescer.notify();
        });
    }

    async fn sync_aux(&self) {
        let active = lock(&self.state).active_source_names();
        self.aux.sync(&active).await;
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn snapshot(&self) -> HubSnapshot {
        take_snapshot(&self.state, &self.supervisor, &self.transition)
    }

    pub fn scenes(&self) -> Vec<Scene> {
        lock(&self.state).scenes.clone()
    }

    pub fn preview_scene_name(&self) -> String {
        lock(&self.state).preview.name.clone()
    }

    pub fn program_scene_name(&self) -> String {
        lock(&self.state).program.name.clone()
    }

    pub fn preview_sources(&self) -> Vec<TrackedSource> {
        lock(&self.state).preview.sources.clone()
    }

    pub fn program_sources(&self) -> Vec<TrackedSource> {
        lock(&self.state).program.sources.clone()
    }

    pub fn transition_running(&self) -> bool {
        self.transition.is_running()
    }

    pub fn transition_target_db(&self) -> f64 {
        lock(&self.state).transition.target_db
    }

    pub fn set_transition_target_db(&self, db: f64) {
        lock(&self.state).transition.target_db = db;
    }

    pub fn transition_crossfade_duration_secs(&self) -> f64 {
        lock(&self.state).transition.crossfade_secs
    }

    pub fn set_transition_crossfade_duration_secs(&self, secs: f64) {
        lock(&self.state).transition.crossfade_secs = secs;
    }

    pub fn transition_visual_delay_secs(&self) -> f64 {
        lock(&self.state).transition.visual_delay_secs
    }

    pub fn set_transition_visual_delay_secs(&self, secs: f64) {
        lock(&self.state).transition.visual_delay_secs = secs;
    }

    /// Re-reads the scene list; `None` while disconnected or on failure.
    pub async fn fetch_scene_list(&self) -> Option<Vec<Scene>> {
        if !self.is_connected() {
            return None;
        }
        match self.mirror.refresh_scene_list().await {
            Ok(scenes) => {
                self.coalescer.notify();
                Some(scenes)
            }
            Err(e) => {
                warn!(op = "fetch_scene_list", "{e}");
                None
            }
        }
    }

    pub async fn next_preview_scene(&self) {
        self.step_preview(1).await
    }

    pub async fn prev_preview_scene(&self) {
        self.step_preview(-1).await
    }

    async fn step_preview(&self, delta: isize) {
        if !self.is_connected() {
            return;
        }
        match self.mirror.step_preview(delta).await {
            Ok(Some(scene)) => debug!(scene = %scene, "preview scene requested"),
            Ok(None) => {}
            Err(e) => warn!(op = "step_preview", "{e}"),
        }
    }

    /// Also makes `db` the crossfade target.
    pub async fn set_preview_source_volume(&self, db: f64) {
        if !self.is_connected() {
            return;
        }
        {
            let mut st = lock(&self.state);
            if st.primary(Role::Preview).is_none() {
                return;
            }
            st.transition.target_db = db;
        }
        log_failure(
            "set_preview_source_volume",
            self.mirror.set_volume(Role::Preview, db).await,
        );
    }

    pub async fn mute_preview_source(&self) {
        if self.is_connected() {
            log_failure("mute_preview_source", self.mirror.set_mute(Role::Preview, true).await);
        }
    }

    pub async fn unmute_preview_source(&self) {
        if self.is_connected() {
            log_failure("unmute_preview_source", self.mirror.set_mute(Role::Preview, false).await);
        }
    }

    pub async fn play_pause_preview_source(&self) {
        if self.is_connected() {
            log_failure("play_pause_preview_source", self.mirror.play_pause(Role::Preview).await);
        }
    }

    pub async fn play_pause_program_source(&self) {
        if self.is_connected() {
            log_failure("play_pause_program_source", self.mirror.play_pause(Role::Program).await);
        }
    }

    pub async fn reload_preview_source(&self) {
        if self.is_connected() {
            log_failure("reload_preview_source", self.mirror.reload(Role::Preview).await);
        }
    }

    pub async fn reload_program_source(&self) {
        if self.is_connected() {
            log_failure("reload_program_source", self.mirror.reload(Role::Program).await);
        }
    }

    pub async fn retransform_preview_source(&self) {
        if self.is_connected() {
            log_failure("retransform_preview_source", self.mirror.retransform_preview().await);
        }
    }

    /// Returns whether a transition was started.
    pub fn transition(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.transition.transition()
    }

    pub async fn tt_advance(&self) {
        if self.is_connected() {
            log_failure("tt_advance", self.transition.advance_timetable().await);
        }
    }

    pub async fn tt_retract(&self) {
        if self.is_connected() {
            log_failure("tt_retract", self.transition.retract_timetable().await);
        }
    }

    pub async fn nudge_program_softer(&self) {
        self.nudge(Role::Program, -NUDGE_DB).await
    }

    pub async fn nudge_program_louder(&self) {
        self.nudge(Role::Program, NUDGE_DB).await
    }

    pub async fn nudge_preview_softer(&self) {
        self.nudge(Role::Preview, -NUDGE_DB).await
    }

    pub async fn nudge_preview_louder(&self) {
        self.nudge(Role::Preview, NUDGE_DB).await
    }

    async fn nudge(&self, role: Role, delta_db: f64) {
        if self.is_connected() {
            log_failure("nudge", self.transition.nudge(role, delta_db).await);
        }
    }
}
