use crate::client::ObsApi;
use crate::config::{HubConfig, TimetablePolarity};
use crate::error::HubError;
use crate::lock;
use crate::requests;
use obs_protocol::responses::SceneEntry;
use obs_protocol::{status, BOUNDS_SCALE_INNER};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub const UNKNOWN_SCENE: &str = "unknown";
pub const MEDIA_INPUT_KIND: &str = "ffmpeg_source";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Preview,
    Program,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Scene {
    pub name: String,
    pub position: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TrackedSource {
    pub name: String,
    pub scene_item_id: i64,
    pub volume_db: f64,
    pub muted: bool,
    pub is_local_file: bool,
    pub status: String,
}

impl TrackedSource {
    pub fn new(
        name: String,
        scene_item_id: i64,
        volume_db: f64,
        muted: bool,
        is_local_file: bool,
    ) -> Self {
        let mut source = Self {
            name,
            scene_item_id,
            volume_db,
            muted,
            is_local_file,
            status: String::new(),
        };
        source.refresh_status();
        source
    }

    pub fn refresh_status(&mut self) {
        self.status = format!(
            "{}\n{:.1} dB\n{}",
            self.name,
            self.volume_db,
            if self.muted { "Muted" } else { "Unmuted" }
        );
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct SceneView {
    pub name: String,
    pub index: Option<usize>,
    pub sources: Vec<TrackedSource>,
    #[serde(skip)]
    generation: u64,
}

impl SceneView {
    fn unknown() -> Self {
        Self {
            name: UNKNOWN_SCENE.to_string(),
            index: None,
            sources: Vec::new(),
            generation: 0,
        }
    }

    pub fn primary(&self) -> Option<&TrackedSource> {
        self.sources.first()
    }

    pub fn primary_mut(&mut self) -> Option<&mut TrackedSource> {
        self.sources.first_mut()
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct TransitionSettings {
    pub target_db: f64,
    pub crossfade_secs: f64,
    pub visual_delay_secs: f64,
    pub polarity: TimetablePolarity,
}

#[derive(Debug)]
pub struct MirrorState {
    pub scenes: Vec<Scene>,
    pub preview: SceneView,
    pub program: SceneView,
    pub transition: TransitionSettings,
}

impl MirrorState {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            scenes: Vec::new(),
            preview: SceneView::unknown(),
            program: SceneView::unknown(),
            transition: TransitionSettings {
                target_db: config.transition_target_db,
                crossfade_secs: config.transition_crossfade_secs,
                visual_delay_secs: config.transition_visual_delay_secs,
                polarity: config.timetable_polarity,
            },
        }
    }

    pub fn view(&self, role: Role) -> &SceneView {
        match role {
            Role::Preview => &self.preview,
            Role::Program => &self.program,
        }
    }

    pub fn view_mut(&mut self, role: Role) -> &mut SceneView {
        match role {
            Role::Preview => &mut self.preview,
            Role::Program => &mut self.program,
        }
    }

    pub fn primary(&self, role: Role) -> Option<&TrackedSource> {
        self.view(role).primary()
    }

    pub fn primary_mut(&mut self, role: Role) -> Option<&mut TrackedSource> {
        self.view_mut(role).primary_mut()
    }

    fn scene_index(&self, name: &str) -> Option<usize> {
        self.scenes.iter().position(|s| s.name == name)
    }

    /// Names of every source shown in either role.
    pub fn active_source_names(&self) -> BTreeSet<String> {
        self.preview
            .sources
            .iter()
            .chain(self.program.sources.iter())
            .map(|s| s.name.clone())
            .collect()
    }

    /// Applies `f` to every cached source named `name`, in either role.
    pub fn update_source_named(&mut self, name: &str, mut f: impl FnMut(&mut TrackedSource)) {
        for source in self
            .preview
            .sources
            .iter_mut()
            .chain(self.program.sources.iter_mut())
            .filter(|s| s.name == name)
        {
            f(source);
            source.refresh_status();
        }
    }
}

/// Orders scenes top-to-bottom as they appear in the remote's scene list.
pub fn order_scenes(mut entries: Vec<SceneEntry>) -> Vec<Scene> {
    entries.sort_by(|a, b| b.scene_index.cmp(&a.scene_index));
    entries
        .into_iter()
        .enumerate()
        .map(|(position, e)| Scene {
            name: e.scene_name,
            position,
        })
        .collect()
}

/// Cached view of the remote scene graph. Mutators issue remote calls only;
/// the cache follows the push events those calls cause.
#[derive(Clone)]
pub struct RemoteStateMirror {
    api: Arc<dyn ObsApi>,
    state: Arc<Mutex<MirrorState>>,
}

impl RemoteStateMirror {
    pub fn new(api: Arc<dyn ObsApi>, state: Arc<Mutex<MirrorState>>) -> Self {
        Self { api, state }
    }

    pub fn state(&self) -> MutexGuard<'_, MirrorState> {
        lock(&self.state)
    }

    pub async fn refresh_scene_list(&self) -> Result<Vec<Scene>, HubError> {
        let list = requests::get_scene_list(self.api.as_ref()).await?;
        let scenes = order_scenes(list.scenes);

        let mut st = self.state();
        st.scenes = scenes.clone();
        st.preview.index = st.scene_index(&st.preview.name);
        st.program.index = st.scene_index(&st.program.name);
        Ok(scenes)
    }

    /// Full resync after a (re)connect. Preview is best effort: the remote
    /// rejects it outside studio mode.
    pub async fn sync_on_connect(&self) -> Result<(), HubError> {
        {
            let mut st = self.state();
            st.preview = SceneView {
                generation: st.preview.generation + 1,
                ..SceneView::unknown()
            };
            st.program = SceneView {
                generation: st.program.generation + 1,
                ..SceneView::unknown()
            };
        }

        self.refresh_scene_list().await?;
        let program = requests::get_current_program_scene(self.api.as_ref()).await?;
        self.update_scene(Role::Program, &program).await?;

        match requests::get_current_preview_scene(self.api.as_ref()).await {
            Ok(preview) => {
                self.update_scene(Role::Preview, &preview).await?;
            }
            Err(e) if e.is_status(status::STUDIO_MODE_NOT_ACTIVE) => {
                info!("studio mode is off; preview scene unavailable");
            }
            Err(e) => info!("preview scene unavailable: {e}"),
        }
        Ok(())
    }

    /// Re-fetches the sources of the scene now shown in `role`.
    ///
    /// Returns `Ok(false)` when a newer refresh for the same role started
    /// while this one was in flight; its result is discarded.
    pub async fn update_scene(&self, role: Role, scene_name: &str) -> Result<bool, HubError> {
        let generation = {
            let mut st = self.state();
            let index = st.scene_index(scene_name);
            let view = st.view_mut(role);
            view.generation += 1;
            view.name = scene_name.to_string();
            view.index = index;
            view.generation
        };

        let sources = self.fetch_sources(scene_name).await?;

        let mut st = self.state();
        if st.view(role).generation != generation {
            debug!(?role, scene = scene_name, "discarding stale source refresh");
            return Ok(false);
        }
        st.view_mut(role).sources = sources;
        if role == Role::Preview {
            if let Some(db) = st.preview.primary().map(|s| s.volume_db) {
                st.transition.target_db = db;
            }
        }
        Ok(true)
    }

    pub async fn fetch_sources(&self, scene_name: &str) -> Result<Vec<TrackedSource>, HubError> {
        let api = self.api.as_ref();
        let items = requests::get_scene_item_list(api, scene_name).await?;

        let mut sources = Vec::new();
        for item in items
            .into_iter()
            .filter(|i| i.input_kind.as_deref() == Some(MEDIA_INPUT_KIND))
        {
            let volume_db = requests::get_input_volume_db(api, &item.source_name).await?;
            let muted = requests::get_input_mute(api, &item.source_name).await?;
            let settings = requests::get_input_settings(api, &item.source_name).await?;
            // Absent means the remote default, which is a local file.
            let is_local_file = settings
                .get("is_local_file")
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            sources.push(TrackedSource::new(
                item.source_name,
                item.scene_item_id,
                volume_db,
                muted,
                is_local_file,
            ));
        }
        Ok(sources)
    }

    /// Steps the preview selection by `delta` positions. No-op past either end.
    /// An unknown selection counts as sitting just before the first scene.
    pub async fn step_preview(&self, delta: isize) -> Result<Option<String>, HubError> {
        let target = {
            let st = self.state();
            let next = match st.preview.index {
                Some(current) => current.checked_add_signed(delta),
                None => delta.checked_sub(1).and_then(|d| usize::try_from(d).ok()),
            };
            let Some(next) = next else {
                return Ok(None);
            };
            let Some(scene) = st.scenes.get(next) else {
                return Ok(None);
            };
            scene.name.clone()
        };
        requests::set_current_preview_scene(self.api.as_ref(), &target).await?;
        Ok(Some(target))
    }

    /// Push handler; only the tracked primaries are updated.
    pub fn apply_volume(&self, input_name: &str, volume_db: f64) -> bool {
        self.apply_to_primary(input_name, |s| s.volume_db = volume_db)
    }

    pub fn apply_mute(&self, input_name: &str, muted: bool) -> bool {
        self.apply_to_primary(input_name, |s| s.muted = muted)
    }

    fn apply_to_primary(&self, input_name: &str, f: impl FnOnce(&mut TrackedSource)) -> bool {
        let mut st = self.state();
        let is_primary = |view: &SceneView| view.primary().is_some_and(|s| s.name == input_name);
        let role = if is_primary(&st.preview) {
            Role::Preview
        } else if is_primary(&st.program) {
            Role::Program
        } else {
            return false;
        };
        let Some(source) = st.view_mut(role).sources.first_mut() else {
            return false;
        };
        f(source);
        source.refresh_status();
        true
    }

    pub fn reset_disconnected(&self) {
        let mut st = self.state();
        st.scenes.clear();
        for role in [Role::Preview, Role::Program] {
            let view = st.view_mut(role);
            view.generation += 1;
            view.name = UNKNOWN_SCENE.to_string();
            view.index = None;
            view.sources.clear();
        }
    }

    pub async fn set_volume(&self, role: Role, db: f64) -> Result<(), HubError> {
        let Some(name) = self.primary_name(role) else {
            return Ok(());
        };
        requests::set_input_volume_db(self.api.as_ref(), &name, db).await
    }

    pub async fn set_mute(&self, role: Role, muted: bool) -> Result<(), HubError> {
        let Some(name) = self.primary_name(role) else {
            return Ok(());
        };
        requests::set_input_mute(self.api.as_ref(), &name, muted).await
    }

    /// The remote only has explicit play and pause actions, so the toggle
    /// reads the current media state first.
    pub async fn play_pause(&self, role: Role) -> Result<(), HubError> {
        let Some(name) = self.primary_name(role) else {
            return Ok(());
        };
        let api = self.api.as_ref();
        let state = requests::get_media_state(api, &name).await?;
        let action = if state == obs_protocol::MEDIA_STATE_PLAYING {
            obs_protocol::media_action::PAUSE
        } else {
            obs_protocol::media_action::PLAY
        };
        requests::trigger_media_action(api, &name, action).await
    }

    /// Re-applies the input's own settings, which makes the remote reopen it.
    pub async fn reload(&self, role: Role) -> Result<(), HubError> {
        let Some(name) = self.primary_name(role) else {
            return Ok(());
        };
        let api = self.api.as_ref();
        let settings = requests::get_input_settings(api, &name).await?;
        requests::set_input_settings(api, &name, settings).await
    }

    /// Fits the preview primary to the canvas, anchored top-left.
    pub async fn retransform_preview(&self) -> Result<(), HubError> {
        let (scene, item_id) = {
            let st = self.state();
            let Some(source) = st.preview.primary() else {
                return Ok(());
            };
            (st.preview.name.clone(), source.scene_item_id)
        };
        let api = self.api.as_ref();
        let current = requests::get_scene_item_transform(api, &scene, item_id).await?;
        let video = requests::get_video_settings(api).await?;
        debug!(scene = %scene, item_id, ?current, "retransforming preview source");

        let transform = json!({
            "positionX": 0.0,
            "positionY": 0.0,
            "rotation": 0.0,
            "alignment": 5,
            "boundsType": BOUNDS_SCALE_INNER,
            "boundsAlignment": 0,
            "boundsWidth": video.base_width,
            "boundsHeight": video.base_height,
            "cropLeft": 0,
            "cropRight": 0,
            "cropTop": 0,
            "cropBottom": 0,
        });
        requests::set_scene_item_transform(api, &scene, item_id, transform).await
    }

    fn primary_name(&self, role: Role) -> Option<String> {
        self.state().primary(role).map(|s| s.name.clone())
    }
}
