#![allow(dead_code)]

use async_trait::async_trait;
use obs_hub::{HubError, HubSnapshot, ObsApi, ObsEvent};
use obs_protocol::{request_type as rt, status};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const MEDIA: &str = "ffmpeg_source";

#[derive(Debug, Clone)]
pub struct Call {
    pub request_type: String,
    pub data: Value,
    pub at: Duration,
}

impl Call {
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }
}

#[derive(Debug, Clone)]
pub struct FakeInput {
    pub kind: String,
    pub volume_db: f64,
    pub muted: bool,
    pub settings: Value,
    pub media_state: String,
}

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub id: i64,
    pub source: String,
    pub enabled: bool,
}

#[derive(Debug, Default)]
pub struct World {
    /// Top-to-bottom as an operator sees the list.
    pub scenes: Vec<String>,
    pub items: HashMap<String, Vec<FakeItem>>,
    pub inputs: HashMap<String, FakeInput>,
    pub program: String,
    /// `None` means studio mode is off.
    pub preview: Option<String>,
    pub online: bool,
    pub echo_events: bool,
    pub failing: HashSet<String>,
    pub item_list_delay: HashMap<String, Duration>,
}

impl World {
    pub fn scene(&mut self, name: &str, sources: &[&str]) -> &mut Self {
        self.scenes.push(name.to_string());
        let next_id = self.items.values().map(Vec::len).sum::<usize>() as i64 + 1;
        let items = sources
            .iter()
            .enumerate()
            .map(|(i, s)| FakeItem {
                id: next_id + i as i64,
                source: s.to_string(),
                enabled: true,
            })
            .collect();
        self.items.insert(name.to_string(), items);
        self
    }

    pub fn media(
        &mut self,
        name: &str,
        volume_db: f64,
        muted: bool,
        local: Option<bool>,
    ) -> &mut Self {
        let path = format!("/media/{name}");
        let settings = match local {
            Some(local) => json!({ "is_local_file": local, "local_file": path }),
            None => json!({ "local_file": path }),
        };
        self.inputs.insert(
            name.to_string(),
            FakeInput {
                kind: MEDIA.to_string(),
                volume_db,
                muted,
                settings,
                media_state: "OBS_MEDIA_STATE_PAUSED".to_string(),
            },
        );
        self
    }

    pub fn other(&mut self, name: &str, kind: &str) -> &mut Self {
        self.inputs.insert(
            name.to_string(),
            FakeInput {
                kind: kind.to_string(),
                volume_db: 0.0,
                muted: false,
                settings: json!({}),
                media_state: "OBS_MEDIA_STATE_NONE".to_string(),
            },
        );
        self
    }
}

/// In-memory stand-in for obs-websocket: answers requests from `World`,
/// records every call with its offset from construction.
pub struct FakeObs {
    pub world: Mutex<World>,
    calls: Mutex<Vec<Call>>,
    connect_attempts: Mutex<Vec<Duration>>,
    events: mpsc::Sender<ObsEvent>,
    epoch: Instant,
}

impl FakeObs {
    pub fn new(world: World) -> (Arc<Self>, mpsc::Receiver<ObsEvent>) {
        let (tx, rx) = mpsc::channel(obs_hub::EVENT_CAP);
        let fake = Arc::new(Self {
            world: Mutex::new(world),
            calls: Mutex::new(Vec::new()),
            connect_attempts: Mutex::new(Vec::new()),
            events: tx,
            epoch: Instant::now(),
        });
        (fake, rx)
    }

    pub fn world(&self) -> std::sync::MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, request_type: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.request_type == request_type)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn connect_attempts(&self) -> Vec<Duration> {
        self.connect_attempts.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        Instant::now() - self.epoch
    }

    pub async fn push(&self, event: ObsEvent) {
        self.events.send(event).await.unwrap();
    }

    /// Simulates the remote going away.
    pub async fn drop_link(&self, stay_offline: bool) {
        self.world().online = !stay_offline;
        self.push(ObsEvent::ConnectionClosed).await;
    }

    fn fail(request_type: &str, code: u16) -> HubError {
        HubError::Request {
            request_type: request_type.to_string(),
            code,
            comment: Some("fake".to_string()),
        }
    }

    async fn echo(&self, events: Vec<ObsEvent>) {
        if !self.world().echo_events {
            return;
        }
        for ev in events {
            let _ = self.events.send(ev).await;
        }
    }

    fn respond(
        &self,
        request_type: &str,
        data: &Value,
    ) -> Result<(Value, Vec<ObsEvent>), HubError> {
        let s = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or("").to_string();
        let missing = || Self::fail(request_type, status::RESOURCE_NOT_FOUND);
        let mut w = self.world();
        if w.failing.contains(request_type) {
            return Err(missing());
        }

        let mut events = Vec::new();
        let body = match request_type {
            rt::GET_SCENE_LIST => {
                let n = w.scenes.len();
                let scenes: Vec<Value> = w
                    .scenes
                    .iter()
                    .enumerate()
                    .map(|(i, name)| json!({ "sceneName": name, "sceneIndex": n - 1 - i }))
                    .collect();
                json!({
                    "currentProgramSceneName": w.program,
                    "currentPreviewSceneName": w.preview,
                    "scenes": scenes,
                })
            }
            rt::GET_CURRENT_PROGRAM_SCENE => json!({ "currentProgramSceneName": w.program }),
            rt::GET_CURRENT_PREVIEW_SCENE => match &w.preview {
                Some(p) => json!({ "currentPreviewSceneName": p }),
                None => return Err(Self::fail(request_type, status::STUDIO_MODE_NOT_ACTIVE)),
            },
            rt::SET_CURRENT_PREVIEW_SCENE => {
                let scene = s("sceneName");
                w.preview = Some(scene.clone());
                events.push(ObsEvent::PreviewSceneChanged { scene_name: scene });
                json!({})
            }
            rt::GET_SCENE_ITEM_LIST => {
                let Some(items) = w.items.get(&s("sceneName")) else {
                    return Err(missing());
                };
                let items: Vec<Value> = items
                    .iter()
                    .map(|i| {
                        json!({
                            "sceneItemId": i.id,
                            "sourceName": i.source,
                            "inputKind": w.inputs.get(&i.source).map(|inp| inp.kind.clone()),
                            "sceneItemEnabled": i.enabled,
                        })
                    })
                    .collect();
                json!({ "sceneItems": items })
            }
            rt::GET_INPUT_VOLUME => {
                let input = w.inputs.get(&s("inputName")).ok_or_else(missing)?;
                json!({ "inputVolumeDb": input.volume_db, "inputVolumeMul": 1.0 })
            }
            rt::SET_INPUT_VOLUME => {
                let name = s("inputName");
                let db = data.get("inputVolumeDb").and_then(Value::as_f64).unwrap_or(0.0);
                if let Some(input) = w.inputs.get_mut(&name) {
                    input.volume_db = db;
                }
                events.push(ObsEvent::InputVolumeChanged { input_name: name, volume_db: db });
                json!({})
            }
            rt::GET_INPUT_MUTE => {
                let input = w.inputs.get(&s("inputName")).ok_or_else(missing)?;
                json!({ "inputMuted": input.muted })
            }
            rt::SET_INPUT_MUTE => {
                let name = s("inputName");
                let muted = data.get("inputMuted").and_then(Value::as_bool).unwrap_or(false);
                if let Some(input) = w.inputs.get_mut(&name) {
                    input.muted = muted;
                }
                events.push(ObsEvent::InputMuteChanged { input_name: name, muted });
                json!({})
            }
            rt::GET_INPUT_SETTINGS => {
                let input = w.inputs.get(&s("inputName")).ok_or_else(missing)?;
                json!({ "inputSettings": input.settings, "inputKind": input.kind })
            }
            rt::GET_MEDIA_INPUT_STATUS => {
                let input = w.inputs.get(&s("inputName")).ok_or_else(missing)?;
                json!({ "mediaState": input.media_state })
            }
            rt::TRIGGER_MEDIA_INPUT_ACTION => {
                let playing = s("mediaAction") == obs_protocol::media_action::PLAY;
                if let Some(input) = w.inputs.get_mut(&s("inputName")) {
                    input.media_state = if playing {
                        obs_protocol::MEDIA_STATE_PLAYING.to_string()
                    } else {
                        "OBS_MEDIA_STATE_PAUSED".to_string()
                    };
                }
                json!({})
            }
            rt::TRIGGER_STUDIO_MODE_TRANSITION => {
                let Some(preview) = w.preview.clone() else {
                    return Err(Self::fail(request_type, status::STUDIO_MODE_NOT_ACTIVE));
                };
                let program = std::mem::replace(&mut w.program, preview.clone());
                w.preview = Some(program.clone());
                events.push(ObsEvent::ProgramSceneChanged { scene_name: preview });
                events.push(ObsEvent::PreviewSceneChanged { scene_name: program });
                json!({})
            }
            rt::GET_SCENE_ITEM_TRANSFORM => json!({
                "sceneItemTransform": { "positionX": 12.0, "positionY": 40.0, "cropLeft": 8 }
            }),
            rt::GET_VIDEO_SETTINGS => json!({
                "baseWidth": 1920.0, "baseHeight": 1080.0,
                "outputWidth": 1280.0, "outputHeight": 720.0,
                "fpsNumerator": 30, "fpsDenominator": 1,
            }),
            rt::SET_SCENE_ITEM_ENABLED => {
                let scene = s("sceneName");
                let id = data.get("sceneItemId").and_then(Value::as_i64).unwrap_or(-1);
                let enabled = data
                    .get("sceneItemEnabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if let Some(item) = w
                    .items
                    .get_mut(&scene)
                    .and_then(|items| items.iter_mut().find(|i| i.id == id))
                {
                    item.enabled = enabled;
                }
                json!({})
            }
            _ => json!({}),
        };
        Ok((body, events))
    }
}

#[async_trait]
impl ObsApi for FakeObs {
    async fn connect(&self) -> Result<(), HubError> {
        self.connect_attempts.lock().unwrap().push(self.elapsed());
        if !self.world().online {
            return Err(HubError::Handshake("connection refused".to_string()));
        }
        let _ = self.events.send(ObsEvent::ConnectionOpened).await;
        Ok(())
    }

    async fn call(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> Result<Value, HubError> {
        let data = request_data.unwrap_or(Value::Null);
        self.calls.lock().unwrap().push(Call {
            request_type: request_type.to_string(),
            data: data.clone(),
            at: self.elapsed(),
        });

        if request_type == rt::GET_SCENE_ITEM_LIST {
            let scene = data.get("sceneName").and_then(Value::as_str).unwrap_or("");
            let delay = self.world().item_list_delay.get(scene).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }

        let (body, events) = self.respond(request_type, &data)?;
        self.echo(events).await;
        Ok(body)
    }
}

/// Collects every snapshot handed to the sink.
#[derive(Clone, Default)]
pub struct Snapshots(Arc<Mutex<Vec<(Duration, HubSnapshot)>>>);

impl Snapshots {
    pub fn sink(&self, epoch: Instant) -> impl Fn(HubSnapshot) + Send + Sync + 'static {
        let store = Arc::clone(&self.0);
        move |snap| store.lock().unwrap().push((Instant::now() - epoch, snap))
    }

    pub fn all(&self) -> Vec<(Duration, HubSnapshot)> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<HubSnapshot> {
        self.0.lock().unwrap().last().map(|(_, s)| s.clone())
    }
}

/// Intro (intro.mp4 -10 dB) staged over Main (main.mp4 0 dB), studio mode on.
pub fn broadcast_world() -> World {
    let mut w = World {
        online: true,
        echo_events: true,
        ..World::default()
    };
    w.scene("Intro", &["intro.mp4", "intro-title"])
        .scene("Main", &["main.mp4"])
        .scene("Break", &["break.mp4", "music.mp3"])
        .scene("Outro", &["outro.mp4"])
        .scene("All Sources", &["intro.mp4", "main.mp4", "break.mp4", "outro.mp4"])
        .media("intro.mp4", -10.0, false, None)
        .media("main.mp4", 0.0, false, Some(false))
        .media("break.mp4", -20.0, true, Some(true))
        .media("music.mp3", -6.0, false, Some(true))
        .media("outro.mp4", -15.0, false, Some(true))
        .other("intro-title", "text_ft2_source_v2");
    w.program = "Main".to_string();
    w.preview = Some("Intro".to_string());
    w
}

/// Lets spawned tasks run to quiescence without moving the paused clock far.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
