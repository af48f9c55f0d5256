//! Wire types for the obs-websocket v5 protocol.
//!
//! Every frame is a JSON object `{"op": <u8>, "d": {...}}`. Only the pieces
//! the hub needs are typed; anything else stays as `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const RPC_VERSION: u32 = 1;

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// Event subscription bit flags sent in `Identify`.
pub mod subscription {
    pub const GENERAL: u32 = 1 << 0;
    pub const SCENES: u32 = 1 << 2;
    pub const INPUTS: u32 = 1 << 3;
}

/// `requestStatus.code` values the hub cares about.
pub mod status {
    pub const SUCCESS: u16 = 100;
    pub const STUDIO_MODE_NOT_ACTIVE: u16 = 506;
    pub const RESOURCE_NOT_FOUND: u16 = 600;
}

pub mod request_type {
    pub const GET_SCENE_LIST: &str = "GetSceneList";
    pub const GET_CURRENT_PROGRAM_SCENE: &str = "GetCurrentProgramScene";
    pub const GET_CURRENT_PREVIEW_SCENE: &str = "GetCurrentPreviewScene";
    pub const SET_CURRENT_PREVIEW_SCENE: &str = "SetCurrentPreviewScene";
    pub const GET_SCENE_ITEM_LIST: &str = "GetSceneItemList";
    pub const GET_INPUT_VOLUME: &str = "GetInputVolume";
    pub const SET_INPUT_VOLUME: &str = "SetInputVolume";
    pub const GET_INPUT_MUTE: &str = "GetInputMute";
    pub const SET_INPUT_MUTE: &str = "SetInputMute";
    pub const GET_INPUT_SETTINGS: &str = "GetInputSettings";
    pub const SET_INPUT_SETTINGS: &str = "SetInputSettings";
    pub const GET_MEDIA_INPUT_STATUS: &str = "GetMediaInputStatus";
    pub const TRIGGER_MEDIA_INPUT_ACTION: &str = "TriggerMediaInputAction";
    pub const TRIGGER_HOTKEY_BY_KEY_SEQUENCE: &str = "TriggerHotkeyByKeySequence";
    pub const TRIGGER_STUDIO_MODE_TRANSITION: &str = "TriggerStudioModeTransition";
    pub const GET_SCENE_ITEM_TRANSFORM: &str = "GetSceneItemTransform";
    pub const SET_SCENE_ITEM_TRANSFORM: &str = "SetSceneItemTransform";
    pub const SET_SCENE_ITEM_ENABLED: &str = "SetSceneItemEnabled";
    pub const GET_VIDEO_SETTINGS: &str = "GetVideoSettings";
}

pub mod media_action {
    pub const PLAY: &str = "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PLAY";
    pub const PAUSE: &str = "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PAUSE";
}

pub const MEDIA_STATE_PLAYING: &str = "OBS_MEDIA_STATE_PLAYING";
pub const BOUNDS_SCALE_INNER: &str = "OBS_BOUNDS_SCALE_INNER";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Frame {
    op: u8,
    d: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: u32,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum ServerMessage {
    Hello(Hello),
    Identified(Identified),
    Event(Event),
    RequestResponse(RequestResponse),
    Other(u8),
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)?;
        let msg = match frame.op {
            op::HELLO => ServerMessage::Hello(serde_json::from_value(frame.d)?),
            op::IDENTIFIED => ServerMessage::Identified(serde_json::from_value(frame.d)?),
            op::EVENT => ServerMessage::Event(serde_json::from_value(frame.d)?),
            op::REQUEST_RESPONSE => {
                ServerMessage::RequestResponse(serde_json::from_value(frame.d)?)
            }
            other => ServerMessage::Other(other),
        };
        Ok(msg)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let (op, d) = match self {
            ServerMessage::Hello(m) => (op::HELLO, serde_json::to_value(m)?),
            ServerMessage::Identified(m) => (op::IDENTIFIED, serde_json::to_value(m)?),
            ServerMessage::Event(m) => (op::EVENT, serde_json::to_value(m)?),
            ServerMessage::RequestResponse(m) => (op::REQUEST_RESPONSE, serde_json::to_value(m)?),
            ServerMessage::Other(op) => (*op, Value::Object(Default::default())),
        };
        Ok(serde_json::to_string(&Frame { op, d })?)
    }
}

#[derive(Debug, Clone)]
pub enum ClientMessage {
    Identify(Identify),
    Request(Request),
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let (op, d) = match self {
            ClientMessage::Identify(m) => (op::IDENTIFY, serde_json::to_value(m)?),
            ClientMessage::Request(m) => (op::REQUEST, serde_json::to_value(m)?),
        };
        Ok(serde_json::to_string(&Frame { op, d })?)
    }

    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)?;
        let msg = match frame.op {
            op::IDENTIFY => Some(ClientMessage::Identify(serde_json::from_value(frame.d)?)),
            op::REQUEST => Some(ClientMessage::Request(serde_json::from_value(frame.d)?)),
            _ => None,
        };
        Ok(msg)
    }
}

pub mod events {
    use serde::{Deserialize, Serialize};

    pub const CURRENT_PROGRAM_SCENE_CHANGED: &str = "CurrentProgramSceneChanged";
    pub const CURRENT_PREVIEW_SCENE_CHANGED: &str = "CurrentPreviewSceneChanged";
    pub const SCENE_LIST_CHANGED: &str = "SceneListChanged";
    pub const INPUT_VOLUME_CHANGED: &str = "InputVolumeChanged";
    pub const INPUT_MUTE_STATE_CHANGED: &str = "InputMuteStateChanged";
    pub const EXIT_STARTED: &str = "ExitStarted";

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct SceneChanged {
        pub scene_name: String,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct InputVolumeChanged {
        pub input_name: String,
        pub input_volume_db: f64,
        #[serde(default)]
        pub input_volume_mul: f64,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct InputMuteStateChanged {
        pub input_name: String,
        pub input_muted: bool,
    }
}

/// Response payloads for the requests the hub issues.
pub mod responses {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct SceneEntry {
        pub scene_name: String,
        pub scene_index: i64,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct SceneList {
        #[serde(default)]
        pub current_program_scene_name: Option<String>,
        #[serde(default)]
        pub current_preview_scene_name: Option<String>,
        pub scenes: Vec<SceneEntry>,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct CurrentProgramScene {
        pub current_program_scene_name: String,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct CurrentPreviewScene {
        pub current_preview_scene_name: String,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct SceneItem {
        pub scene_item_id: i64,
        pub source_name: String,
        #[serde(default)]
        pub input_kind: Option<String>,
        #[serde(default)]
        pub scene_item_enabled: bool,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct SceneItemList {
        pub scene_items: Vec<SceneItem>,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct InputVolume {
        pub input_volume_db: f64,
        #[serde(default)]
        pub input_volume_mul: f64,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct InputMute {
        pub input_muted: bool,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct InputSettings {
        #[serde(default)]
        pub input_settings: Value,
        #[serde(default)]
        pub input_kind: Option<String>,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct MediaInputStatus {
        pub media_state: String,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct SceneItemTransform {
        pub scene_item_transform: Value,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct VideoSettings {
        pub base_width: f64,
        pub base_height: f64,
    }
}
