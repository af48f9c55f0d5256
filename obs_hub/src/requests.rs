//! Typed wrappers over `ObsApi::call` for the requests the hub issues.

use crate::client::ObsApi;
use crate::error::HubError;
use obs_protocol::request_type as rt;
use obs_protocol::responses::{
    CurrentPreviewScene, CurrentProgramScene, InputMute, InputSettings, InputVolume,
    MediaInputStatus, SceneItem, SceneItemList, SceneItemTransform, SceneList, VideoSettings,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

async fn typed<T: DeserializeOwned>(
    api: &dyn ObsApi,
    request_type: &str,
    data: Option<Value>,
) -> Result<T, HubError> {
    let value = api.call(request_type, data).await?;
    Ok(serde_json::from_value(value)?)
}

async fn send(api: &dyn ObsApi, request_type: &str, data: Option<Value>) -> Result<(), HubError> {
    api.call(request_type, data).await.map(|_| ())
}

pub async fn get_scene_list(api: &dyn ObsApi) -> Result<SceneList, HubError> {
    typed(api, rt::GET_SCENE_LIST, None).await
}

pub async fn get_current_program_scene(api: &dyn ObsApi) -> Result<String, HubError> {
    let resp: CurrentProgramScene = typed(api, rt::GET_CURRENT_PROGRAM_SCENE, None).await?;
    Ok(resp.current_program_scene_name)
}

pub async fn get_current_preview_scene(api: &dyn ObsApi) -> Result<String, HubError> {
    let resp: CurrentPreviewScene = typed(api, rt::GET_CURRENT_PREVIEW_SCENE, None).await?;
    Ok(resp.current_preview_scene_name)
}

pub async fn set_current_preview_scene(api: &dyn ObsApi, scene: &str) -> Result<(), HubError> {
    send(api, rt::SET_CURRENT_PREVIEW_SCENE, Some(json!({ "sceneName": scene }))).await
}

pub async fn get_scene_item_list(
    api: &dyn ObsApi,
    scene: &str,
) -> Result<Vec<SceneItem>, HubError> {
    let resp: SceneItemList =
        typed(api, rt::GET_SCENE_ITEM_LIST, Some(json!({ "sceneName": scene }))).await?;
    Ok(resp.scene_items)
}

pub async fn get_input_volume_db(api: &dyn ObsApi, input: &str) -> Result<f64, HubError> {
    let resp: InputVolume =
        typed(api, rt::GET_INPUT_VOLUME, Some(json!({ "inputName": input }))).await?;
    Ok(resp.input_volume_db)
}

pub async fn set_input_volume_db(api: &dyn ObsApi, input: &str, db: f64) -> Result<(), HubError> {
    send(
        api,
        rt::SET_INPUT_VOLUME,
        Some(json!({ "inputName": input, "inputVolumeDb": db })),
    )
    .await
}

pub async fn get_input_mute(api: &dyn ObsApi, input: &str) -> Result<bool, HubError> {
    let resp: InputMute =
        typed(api, rt::GET_INPUT_MUTE, Some(json!({ "inputName": input }))).await?;
    Ok(resp.input_muted)
}

pub async fn set_input_mute(api: &dyn ObsApi, input: &str, muted: bool) -> Result<(), HubError> {
    send(
        api,
        rt::SET_INPUT_MUTE,
        Some(json!({ "inputName": input, "inputMuted": muted })),
    )
    .await
}

/// Only non-default settings are returned by the remote.
pub async fn get_input_settings(api: &dyn ObsApi, input: &str) -> Result<Value, HubError> {
    let resp: InputSettings =
        typed(api, rt::GET_INPUT_SETTINGS, Some(json!({ "inputName": input }))).await?;
    Ok(resp.input_settings)
}

pub async fn set_input_settings(
    api: &dyn ObsApi,
    input: &str,
    settings: Value,
) -> Result<(), HubError> {
    send(
        api,
        rt::SET_INPUT_SETTINGS,
        Some(json!({ "inputName": input, "inputSettings": settings, "overlay": true })),
    )
    .await
}

pub async fn get_media_state(api: &dyn ObsApi, input: &str) -> Result<String, HubError> {
    let resp: MediaInputStatus =
        typed(api, rt::GET_MEDIA_INPUT_STATUS, Some(json!({ "inputName": input }))).await?;
    Ok(resp.media_state)
}

pub async fn trigger_media_action(
    api: &dyn ObsApi,
    input: &str,
    action: &str,
) -> Result<(), HubError> {
    send(
        api,
        rt::TRIGGER_MEDIA_INPUT_ACTION,
        Some(json!({ "inputName": input, "mediaAction": action })),
    )
    .await
}

pub async fn trigger_hotkey_by_key_sequence(
    api: &dyn ObsApi,
    key_id: &str,
) -> Result<(), HubError> {
    send(api, rt::TRIGGER_HOTKEY_BY_KEY_SEQUENCE, Some(json!({ "keyId": key_id }))).await
}

pub async fn trigger_studio_mode_transition(api: &dyn ObsApi) -> Result<(), HubError> {
    send(api, rt::TRIGGER_STUDIO_MODE_TRANSITION, None).await
}

pub async fn get_scene_item_transform(
    api: &dyn ObsApi,
    scene: &str,
    item_id: i64,
) -> Result<Value, HubError> {
    let resp: SceneItemTransform = typed(
        api,
        rt::GET_SCENE_ITEM_TRANSFORM,
        Some(json!({ "sceneName": scene, "sceneItemId": item_id })),
    )
    .await?;
    Ok(resp.scene_item_transform)
}

pub async fn set_scene_item_transform(
    api: &dyn ObsApi,
    scene: &str,
    item_id: i64,
    transform: Value,
) -> Result<(), HubError> {
    send(
        api,
        rt::SET_SCENE_ITEM_TRANSFORM,
        Some(json!({
            "sceneName": scene,
            "sceneItemId": item_id,
            "sceneItemTransform": transform,
        })),
    )
    .await
}

pub async fn set_scene_item_enabled(
    api: &dyn ObsApi,
    scene: &str,
    item_id: i64,
    enabled: bool,
) -> Result<(), HubError> {
    send(
        api,
        rt::SET_SCENE_ITEM_ENABLED,
        Some(json!({
            "sceneName": scene,
            "sceneItemId": item_id,
            "sceneItemEnabled": enabled,
        })),
    )
    .await
}

pub async fn get_video_settings(api: &dyn ObsApi) -> Result<VideoSettings, HubError> {
    typed(api, rt::GET_VIDEO_SETTINGS, None).await
}
