use crate::error::HubError;
use crate::lock;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use obs_protocol::{
    events, subscription, ClientMessage, Event, Identify, Request, ServerMessage, RPC_VERSION,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

pub const EVENT_CAP: usize = 256;
const OUTBOUND_CAP: usize = 64;

const SUBSCRIPTIONS: u32 = subscription::GENERAL | subscription::SCENES | subscription::INPUTS;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Everything the hub reacts to, connection lifecycle included.
#[derive(Debug, Clone, PartialEq)]
pub enum ObsEvent {
    ConnectionOpened,
    ConnectionClosed,
    ProgramSceneChanged { scene_name: String },
    PreviewSceneChanged { scene_name: String },
    SceneListChanged,
    InputVolumeChanged { input_name: String, volume_db: f64 },
    InputMuteChanged { input_name: String, muted: bool },
}

impl ObsEvent {
    pub fn from_wire(event: Event) -> Option<Self> {
        let decoded = match event.event_type.as_str() {
            events::CURRENT_PROGRAM_SCENE_CHANGED => {
                serde_json::from_value::<events::SceneChanged>(event.event_data)
                    .map(|d| ObsEvent::ProgramSceneChanged { scene_name: d.scene_name })
            }
            events::CURRENT_PREVIEW_SCENE_CHANGED => {
                serde_json::from_value::<events::SceneChanged>(event.event_data)
                    .map(|d| ObsEvent::PreviewSceneChanged { scene_name: d.scene_name })
            }
            events::SCENE_LIST_CHANGED => Ok(ObsEvent::SceneListChanged),
            events::INPUT_VOLUME_CHANGED => {
                serde_json::from_value::<events::InputVolumeChanged>(event.event_data).map(|d| {
                    ObsEvent::InputVolumeChanged {
                        input_name: d.input_name,
                        volume_db: d.input_volume_db,
                    }
                })
            }
            events::INPUT_MUTE_STATE_CHANGED => {
                serde_json::from_value::<events::InputMuteStateChanged>(event.event_data).map(
                    |d| ObsEvent::InputMuteChanged {
                        input_name: d.input_name,
                        muted: d.input_muted,
                    },
                )
            }
            events::EXIT_STARTED => {
                info!("obs is shutting down");
                return None;
            }
            _ => return None,
        };
        match decoded {
            Ok(ev) => Some(ev),
            Err(e) => {
                debug!(event_type = %event.event_type, "dropping malformed event: {e}");
                None
            }
        }
    }
}

/// Request/response surface of the remote tool.
///
/// `connect` must announce success by emitting `ObsEvent::ConnectionOpened`
/// on the event channel the implementation was built with, and a lost link by
/// emitting `ObsEvent::ConnectionClosed`.
#[async_trait]
pub trait ObsApi: Send + Sync {
    async fn connect(&self) -> Result<(), HubError>;
    async fn call(&self, request_type: &str, request_data: Option<Value>)
        -> Result<Value, HubError>;
}

struct Outbound {
    request: Request,
    responder: oneshot::Sender<Result<Value, HubError>>,
}

struct Pending {
    request_type: String,
    responder: oneshot::Sender<Result<Value, HubError>>,
}

struct Link {
    tx: mpsc::Sender<Outbound>,
    task: JoinHandle<()>,
}

pub struct ObsClient {
    address: Url,
    request_timeout: Duration,
    events: mpsc::Sender<ObsEvent>,
    link: Mutex<Option<Link>>,
    next_id: AtomicU64,
}

impl ObsClient {
    pub fn new(address: Url, request_timeout: Duration, events: mpsc::Sender<ObsEvent>) -> Self {
        Self {
            address,
            request_timeout,
            events,
            link: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Drops the current link without emitting `ConnectionClosed`.
    pub fn disconnect(&self) {
        if let Some(link) = lock(&self.link).take() {
            link.task.abort();
        }
    }

    fn next_request_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Drop for ObsClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[async_trait]
impl ObsApi for ObsClient {
    async fn connect(&self) -> Result<(), HubError> {
        self.disconnect();

        let socket = tokio::time::timeout(self.request_timeout, async {
            let (mut socket, _) = tokio_tungstenite::connect_async(self.address.as_str()).await?;
            identify(&mut socket).await?;
            Ok::<_, HubError>(socket)
        })
        .await
        .map_err(|_| HubError::Handshake("timed out".to_string()))??;

        let (tx, rx) = mpsc::channel(OUTBOUND_CAP);
        let task = tokio::spawn(run_link(socket, rx, self.events.clone()));
        *lock(&self.link) = Some(Link { tx, task });

        info!(address = %self.address, "connected to obs");
        let _ = self.events.send(ObsEvent::ConnectionOpened).await;
        Ok(())
    }

    async fn call(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> Result<Value, HubError> {
        let tx = lock(&self.link)
            .as_ref()
            .map(|l| l.tx.clone())
            .ok_or(HubError::NotConnected)?;

        let (responder, response) = oneshot::channel();
        let request = Request {
            request_type: request_type.to_string(),
            request_id: self.next_request_id(),
            request_data,
        };
        tx.send(Outbound { request, responder })
            .await
            .map_err(|_| HubError::NotConnected)?;

        match tokio::time::timeout(self.request_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::LinkClosed {
                request_type: request_type.to_string(),
            }),
            Err(_) => Err(HubError::Timeout {
                request_type: request_type.to_string(),
            }),
        }
    }
}

async fn identify(socket: &mut WsStream) -> Result<(), HubError> {
    let hello = loop {
        if let ServerMessage::Hello(hello) = next_server_message(socket).await? {
            break hello;
        }
    };
    if hello.authentication.is_some() {
        return Err(HubError::Handshake(
            "server requires a password; disable authentication in obs-websocket".to_string(),
        ));
    }
    debug!(version = ?hello.obs_web_socket_version, "hello received");

    let identify = ClientMessage::Identify(Identify {
        rpc_version: RPC_VERSION,
        authentication: None,
        event_subscriptions: SUBSCRIPTIONS,
    });
    socket.send(Message::Text(identify.encode()?.into())).await?;

    loop {
        if let ServerMessage::Identified(_) = next_server_message(socket).await? {
            return Ok(());
        }
    }
}

async fn next_server_message(socket: &mut WsStream) -> Result<ServerMessage, HubError> {
    loop {
        let Some(msg) = socket.next().await else {
            return Err(HubError::Handshake("closed during handshake".to_string()));
        };
        match msg? {
            Message::Text(text) => return Ok(ServerMessage::decode(&text)?),
            Message::Close(frame) => {
                return Err(HubError::Handshake(format!(
                    "closed during handshake: {frame:?}"
                )))
            }
            _ => continue,
        }
    }
}

async fn run_link(
    socket: WsStream,
    mut rx: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<ObsEvent>,
) {
    let (mut write, mut read) = socket.split();
    let mut pending: HashMap<String, Pending> = HashMap::new();

    'link: loop {
        tokio::select! {
            next = rx.recv() => {
                let Some(Outbound { request, responder }) = next else { break 'link };
                let request_type = request.request_type.clone();
                let request_id = request.request_id.clone();
                let payload = match ClientMessage::Request(request).encode() {
                    Ok(p) => p,
                    Err(e) => {
                        let _ = responder.send(Err(e.into()));
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(payload.into())).await {
                    warn!("obs send failed: {e}");
                    let _ = responder.send(Err(e.into()));
                    break 'link;
                }
                // Callers that timed out have dropped their receiver.
                pending.retain(|_, p| !p.responder.is_closed());
                pending.insert(request_id, Pending { request_type, responder });
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        route_incoming(&text, &mut pending, &events).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "obs closed the connection");
                        break 'link;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("obs link error: {e}");
                        break 'link;
                    }
                    None => break 'link,
                }
            }
        }
    }

    for (_, p) in pending.drain() {
        let _ = p.responder.send(Err(HubError::LinkClosed {
            request_type: p.request_type,
        }));
    }
    let _ = events.send(ObsEvent::ConnectionClosed).await;
}

async fn route_incoming(
    text: &str,
    pending: &mut HashMap<String, Pending>,
    events: &mpsc::Sender<ObsEvent>,
) {
    match ServerMessage::decode(text) {
        Ok(ServerMessage::RequestResponse(resp)) => {
            let Some(p) = pending.remove(&resp.request_id) else {
                debug!(request_id = %resp.request_id, "response for unknown request");
                return;
            };
            let result = if resp.request_status.result {
                Ok(resp.response_data.unwrap_or(Value::Null))
            } else {
                Err(HubError::Request {
                    request_type: p.request_type,
                    code: resp.request_status.code,
                    comment: resp.request_status.comment,
                })
            };
            let _ = p.responder.send(result);
        }
        Ok(ServerMessage::Event(event)) => {
            if let Some(ev) = ObsEvent::from_wire(event) {
                let _ = events.send(ev).await;
            }
        }
        Ok(other) => debug!(?other, "ignoring server message"),
        Err(e) => debug!("ignoring undecodable frame: {e}"),
    }
}
