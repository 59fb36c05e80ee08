//! WebSocket adapter for the hosted Gemini live model.
//!
//! A connection sends one `setup` message and waits for `setupComplete`.
//! Once the stream starts, a pump task forwards microphone PCM as
//! `realtimeInput` and turns server content into [`LiveEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::handle::{LiveEndpoint, LiveSession};
use super::{LiveSettings, SessionConfig};
use crate::error::AstroLiveError;
use crate::Result;

/// Default live endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Format of microphone audio sent to the model.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A slice of microphone audio: 16-bit little-endian mono PCM at 16 kHz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Raw PCM bytes.
    pub pcm: Vec<u8>,
}

/// Something the model produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Decoded audio to play back.
    Audio { mime_type: String, pcm: Vec<u8> },
    /// Text output.
    Text(String),
    /// The model finished its turn.
    TurnComplete,
    /// The user interrupted the model.
    Interrupted,
    /// The server is about to end the connection.
    GoAway,
}

/// Device-side audio plumbing shared by every session of an endpoint.
///
/// The microphone receiver outlives individual connections; each streaming
/// session locks it for as long as it runs.
#[derive(Debug, Clone)]
pub struct AudioBridge {
    microphone: Arc<Mutex<mpsc::Receiver<AudioChunk>>>,
    events: mpsc::Sender<LiveEvent>,
}

impl AudioBridge {
    /// Create a bridge plus the microphone sender and event receiver that
    /// the device side holds.
    pub fn channel(
        capacity: usize,
    ) -> (Self, mpsc::Sender<AudioChunk>, mpsc::Receiver<LiveEvent>) {
        let (mic_tx, mic_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let bridge = Self {
            microphone: Arc::new(Mutex::new(mic_rx)),
            events: event_tx,
        };
        (bridge, mic_tx, event_rx)
    }
}

/// Endpoint that opens Gemini live sessions over WebSocket.
pub struct GeminiLiveEndpoint {
    url: String,
    api_key: String,
    setup_timeout: Duration,
    bridge: AudioBridge,
}

impl GeminiLiveEndpoint {
    /// Create an endpoint from settings.
    pub fn new(settings: &LiveSettings, api_key: impl Into<String>, bridge: AudioBridge) -> Self {
        Self {
            url: settings.endpoint.clone(),
            api_key: api_key.into(),
            setup_timeout: Duration::from_secs(settings.setup_timeout_secs),
            bridge,
        }
    }

    fn connect_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.url, separator, self.api_key)
    }
}

impl std::fmt::Debug for GeminiLiveEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveEndpoint")
            .field("url", &self.url)
            .field("setup_timeout", &self.setup_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LiveEndpoint for GeminiLiveEndpoint {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn LiveSession>> {
        debug!(url = %self.url, model = config.model(), "opening live socket");
        let (mut ws, _response) = tokio_tungstenite::connect_async(self.connect_url())
            .await
            .map_err(|e| AstroLiveError::Connect(e.to_string()))?;

        ws.send(Message::Text(setup_message(config).to_string()))
            .await
            .map_err(|e| AstroLiveError::Connect(e.to_string()))?;

        tokio::time::timeout(self.setup_timeout, wait_for_setup(&mut ws))
            .await
            .map_err(|_| AstroLiveError::Connect("setup acknowledgement timed out".into()))??;

        info!(model = config.model(), voice = config.voice(), "live setup complete");
        Ok(Box::new(GeminiLiveSession {
            conversation: Conversation::Ready(ws),
            bridge: self.bridge.clone(),
        }))
    }
}

enum Conversation {
    Ready(WsStream),
    Streaming {
        cancel: CancellationToken,
        active: Arc<AtomicBool>,
        pump: JoinHandle<Option<WsStream>>,
    },
    Closed,
}

/// One Gemini live connection.
pub struct GeminiLiveSession {
    conversation: Conversation,
    bridge: AudioBridge,
}

#[async_trait]
impl LiveSession for GeminiLiveSession {
    async fn start_stream(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.conversation, Conversation::Closed) {
            Conversation::Ready(ws) => {
                let cancel = CancellationToken::new();
                let active = Arc::new(AtomicBool::new(true));
                let pump = tokio::spawn(pump(
                    ws,
                    self.bridge.clone(),
                    cancel.clone(),
                    active.clone(),
                ));
                self.conversation = Conversation::Streaming {
                    cancel,
                    active,
                    pump,
                };
                Ok(())
            }
            other => {
                self.conversation = other;
                Err(AstroLiveError::StreamDropped(
                    "conversation is not ready to start".into(),
                ))
            }
        }
    }

    async fn is_active(&mut self) -> Result<bool> {
        Ok(match &self.conversation {
            Conversation::Streaming { active, pump, .. } => {
                active.load(Ordering::SeqCst) && !pump.is_finished()
            }
            _ => false,
        })
    }

    async fn stop_stream(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.conversation, Conversation::Closed) {
            Conversation::Streaming { cancel, pump, .. } => {
                cancel.cancel();
                match pump.await {
                    Ok(Some(ws)) => {
                        self.conversation = Conversation::Ready(ws);
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(e) => Err(AstroLiveError::StreamDropped(format!("audio pump failed: {}", e))),
                }
            }
            other => {
                self.conversation = other;
                Ok(())
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let stopped = self.stop_stream().await;

        if let Conversation::Ready(mut ws) =
            std::mem::replace(&mut self.conversation, Conversation::Closed)
        {
            ws.close(None)
                .await
                .map_err(|e| AstroLiveError::WebSocket(e.to_string()))?;
        }
        stopped
    }
}

/// Move audio both ways until cancelled or the socket ends. Hands the
/// socket back only when the pump was cancelled.
async fn pump(
    ws: WsStream,
    bridge: AudioBridge,
    cancel: CancellationToken,
    active: Arc<AtomicBool>,
) -> Option<WsStream> {
    let mut microphone = tokio::select! {
        _ = cancel.cancelled() => {
            active.store(false, Ordering::SeqCst);
            return Some(ws);
        }
        guard = bridge.microphone.clone().lock_owned() => guard,
    };

    let (mut sink, mut stream) = ws.split();
    let mut mic_open = true;

    let cancelled = loop {
        tokio::select! {
            _ = cancel.cancelled() => break true,
            chunk = microphone.recv(), if mic_open => match chunk {
                Some(chunk) => {
                    trace!(bytes = chunk.pcm.len(), "sending microphone audio");
                    let message = realtime_input(&chunk).to_string();
                    if let Err(e) = sink.send(Message::Text(message)).await {
                        warn!(error = %e, "failed to send microphone audio");
                        break false;
                    }
                }
                None => {
                    debug!("microphone closed");
                    mic_open = false;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if !forward(&text, &bridge.events, &cancel).await {
                        break cancel.is_cancelled();
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        if !forward(text, &bridge.events, &cancel).await {
                            break cancel.is_cancelled();
                        }
                    }
                    Err(_) => debug!(bytes = bytes.len(), "ignoring non-UTF-8 frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "live server closed the conversation");
                    break false;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "live socket error");
                    break false;
                }
                None => break false,
            },
        }
    };

    active.store(false, Ordering::SeqCst);
    if cancelled {
        sink.reunite(stream).ok()
    } else {
        None
    }
}

/// Decode a server frame and pass its events on. Returns `false` once the
/// server announces it is going away.
async fn forward(
    text: &str,
    events: &mpsc::Sender<LiveEvent>,
    cancel: &CancellationToken,
) -> bool {
    let decoded = match decode_server_message(text) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(error = %e, "ignoring undecodable server message");
            return true;
        }
    };

    let mut keep_going = true;
    for event in decoded {
        if event == LiveEvent::GoAway {
            info!("live server sent goAway");
            keep_going = false;
        }
        // A stalled consumer must not block cancellation.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            sent = events.send(event) => {
                if sent.is_err() {
                    trace!("no listener for live events");
                }
            }
        }
    }
    keep_going
}

async fn wait_for_setup(ws: &mut WsStream) -> Result<()> {
    while let Some(message) = ws.next().await {
        let message = message.map_err(|e| AstroLiveError::Connect(e.to_string()))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(frame) => {
                return Err(AstroLiveError::Connect(format!(
                    "closed during setup: {:?}",
                    frame
                )))
            }
            _ => continue,
        };
        if is_setup_complete(&text) {
            return Ok(());
        }
        trace!(message = %text, "waiting for setupComplete");
    }
    Err(AstroLiveError::Connect("closed during setup".into()))
}

/// Build the `setup` message for a session.
pub fn setup_message(config: &SessionConfig) -> Value {
    let model = if config.model().starts_with("models/") {
        config.model().to_string()
    } else {
        format!("models/{}", config.model())
    };

    json!({
        "setup": {
            "model": model,
            "generationConfig": {
                "responseModalities": [config.modality().as_str()],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": config.voice() }
                    }
                }
            },
            "systemInstruction": {
                "parts": [{ "text": config.system_instruction() }]
            }
        }
    })
}

/// Build a `realtimeInput` message carrying microphone audio.
pub fn realtime_input(chunk: &AudioChunk) -> Value {
    json!({
        "realtimeInput": {
            "audio": {
                "mimeType": INPUT_MIME_TYPE,
                "data": BASE64.encode(&chunk.pcm),
            }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    go_away: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    turn_complete: bool,
    interrupted: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelTurn {
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

fn is_setup_complete(text: &str) -> bool {
    serde_json::from_str::<ServerMessage>(text)
        .map(|m| m.setup_complete.is_some())
        .unwrap_or(false)
}

/// Decode one server message into events.
pub fn decode_server_message(text: &str) -> Result<Vec<LiveEvent>> {
    let message: ServerMessage = serde_json::from_str(text)?;
    let mut events = Vec::new();

    if let Some(content) = message.server_content {
        if content.interrupted {
            events.push(LiveEvent::Interrupted);
        }
        for part in content.model_turn.map(|t| t.parts).unwrap_or_default() {
            if let Some(inline) = part.inline_data {
                let pcm = BASE64.decode(inline.data.as_bytes()).map_err(|e| {
                    AstroLiveError::WebSocket(format!("invalid audio payload: {}", e))
                })?;
                events.push(LiveEvent::Audio {
                    mime_type: inline.mime_type,
                    pcm,
                });
            }
            if let Some(text) = part.text {
                events.push(LiveEvent::Text(text));
            }
        }
        if content.turn_complete {
            events.push(LiveEvent::TurnComplete);
        }
    }

    if message.go_away.is_some() {
        events.push(LiveEvent::GoAway);
    }
    Ok(events)
}
