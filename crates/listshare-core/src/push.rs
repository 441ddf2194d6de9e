//! Per-list push channel: one long-lived connection that delivers full
//! authoritative snapshots whenever any participant changes the list.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use listshare_shared::PushMessage;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::RemoteError;
use crate::model::ShoppingList;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Connecting,
    Open,
    Closed {
        reason: Option<String>,
    },
}

impl ChannelState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// What the transport reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    Opened,
    Text(String),
    Closed(Option<String>),
}

/// Inbound frames for one connection. Dropping the stream stops the reader
/// feeding it.
#[derive(Debug)]
pub struct PushStream {
    frames: mpsc::UnboundedReceiver<PushFrame>,
    reader: Option<AbortHandle>,
}

impl PushStream {
    pub fn new(frames: mpsc::UnboundedReceiver<PushFrame>, reader: Option<AbortHandle>) -> Self {
        Self { frames, reader }
    }

    pub async fn next(&mut self) -> Option<PushFrame> {
        self.frames.recv().await
    }
}

impl Drop for PushStream {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, list_id: &str) -> Result<PushStream, RemoteError>;
}

/// Interprets frames for the list it was opened for. No reconnect: once
/// closed it stays closed.
#[derive(Debug, Clone)]
pub struct PushChannel {
    list_id: String,
    state: ChannelState,
}

impl PushChannel {
    pub fn new(list_id: impl Into<String>) -> Self {
        Self {
            list_id: list_id.into(),
            state: ChannelState::Connecting,
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Applies one frame; returns the snapshot that must replace local state.
    pub fn on_frame(&mut self, frame: PushFrame) -> Option<ShoppingList> {
        if self.state.is_closed() {
            debug!(list_id = %self.list_id, "frame after close ignored");
            return None;
        }
        match frame {
            PushFrame::Opened => {
                info!(list_id = %self.list_id, "push channel open");
                self.state = ChannelState::Open;
                None
            }
            PushFrame::Closed(reason) => {
                self.fail(reason);
                None
            }
            PushFrame::Text(text) => {
                self.state = ChannelState::Open;
                self.decode(&text)
            }
        }
    }

    pub fn fail(&mut self, reason: Option<String>) {
        if self.state.is_closed() {
            return;
        }
        warn!(list_id = %self.list_id, reason = ?reason, "push channel closed");
        self.state = ChannelState::Closed { reason };
    }

    pub fn close(&mut self) {
        if !self.state.is_closed() {
            debug!(list_id = %self.list_id, "closing push channel");
            self.state = ChannelState::Closed { reason: None };
        }
    }

    fn decode(&self, text: &str) -> Option<ShoppingList> {
        match serde_json::from_str::<PushMessage>(text) {
            Ok(PushMessage::ListUpdated { list }) if list.id == self.list_id => {
                debug!(list_id = %list.id, items = list.items.len(), "received list snapshot");
                Some(list.into())
            }
            Ok(PushMessage::ListUpdated { list }) => {
                warn!(expected = %self.list_id, got = %list.id, "snapshot for another list ignored");
                None
            }
            Ok(PushMessage::Unknown) => {
                debug!("ignoring unrecognised push event");
                None
            }
            Err(error) => {
                warn!(%error, "malformed push frame ignored");
                None
            }
        }
    }
}

/// WebSocket transport at `{base}/api/ws/{list_id}`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base: Url,
}

impl WsConnector {
    pub fn new(api_base: &Url) -> Self {
        Self {
            base: api_base.clone(),
        }
    }

    pub fn endpoint(&self, list_id: &str) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| RemoteError::Transport(format!("cannot use {scheme} with {}", self.base)))?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::Transport(format!("unusable base url: {}", self.base)))?
            .pop_if_empty()
            .extend(["api", "ws", list_id]);
        Ok(url)
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    #[instrument(skip(self))]
    async fn connect(&self, list_id: &str) -> Result<PushStream, RemoteError> {
        let url = self.endpoint(list_id)?;
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        info!(url = %url, "push socket connected");

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let (mut sink, mut source) = socket.split();
            if tx.send(PushFrame::Opened).is_err() {
                return;
            }
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if tx.send(PushFrame::Text(text.to_string())).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|frame| frame.reason.to_string());
                        let _ = tx.send(PushFrame::Closed(reason));
                        return;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        let _ = tx.send(PushFrame::Closed(Some(error.to_string())));
                        return;
                    }
                }
            }
            let _ = tx.send(PushFrame::Closed(None));
        });

        Ok(PushStream::new(rx, Some(reader.abort_handle())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_frame(list_id: &str, names: &[&str]) -> PushFrame {
        let items: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(idx, name)| serde_json::json!({"id": format!("i{idx}"), "name": name, "completed": false}))
            .collect();
        PushFrame::Text(
            serde_json::json!({
                "type": "list_updated",
                "list": {"id": list_id, "name": "Groceries", "items": items}
            })
            .to_string(),
        )
    }

    #[test]
    fn list_updated_yields_replacement_snapshot() {
        let mut channel = PushChannel::new("l1");
        assert_eq!(channel.on_frame(PushFrame::Opened), None);
        assert_eq!(channel.state(), &ChannelState::Open);

        let list = channel
            .on_frame(snapshot_frame("l1", &["milk", "bread"]))
            .expect("snapshot");
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[1].name, "bread");
    }

    #[test]
    fn foreign_unknown_and_malformed_frames_are_ignored() {
        let mut channel = PushChannel::new("l1");
        assert_eq!(channel.on_frame(snapshot_frame("other", &["x"])), None);
        assert_eq!(
            channel.on_frame(PushFrame::Text(r#"{"type":"pong"}"#.into())),
            None
        );
        assert_eq!(channel.on_frame(PushFrame::Text("not json".into())), None);
        assert_eq!(channel.state(), &ChannelState::Open);
    }

    #[test]
    fn dropped_connection_stays_closed() {
        let mut channel = PushChannel::new("l1");
        channel.on_frame(PushFrame::Opened);
        channel.on_frame(PushFrame::Closed(Some("reset by peer".into())));
        assert_eq!(
            channel.state(),
            &ChannelState::Closed {
                reason: Some("reset by peer".into())
            }
        );

        assert_eq!(channel.on_frame(snapshot_frame("l1", &["milk"])), None);
        assert_eq!(channel.on_frame(PushFrame::Opened), None);
        assert!(channel.state().is_closed());
    }

    #[test]
    fn close_is_idempotent_and_keeps_first_reason() {
        let mut channel = PushChannel::new("l1");
        channel.fail(Some("refused".into()));
        channel.close();
        channel.fail(Some("later".into()));
        assert_eq!(
            channel.state(),
            &ChannelState::Closed {
                reason: Some("refused".into())
            }
        );
    }

    #[test]
    fn websocket_endpoint_mirrors_http_base() {
        let base = Url::parse("https://lists.example.org").expect("url");
        assert_eq!(
            WsConnector::new(&base).endpoint("ab12").expect("ws url").as_str(),
            "wss://lists.example.org/api/ws/ab12"
        );

        let base = Url::parse("http://localhost:8100/").expect("url");
        assert_eq!(
            WsConnector::new(&base).endpoint("ab12").expect("ws url").as_str(),
            "ws://localhost:8100/api/ws/ab12"
        );
    }
}
