pub mod protocol;
pub mod types;

pub use types::*;

use futures_util::{SinkExt, StreamExt};
use protocol::{EnginePacket, SocketPacket};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

/// Silence allowed before the open handshake tells us the real ping budget.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// How long `close` waits for the server to see our disconnect.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("No sensor stream endpoint configured")]
    ConfigurationMissing,
    #[error("Failed to connect to sensor stream: {0}")]
    ConnectionFailed(String),
    #[error("Sensor stream connection lost: {0}")]
    ConnectionLost(String),
}

impl StreamError {
    /// Status shown for this failure.
    pub fn status(&self) -> ConnectionStatus {
        match self {
            StreamError::ConfigurationMissing | StreamError::ConnectionFailed(_) => {
                ConnectionStatus::Error
            }
            StreamError::ConnectionLost(_) => ConnectionStatus::Disconnected,
        }
    }
}

/// Messages from the UI side to the connection task.
enum Outbound {
    UpdateDisplay(DisplayCommand),
    ClearDisplays(ClearCommand),
    Close,
}

/// Cloneable handle for sending LCD commands over a [`StreamClient`].
///
/// Commands are fire-and-forget. While the connection is not ready they
/// are dropped without touching the wire.
#[derive(Clone)]
pub struct DisplayCommander {
    status_rx: watch::Receiver<ConnectionStatus>,
    command_tx: mpsc::UnboundedSender<Outbound>,
}

impl DisplayCommander {
    /// Queue a line write. Returns `false` if nothing was queued.
    pub fn update_display(&self, command: DisplayCommand) -> bool {
        self.dispatch(Outbound::UpdateDisplay(command))
    }

    /// Queue a clear of every display. Returns `false` if nothing was queued.
    pub fn clear_displays(&self) -> bool {
        self.dispatch(Outbound::ClearDisplays(ClearCommand))
    }

    fn dispatch(&self, command: Outbound) -> bool {
        let status = *self.status_rx.borrow();
        if status != ConnectionStatus::Connected {
            tracing::debug!(?status, "Dropping display command, stream not connected");
            return false;
        }
        self.command_tx.send(command).is_ok()
    }
}

/// Client for the sensor stream.
///
/// Owns one Socket.IO connection: opens it in a background task, publishes
/// the latest sensor snapshot and the connection status, and forwards
/// display commands. Lifecycle is open (`Connecting`) → ready (`Connected`)
/// → closed (`Disconnected` or `Error`); there is no reconnect.
pub struct StreamClient {
    snapshot_rx: watch::Receiver<SensorSnapshot>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    commander: DisplayCommander,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl StreamClient {
    /// Start connecting to `endpoint`. Must be called inside a tokio runtime.
    ///
    /// A missing endpoint is a configuration error: the client is returned
    /// already in the `Error` state.
    pub fn spawn(endpoint: Option<&str>, events: EventNames) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(SensorSnapshot::default());
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let status_tx = Arc::new(status_tx);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = match endpoint {
            Some(endpoint) => {
                let endpoint = endpoint.to_string();
                let status = status_tx.clone();
                Some(tokio::spawn(async move {
                    let result =
                        run_session(&endpoint, &events, &snapshot_tx, &status, command_rx).await;
                    match result {
                        Ok(()) => {
                            tracing::info!("Sensor stream closed");
                            status.send_replace(ConnectionStatus::Disconnected);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Sensor stream stopped");
                            status.send_replace(e.status());
                        }
                    }
                }))
            }
            None => {
                let e = StreamError::ConfigurationMissing;
                tracing::error!(error = %e, "Sensor stream unavailable");
                status_tx.send_replace(e.status());
                None
            }
        };

        Self {
            snapshot_rx,
            status_tx,
            commander: DisplayCommander {
                status_rx,
                command_tx,
            },
            task,
        }
    }

    /// Create a client that never connects, for running without a device.
    pub fn mock() -> Self {
        let (_, snapshot_rx) = watch::channel(SensorSnapshot::default());
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (command_tx, _) = mpsc::unbounded_channel();
        Self {
            snapshot_rx,
            status_tx: Arc::new(status_tx),
            commander: DisplayCommander {
                status_rx,
                command_tx,
            },
            task: None,
        }
    }

    /// Latest sensor snapshot (non-blocking).
    pub fn snapshot(&self) -> SensorSnapshot {
        *self.snapshot_rx.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<SensorSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Handle for components that send display commands.
    pub fn commander(&self) -> DisplayCommander {
        self.commander.clone()
    }

    pub fn update_display(&self, command: DisplayCommand) -> bool {
        self.commander.update_display(command)
    }

    pub fn clear_displays(&self) -> bool {
        self.commander.clear_displays()
    }

    /// Disconnect cleanly and wait briefly for the task to finish.
    ///
    /// A status that already reports a fault is left as is.
    pub async fn close(mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        let _ = self.commander.command_tx.send(Outbound::Close);
        if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
            tracing::warn!("Sensor stream did not close in time, aborting");
            task.abort();
        }
        if !self.status().is_faulted() {
            self.status_tx.send_replace(ConnectionStatus::Disconnected);
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One connection from dial to close.
async fn run_session(
    endpoint: &str,
    events: &EventNames,
    snapshot_tx: &watch::Sender<SensorSnapshot>,
    status_tx: &watch::Sender<ConnectionStatus>,
    mut command_rx: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), StreamError> {
    let url = protocol::websocket_url(endpoint)
        .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;
    tracing::info!(%url, "Connecting to sensor stream");

    let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;
    let (mut sink, mut source) = ws.split();

    let mut connected = false;
    let mut liveness = HANDSHAKE_TIMEOUT;
    let mut deadline = Instant::now() + liveness;
    let mut update_count: u64 = 0;

    let fail = |connected: bool, reason: String| {
        if connected {
            StreamError::ConnectionLost(reason)
        } else {
            StreamError::ConnectionFailed(reason)
        }
    };

    loop {
        tokio::select! {
            frame = source.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => return Err(fail(connected, e.to_string())),
                    None => return Err(fail(connected, "closed by server".into())),
                };
                deadline = Instant::now() + liveness;

                let text = match frame {
                    Message::Text(text) => text,
                    Message::Close(_) => return Err(fail(connected, "closed by server".into())),
                    _ => continue,
                };

                let packet = match protocol::decode(&text) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping undecodable packet");
                        continue;
                    }
                };

                match packet {
                    EnginePacket::Open(open) => {
                        liveness = open.liveness_timeout();
                        deadline = Instant::now() + liveness;
                        tracing::debug!(sid = %open.sid, ?liveness, "Engine.IO session opened");
                        sink.send(Message::Text(protocol::encode_connect()))
                            .await
                            .map_err(|e| fail(connected, e.to_string()))?;
                    }
                    EnginePacket::Ping => {
                        sink.send(Message::Text(protocol::encode_pong()))
                            .await
                            .map_err(|e| fail(connected, e.to_string()))?;
                    }
                    EnginePacket::Close => {
                        return Err(fail(connected, "server closed the session".into()));
                    }
                    EnginePacket::Message(SocketPacket::Connect { namespace, .. })
                        if namespace == "/" =>
                    {
                        connected = true;
                        status_tx.send_replace(ConnectionStatus::Connected);
                        tracing::info!("Connected to sensor stream");
                    }
                    EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
                        return Err(StreamError::ConnectionFailed(format!(
                            "server refused connection: {}",
                            data.unwrap_or_default()
                        )));
                    }
                    EnginePacket::Message(SocketPacket::Disconnect { namespace })
                        if namespace == "/" =>
                    {
                        return Err(fail(connected, "server disconnected the client".into()));
                    }
                    EnginePacket::Message(SocketPacket::Event { namespace, name, args, .. })
                        if namespace == "/" && name == events.sensor_update =>
                    {
                        match parse_snapshot(args) {
                            Some(snapshot) => {
                                snapshot_tx.send_replace(snapshot);
                                update_count += 1;
                                if update_count % 1000 == 0 {
                                    tracing::debug!(update_count, "Sensor updates received");
                                }
                            }
                            None => tracing::warn!("Dropping malformed sensor update"),
                        }
                    }
                    other => tracing::trace!(?other, "Ignoring packet"),
                }
            }
            Some(command) = command_rx.recv() => {
                let encoded = match command {
                    Outbound::UpdateDisplay(cmd) => {
                        protocol::encode_event(&events.update_display, &cmd)
                    }
                    Outbound::ClearDisplays(cmd) => {
                        protocol::encode_event(&events.clear_displays, &cmd)
                    }
                    Outbound::Close => {
                        let _ = sink.send(Message::Text(protocol::encode_disconnect())).await;
                        let _ = sink.close().await;
                        return Ok(());
                    }
                };
                let frame = match encoded {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping display command");
                        continue;
                    }
                };
                if !connected {
                    tracing::debug!("Dropping display command queued before connect");
                    continue;
                }
                sink.send(Message::Text(frame))
                    .await
                    .map_err(|e| fail(connected, e.to_string()))?;
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(fail(connected, format!("no traffic for {:?}", liveness)));
            }
        }
    }
}

/// A snapshot is only accepted whole: all six numeric fields must be present.
fn parse_snapshot(mut args: Vec<serde_json::Value>) -> Option<SensorSnapshot> {
    if args.is_empty() {
        return None;
    }
    serde_json::from_value(args.swap_remove(0)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tokio_tungstenite::{accept_async, WebSocketStream};

    type ServerWs = WebSocketStream<TcpStream>;

    const OPEN: &str =
        r#"0{"sid":"test-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        (listener, endpoint)
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.unwrap();
        accept_async(stream).await.unwrap()
    }

    async fn next_text(ws: &mut ServerWs) -> Option<String> {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn send(ws: &mut ServerWs, frame: &str) {
        ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    async fn handshake(ws: &mut ServerWs) {
        send(ws, OPEN).await;
        assert_eq!(next_text(ws).await.as_deref(), Some("40"));
        send(ws, r#"40{"sid":"socket-sid"}"#).await;
    }

    async fn wait_for_status(client: &StreamClient, want: ConnectionStatus) {
        let mut rx = client.subscribe_status();
        tokio::time::timeout(TIMEOUT, rx.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for status")
            .expect("status channel closed");
    }

    fn sensor_frame(gx: f64) -> String {
        protocol::encode_event(
            "sensor_update",
            &json!({"ax": 0.1, "ay": 0.2, "az": 9.81, "gx": gx, "gy": 0.0, "gz": -0.5}),
        )
        .unwrap()
    }

    /// Open handshake allowing 200ms of silence.
    const SHORT_OPEN: &str = r#"0{"sid":"s","pingInterval":100,"pingTimeout":100}"#;

    #[tokio::test]
    async fn missing_endpoint_is_error_and_commands_are_dropped() {
        let client = StreamClient::spawn(None, EventNames::default());
        assert_eq!(client.status(), ConnectionStatus::Error);
        assert!(!client.clear_displays());
        assert!(!client.update_display(DisplayCommand::new(Screen::One, Line::First, "hi")));
    }

    #[tokio::test]
    async fn refused_connection_is_error() {
        let (listener, endpoint) = listen().await;
        drop(listener);

        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        wait_for_status(&client, ConnectionStatus::Error).await;
    }

    #[tokio::test]
    async fn receives_sensor_updates() {
        let (listener, endpoint) = listen().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            handshake(&mut ws).await;
            send(&mut ws, &sensor_frame(1.25)).await;
            // Hold the socket until the client is done.
            let _ = next_text(&mut ws).await;
        });

        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        wait_for_status(&client, ConnectionStatus::Connected).await;

        let mut snapshots = client.subscribe_snapshot();
        tokio::time::timeout(TIMEOUT, snapshots.wait_for(|s| s.gx == 1.25))
            .await
            .expect("timed out waiting for snapshot")
            .unwrap();

        let snapshot = client.snapshot();
        assert_eq!(snapshot.az, 9.81);
        assert_eq!(snapshot.gz, -0.5);

        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_update_keeps_previous_snapshot() {
        let (listener, endpoint) = listen().await;
        let (done_tx, done_rx) = oneshot::channel();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            handshake(&mut ws).await;
            send(&mut ws, &sensor_frame(2.0)).await;
            send(&mut ws, r#"42["sensor_update",{"gx":5.0}]"#).await;
            // The pong proves the client has processed everything before it.
            send(&mut ws, "2").await;
            assert_eq!(next_text(&mut ws).await.as_deref(), Some("3"));
            done_tx.send(()).unwrap();
            let _ = next_text(&mut ws).await;
        });

        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        tokio::time::timeout(TIMEOUT, done_rx).await.unwrap().unwrap();
        assert_eq!(client.snapshot().gx, 2.0);

        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn events_on_other_namespaces_are_ignored() {
        let (listener, endpoint) = listen().await;
        let (done_tx, done_rx) = oneshot::channel();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            handshake(&mut ws).await;
            send(&mut ws, &sensor_frame(2.0)).await;
            let admin = sensor_frame(7.0).replacen("42", "42/admin,", 1);
            send(&mut ws, &admin).await;
            send(&mut ws, "2").await;
            assert_eq!(next_text(&mut ws).await.as_deref(), Some("3"));
            done_tx.send(()).unwrap();
            let _ = next_text(&mut ws).await;
        });

        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        tokio::time::timeout(TIMEOUT, done_rx).await.unwrap().unwrap();
        assert_eq!(client.snapshot().gx, 2.0);

        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn forwards_display_commands_when_connected() {
        let (listener, endpoint) = listen().await;
        let (frames_tx, frames_rx) = oneshot::channel();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            handshake(&mut ws).await;
            let first = next_text(&mut ws).await.unwrap();
            let second = next_text(&mut ws).await.unwrap();
            frames_tx.send((first, second)).unwrap();
            let _ = next_text(&mut ws).await;
        });

        let events = EventNames {
            update_display: "update_lcd".into(),
            clear_displays: "clear_lcds".into(),
            ..EventNames::default()
        };
        let client = StreamClient::spawn(Some(&endpoint), events);
        wait_for_status(&client, ConnectionStatus::Connected).await;

        let commander = client.commander();
        assert!(commander.update_display(DisplayCommand::new(
            Screen::Two,
            Line::Second,
            "This text is far too long",
        )));
        assert!(commander.clear_displays());

        let (first, second) = tokio::time::timeout(TIMEOUT, frames_rx).await.unwrap().unwrap();
        match protocol::decode(&first).unwrap() {
            EnginePacket::Message(SocketPacket::Event { name, args, .. }) => {
                assert_eq!(name, "update_lcd");
                assert_eq!(args, vec![json!({"screen": 2, "line": 1, "text": "This text is far"})]);
            }
            other => panic!("expected event, got {:?}", other),
        }
        assert_eq!(second, r#"42["clear_lcds",{"screen":"all"}]"#);

        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn commands_before_connect_ack_are_not_sent() {
        let (listener, endpoint) = listen().await;
        let (opened_tx, opened_rx) = oneshot::channel();
        let (extra_tx, extra_rx) = oneshot::channel();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            send(&mut ws, OPEN).await;
            assert_eq!(next_text(&mut ws).await.as_deref(), Some("40"));
            opened_tx.send(()).unwrap();
            // Never acknowledge the namespace connect.
            let extra = tokio::time::timeout(Duration::from_millis(300), next_text(&mut ws)).await;
            extra_tx.send(extra.is_err()).unwrap();
        });

        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        tokio::time::timeout(TIMEOUT, opened_rx).await.unwrap().unwrap();

        assert_eq!(client.status(), ConnectionStatus::Connecting);
        assert!(!client.update_display(DisplayCommand::new(Screen::One, Line::First, "x")));
        assert!(!client.clear_displays());

        let nothing_sent = tokio::time::timeout(TIMEOUT, extra_rx).await.unwrap().unwrap();
        assert!(nothing_sent);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn answers_pings() {
        let (listener, endpoint) = listen().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            handshake(&mut ws).await;
            send(&mut ws, "2").await;
            next_text(&mut ws).await
        });

        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        let reply = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
        assert_eq!(reply.as_deref(), Some("3"));
        drop(client);
    }

    #[tokio::test]
    async fn server_drop_is_connection_lost() {
        let (listener, endpoint) = listen().await;
        let (drop_tx, drop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            handshake(&mut ws).await;
            let _ = drop_rx.await;
            drop(ws);
        });

        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        wait_for_status(&client, ConnectionStatus::Connected).await;
        drop_tx.send(()).unwrap();

        wait_for_status(&client, ConnectionStatus::Disconnected).await;
        assert!(client.status().is_faulted());
        assert!(!client.clear_displays());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_link_after_connect_is_lost() {
        let (listener, endpoint) = listen().await;
        let (hold_tx, hold_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            send(&mut ws, SHORT_OPEN).await;
            assert_eq!(next_text(&mut ws).await.as_deref(), Some("40"));
            send(&mut ws, r#"40{"sid":"socket-sid"}"#).await;
            // Stay silent but keep the socket open.
            let _ = hold_rx.await;
            drop(ws);
        });

        // Only a link that reached Connected ends as Disconnected.
        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        wait_for_status(&client, ConnectionStatus::Disconnected).await;

        hold_tx.send(()).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_link_before_ack_is_error() {
        let (listener, endpoint) = listen().await;
        let (hold_tx, hold_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            send(&mut ws, SHORT_OPEN).await;
            assert_eq!(next_text(&mut ws).await.as_deref(), Some("40"));
            let _ = hold_rx.await;
            drop(ws);
        });

        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        wait_for_status(&client, ConnectionStatus::Error).await;

        hold_tx.send(()).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn close_keeps_error_status() {
        let (listener, endpoint) = listen().await;
        drop(listener);

        let client = StreamClient::spawn(Some(&endpoint), EventNames::default());
        wait_for_status(&client, ConnectionStatus::Error).await;
        let status = client.subscribe_status();

        client.close().await;
        assert_eq!(*status.borrow(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn mock_client_stays_idle() {
        let client = StreamClient::mock();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert_eq!(client.snapshot(), SensorSnapshot::default());
        assert!(!client.clear_displays());
    }
}
