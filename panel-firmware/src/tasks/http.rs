// HTTP Server Task - Dashboard und WebSocket-Steuerung der Updates
use core::future::pending;
use defmt::{info, warn};
use embassy_futures::select::{Either3, select3};
use embassy_net::Stack;
use embassy_time::{Duration, Timer};
use picoserve::{io::embedded_io_async, response::IntoResponse, response::ws, routing::get};

use crate::config::*;
use crate::web::{
    INDEX_HTML,
    protocol::{MessageType, WsClientMessage, WsServerMessage},
};
use crate::{Coordinator, UpdateEventChannel, UpdateEventSubscriber};

/// Intervall, in dem verbundene Clients den Worker-Status erhalten
const STATUS_REFRESH: Duration = Duration::from_secs(5);

/// WebSocket-Upgrade oder HTTP 503, wenn keine Subscriber-Slots frei sind
enum WebSocketResponse {
    Upgrade(
        ws::UpgradedWebSocket<ws::UnspecifiedProtocol, ws::CallbackNotUsingState<WebSocketHandler>>,
    ),
    ServiceUnavailable,
}

impl IntoResponse for WebSocketResponse {
    async fn write_to<
        R: embedded_io_async::Read,
        W: picoserve::response::ResponseWriter<Error = R::Error>,
    >(
        self,
        connection: picoserve::response::Connection<'_, R>,
        response_writer: W,
    ) -> Result<picoserve::ResponseSent, W::Error> {
        match self {
            WebSocketResponse::Upgrade(ws) => ws.write_to(connection, response_writer).await,
            WebSocketResponse::ServiceUnavailable => {
                picoserve::response::Response::new(
                    picoserve::response::StatusCode::new(503),
                    "Service Unavailable: too many dashboard connections",
                )
                .with_header("Retry-After", "5")
                .write_to(connection, response_writer)
                .await
            }
        }
    }
}

/// HTTP Server Task
///
/// - `GET /`: Dashboard (index.html)
/// - `/ws`: Befehle an den Update Coordinator, Fortschritt und Ergebnis
///   der Updates zurück an den Browser
///
/// Wird `HTTP_TASK_POOL_SIZE`-mal gespawnt, damit Seite und WebSocket
/// gleichzeitig bedient werden.
#[embassy_executor::task(pool_size = HTTP_TASK_POOL_SIZE)]
pub async fn http_server_task(
    task_id: usize,
    stack: &'static Stack<'static>,
    coordinator: &'static Coordinator,
    events: &'static UpdateEventChannel,
) {
    info!("HTTP: Server task {} starting on port 80...", task_id);

    let app = picoserve::Router::new().route("/", get(serve_html)).route(
        "/ws",
        get(
            move |upgrade: picoserve::response::WebSocketUpgrade| async move {
                match events.subscriber() {
                    Ok(events) => {
                        info!("HTTP: WebSocket upgrade");
                        let handler = WebSocketHandler {
                            coordinator,
                            events,
                        };
                        WebSocketResponse::Upgrade(upgrade.on_upgrade(handler))
                    }
                    Err(_) => {
                        warn!("HTTP: no subscriber slot left, sending 503");
                        WebSocketResponse::ServiceUnavailable
                    }
                }
            },
        ),
    );

    let config = picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(1)),
        persistent_start_read_request: Some(Duration::from_secs(5)),
    })
    .keep_connection_alive();

    let mut http_buffer = [0u8; HTTP_BUFFER_SIZE];
    let mut rx_buffer = [0u8; TCP_RX_BUFFER_SIZE];
    let mut tx_buffer = [0u8; TCP_TX_BUFFER_SIZE];

    let server = picoserve::Server::new(&app, &config, &mut http_buffer);
    let _ = server
        .listen_and_serve(task_id, *stack, 80, &mut rx_buffer, &mut tx_buffer)
        .await;

    info!("HTTP: Server task {} ended", task_id);
}

async fn serve_html() -> impl IntoResponse {
    picoserve::response::Response::new(picoserve::response::StatusCode::OK, INDEX_HTML)
        .with_header("Content-Type", "text/html; charset=utf-8")
}

struct WebSocketHandler {
    coordinator: &'static Coordinator,
    events: UpdateEventSubscriber,
}

impl WebSocketHandler {
    fn status(&self) -> WsServerMessage {
        WsServerMessage::status(FW_VERSION, &self.coordinator.status())
    }

    /// Führt einen Befehl aus
    ///
    /// Ein Speicherfehler wird gemeldet, der Schalter ist dann trotzdem
    /// umgelegt (siehe `UpdateCoordinator::set_pull_enabled`).
    fn handle_command(&self, text: &str) -> Result<(), &'static str> {
        let (msg, _) = serde_json_core::from_str::<WsClientMessage>(text)
            .map_err(|_| "JSON parse error")?;

        let persisted = match (msg.msg_type, msg.enabled, msg.channel) {
            (MessageType::SetPull, Some(enabled), _) => {
                self.coordinator.set_pull_enabled(enabled)
            }
            (MessageType::SetPush, Some(enabled), _) => {
                self.coordinator.set_push_enabled(enabled)
            }
            (MessageType::SetSignedOnly, Some(enabled), _) => {
                self.coordinator.set_require_signed(enabled)
            }
            (MessageType::SetChannel, _, Some(channel)) => self.coordinator.set_channel(channel),
            (MessageType::GetStatus, _, _) => Ok(()),
            _ => return Err("missing field"),
        };

        persisted.map_err(|e| {
            warn!("HTTP: settings not persisted: {}", e);
            "settings not persisted"
        })
    }
}

/// Serialisiert und sendet eine Nachricht an den Client
async fn send_message<W: embedded_io_async::Write>(
    tx: &mut ws::SocketTx<W>,
    message: &WsServerMessage,
) -> Result<(), W::Error> {
    let mut json_buffer = [0u8; JSON_BUFFER_SIZE];
    let Ok(n) = serde_json_core::to_slice(message, &mut json_buffer) else {
        warn!("HTTP: message exceeds JSON buffer");
        return Ok(());
    };
    match core::str::from_utf8(&json_buffer[..n]) {
        Ok(text) => tx.send_text(text).await,
        Err(_) => Ok(()),
    }
}

impl ws::WebSocketCallback for WebSocketHandler {
    async fn run<R: embedded_io_async::Read, W: embedded_io_async::Write<Error = R::Error>>(
        mut self,
        mut rx: ws::SocketRx<R>,
        mut tx: ws::SocketTx<W>,
    ) -> Result<(), W::Error> {
        info!("HTTP: WebSocket connection established");

        let mut buffer = [0u8; WEBSOCKET_BUFFER_SIZE];
        send_message(&mut tx, &self.status()).await?;

        let close_reason = loop {
            match select3(
                rx.next_message(&mut buffer, pending()),
                self.events.next_message_pure(),
                Timer::after(STATUS_REFRESH),
            )
            .await
            {
                Either3::First(ws_result) => match ws_result?.ignore_never_b() {
                    Ok(ws::Message::Text(data)) => {
                        if let Err(message) = self.handle_command(data) {
                            send_message(&mut tx, &WsServerMessage::Error { message }).await?;
                        }
                        send_message(&mut tx, &self.status()).await?;
                    }
                    Ok(ws::Message::Binary(_)) => {
                        info!("HTTP: binary message ignored");
                    }
                    Ok(ws::Message::Ping(data)) => {
                        tx.send_pong(data).await?;
                    }
                    Ok(ws::Message::Pong(_)) => {}
                    Ok(ws::Message::Close(_reason)) => {
                        info!("HTTP: WebSocket close received");
                        break None;
                    }
                    Err(error) => {
                        info!("HTTP: WebSocket error");
                        break Some((error.code(), "WebSocket Error"));
                    }
                },
                Either3::Second(event) => {
                    send_message(&mut tx, &WsServerMessage::from_event(&event)).await?;
                }
                Either3::Third(()) => {
                    send_message(&mut tx, &self.status()).await?;
                }
            }
        };

        info!("HTTP: WebSocket connection closed");
        tx.close(close_reason).await
    }
}
