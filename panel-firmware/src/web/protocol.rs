// WebSocket-Protokoll der Update-Steuerung
// JSON-Nachrichten zwischen Dashboard und Panel

use panel_core::{Channel, UpdateEvent, UpdateStatus};
use serde::{Deserialize, Serialize};

/// Client → Server Nachrichten
///
/// Flache Struktur mit optionalen Feldern (serde-json-core kann keine
/// intern getaggten Enums deserialisieren).
///
/// ```json
/// {"type":"set_pull","enabled":false}
/// {"type":"set_channel","channel":"prerelease"}
/// {"type":"get_status"}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WsClientMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub channel: Option<Channel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    SetPull,
    SetPush,
    SetChannel,
    SetSignedOnly,
    GetStatus,
}

/// Server → Client Nachrichten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum WsServerMessage {
    #[serde(rename = "status")]
    Status {
        version: &'static str,
        pull_enabled: bool,
        push_enabled: bool,
        channel: Channel,
        signed_only: bool,
        pull_state: &'static str,
        push_state: &'static str,
        busy: bool,
    },
    #[serde(rename = "progress")]
    Progress {
        path: &'static str,
        written: u32,
        total: u32,
        percent: u8,
    },
    #[serde(rename = "result")]
    Result {
        path: &'static str,
        ok: bool,
        error: Option<&'static str>,
    },
    #[serde(rename = "error")]
    Error { message: &'static str },
}

impl WsServerMessage {
    pub fn status(version: &'static str, status: &UpdateStatus) -> Self {
        WsServerMessage::Status {
            version,
            pull_enabled: status.config.pull_enabled,
            push_enabled: status.config.push_enabled,
            channel: status.config.channel,
            signed_only: status.config.require_signed_firmware,
            pull_state: status.pull_state.as_str(),
            push_state: status.push_state.as_str(),
            busy: status.busy,
        }
    }

    pub fn from_event(event: &UpdateEvent) -> Self {
        match *event {
            UpdateEvent::Started { path, total } => WsServerMessage::Progress {
                path: path.as_str(),
                written: 0,
                total,
                percent: 0,
            },
            UpdateEvent::Progress {
                path,
                written,
                total,
            } => WsServerMessage::Progress {
                path: path.as_str(),
                written,
                total,
                percent: panel_core::progress_percent(written, total),
            },
            UpdateEvent::Applied { path } => WsServerMessage::Result {
                path: path.as_str(),
                ok: true,
                error: None,
            },
            UpdateEvent::Failed { path, error } => WsServerMessage::Result {
                path: path.as_str(),
                ok: false,
                error: Some(error.as_str()),
            },
        }
    }
}
