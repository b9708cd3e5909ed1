//! Core Types der Update-Engine
//!
//! Datenstrukturen ohne Hardware-Dependencies

use core::net::SocketAddrV4;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::signature::PartitionSignature;

/// Maximale Länge einer Download-URL
///
/// Redirect-Ziele des Asset-CDNs tragen signierte Query-Parameter und
/// sind deutlich länger als die Release-URL selbst.
pub const URL_CAPACITY: usize = 1024;

/// Begrenzte URL ohne Heap
pub type Url = String<URL_CAPACITY>;

/// Update-Kanal: welche Releases als Kandidaten gelten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// "latest" Release des Repositories
    #[default]
    Stable,
    /// Neuestes als Prerelease markiertes Release
    Prerelease,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Prerelease => "prerelease",
        }
    }
}

/// Über welchen Weg ein Update hereinkommt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdatePath {
    /// Gerät fragt periodisch die Release-Registry ab
    Pull,
    /// Entwickler schiebt ein Image über das lokale Netz
    Push,
}

impl UpdatePath {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdatePath::Pull => "pull",
            UpdatePath::Push => "push",
        }
    }
}

/// Phase einer laufenden [`UpdateSession`](crate::session::UpdateSession)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateStage {
    Probing,
    Receiving,
    Verifying,
    Applying,
    Done,
    Failed,
}

/// Zustand eines Hintergrund-Loops
///
/// Der Poll-Loop nutzt nur `Stopped` und `Running`, der Push-Loop
/// die restlichen Zustände.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WorkerState {
    Stopped = 0,
    Running = 1,
    Idle = 2,
    AwaitingSession = 3,
    Receiving = 4,
    Verifying = 5,
    Applying = 6,
    Failed = 7,
}

impl WorkerState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => WorkerState::Running,
            2 => WorkerState::Idle,
            3 => WorkerState::AwaitingSession,
            4 => WorkerState::Receiving,
            5 => WorkerState::Verifying,
            6 => WorkerState::Applying,
            7 => WorkerState::Failed,
            _ => WorkerState::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Running => "running",
            WorkerState::Idle => "idle",
            WorkerState::AwaitingSession => "awaiting_session",
            WorkerState::Receiving => "receiving",
            WorkerState::Verifying => "verifying",
            WorkerState::Applying => "applying",
            WorkerState::Failed => "failed",
        }
    }
}

impl From<UpdateStage> for WorkerState {
    fn from(stage: UpdateStage) -> Self {
        match stage {
            UpdateStage::Probing | UpdateStage::Receiving => WorkerState::Receiving,
            UpdateStage::Verifying => WorkerState::Verifying,
            UpdateStage::Applying => WorkerState::Applying,
            UpdateStage::Done => WorkerState::Idle,
            UpdateStage::Failed => WorkerState::Failed,
        }
    }
}

/// Persistierte Update-Einstellungen
///
/// Gehört dem externen Konfigurations-Speicher. Die Engine liest sie
/// nur und schreibt sie ausschliesslich über den
/// [`UpdateCoordinator`](crate::coordinator::UpdateCoordinator) zurück.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateConfig {
    #[serde(default = "default_true")]
    pub pull_enabled: bool,
    #[serde(default)]
    pub push_enabled: bool,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default = "default_true")]
    pub require_signed_firmware: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            pull_enabled: true,
            push_enabled: false,
            channel: Channel::Stable,
            require_signed_firmware: true,
        }
    }
}

/// Kandidat aus der Release-Liste eines Poll-Zyklus
///
/// Leiht sich die Strings aus dem Metadaten-Buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseCandidate<'a> {
    /// Versions-Tag (z.B. "v0.2.3")
    pub name: &'a str,
    /// ISO-8601 Zeitstempel, nur für die Sortierung
    pub published_at: &'a str,
    /// Dateiname des Firmware-Assets
    pub asset_path: &'a str,
}

/// Aufgelöstes Download-Ziel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub download_url: Url,
}

impl ResolvedArtifact {
    pub fn url(&self) -> &str {
        self.download_url.as_str()
    }
}

/// Antwort auf die HEAD-Probe vor dem Download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    /// `Location` Header bei Redirects
    pub location: Option<Url>,
}

/// Erfolgreicher Ausgang von `apply()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApplyOutcome {
    /// Neues Image geschrieben, verifiziert und als bootbar markiert
    Applied,
    /// Ziel entspricht der laufenden Version, nichts geschrieben
    NoUpdateNeeded,
}

/// Identität der laufenden Firmware
#[derive(Debug, Clone, Copy)]
pub struct FirmwareIdentity<'a> {
    /// Versions-Token (z.B. "v0.2.3" oder "DEV")
    pub version: &'a str,
    /// Einkompilierte Signatur
    pub signature: &'a PartitionSignature,
}

/// Eingehende Einladung des lokalen Push-Protokolls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushInvitation {
    /// Absender der Einladung (UDP)
    pub peer: SocketAddrV4,
    /// TCP-Port, auf dem der Sender das Image bereitstellt
    pub data_port: u16,
    /// Angekündigte Image-Grösse in Bytes
    pub size: u32,
    /// MD5 des Images
    pub digest: [u8; 16],
}

/// Event für Fortschritt und Ergebnis eines Updates
///
/// Wird über einen PubSubChannel an Dashboard, Status-LED und Logs verteilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateEvent {
    Started { path: UpdatePath, total: u32 },
    Progress { path: UpdatePath, written: u32, total: u32 },
    Applied { path: UpdatePath },
    Failed { path: UpdatePath, error: UpdateError },
}

impl UpdateEvent {
    pub fn path(&self) -> UpdatePath {
        match *self {
            UpdateEvent::Started { path, .. }
            | UpdateEvent::Progress { path, .. }
            | UpdateEvent::Applied { path }
            | UpdateEvent::Failed { path, .. } => path,
        }
    }
}
