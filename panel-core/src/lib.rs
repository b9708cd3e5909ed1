//! Panel Core - Update & Release-Resolution Engine
//!
//! Diese Crate enthält KEINE Hardware-Dependencies.
//! Sie definiert Traits, Pure Functions und die beiden Update-Loops,
//! die Firmware liefert Flash, Netzwerk und Speicher dazu.
//!
//! # Module
//! - [`resolver`]: Kanal -> Download-URL
//! - [`applier`]: Probe, Download, Signaturprüfung, Aktivierung
//! - [`signature`]: Partition-Cookie
//! - [`session`]: Single-Writer Lock der inaktiven Partition
//! - [`scheduler`] / [`push`]: die beiden Hintergrund-Loops
//! - [`coordinator`]: Ein/Aus der Pfade, Persistenz

#![no_std]

#[macro_use]
mod fmt;

pub mod applier;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod logic;
pub mod push;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod signature;
pub mod traits;
pub mod types;

// Re-exports für einfachen Zugriff
pub use applier::{ApplyOptions, apply};
pub use control::PathControl;
pub use coordinator::{UpdateCoordinator, UpdateStatus};
pub use error::{FlashError, StoreError, TransportError, UpdateError};
pub use logic::{embeds_version, feedback_color, progress_percent};
pub use resolver::{ReleaseSource, resolve};
pub use session::{PartitionLock, UpdateSession};
pub use signature::{PartitionSignature, SignatureBlock, SignatureCheck};
pub use traits::{
    ConfigStore, FirmwarePartition, FirmwareTransport, ImageSink, LedError, PushListener,
    SmartLedWriter, UpdateEventSink,
};
pub use types::{
    ApplyOutcome, Channel, FirmwareIdentity, PushInvitation, UpdateConfig, UpdateEvent,
    UpdatePath, WorkerState,
};
