// Library-Root: Hardware-Bindings der Update-Engine und Embassy Tasks
// Keine Standard-Bibliothek (Embedded System)
#![no_std]

// Module
pub mod config;
pub mod hal;
pub mod net;
pub mod tasks;
pub mod web;

// Re-exports von panel-core
pub use panel_core::{
    FirmwareIdentity, LedError, SmartLedWriter, UpdateConfig, UpdateEvent, UpdatePath,
};

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Subscriber};
use esp_storage::FlashStorage;
use panel_core::UpdateCoordinator;

use crate::config::{FIRMWARE_SIGNATURE, FW_VERSION};
use crate::hal::{FlashConfigStore, OtaSlot};

/// Identität der laufenden Firmware (Version + einkompilierter Cookie)
pub const FIRMWARE_IDENTITY: FirmwareIdentity<'static> = FirmwareIdentity {
    version: FW_VERSION,
    signature: &FIRMWARE_SIGNATURE,
};

// ============================================================================
// Type-Aliase für geteilte Ressourcen
// ============================================================================
//
// Alle Tasks laufen auf einem Executor, daher reicht NoopRawMutex.

/// Flash-Treiber, geteilt zwischen OTA-Partition und Einstellungs-Record
pub type SharedFlash = BlockingMutex<NoopRawMutex, RefCell<FlashStorage<'static>>>;

/// Update Coordinator mit den Flash-Bindings dieser Firmware
pub type Coordinator = UpdateCoordinator<NoopRawMutex, FlashConfigStore, OtaSlot>;

/// PubSubChannel für Update-Events
/// - 8: Nachrichten-Kapazität im Queue
/// - 6: Maximale Anzahl Subscribers (Status-LED + WebSockets)
/// - 0: Keine Publisher-Slots, die Engine published immediate
pub type UpdateEventChannel = PubSubChannel<NoopRawMutex, UpdateEvent, 8, 6, 0>;

/// Subscriber für Update-Events
pub type UpdateEventSubscriber = Subscriber<'static, NoopRawMutex, UpdateEvent, 8, 6, 0>;
