//! Hardware Abstraction Traits
//!
//! Diese Traits definieren die Schnittstellen der Update-Engine zu Flash,
//! Netzwerk, Konfigurations-Speicher und Status-LED, ohne konkrete
//! Implementierung.
//!
//! # Implementierungen
//! - **Production:** `panel-firmware` (esp-hal, embassy-net, reqwless)
//! - **Testing:** Mocks in `panel-tests`

#![allow(async_fn_in_trait)]

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::pubsub::PubSubChannel;
use rgb::RGB8;

use crate::error::{FlashError, StoreError, TransportError, UpdateError};
use crate::types::{ApplyOutcome, ProbeResponse, PushInvitation, UpdateConfig, UpdateEvent};

/// Fehler-Typ für LED-Operationen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedError {
    WriteFailed,
}

/// Trait für SmartLED Hardware-Zugriff
///
/// Die Status-LED zeigt Fortschritt und Ergebnis eines Updates.
pub trait SmartLedWriter: Send {
    /// Schreibt eine RGB-Farbe auf die LED
    ///
    /// # Fehlerbehandlung
    /// Gibt `LedError::WriteFailed` zurück wenn Hardware-Zugriff fehlschlägt
    fn write(&mut self, color: RGB8) -> Result<(), LedError>;
}

/// Die inaktive Firmware-Partition
///
/// Schreibzugriffe erfolgen sequentiell ab Offset 0. Erst
/// `mark_bootable()` macht das Image für den Bootloader sichtbar.
pub trait FirmwarePartition {
    /// Grösse der Partition in Bytes
    fn capacity(&self) -> u32;

    /// Bereitet die Partition für ein Image mit `size` Bytes vor (Erase)
    fn begin(&mut self, size: u32) -> Result<(), FlashError>;

    /// Hängt `data` an das bisher geschriebene Image an
    fn write(&mut self, data: &[u8]) -> Result<(), FlashError>;

    /// Liest bereits geschriebene Bytes ab `offset`
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Aktiviert die Partition für den nächsten Boot
    fn mark_bootable(&mut self) -> Result<(), FlashError>;

    /// Verwirft ein unvollständiges oder abgelehntes Image
    ///
    /// Danach darf der Bootloader die Partition nicht mehr auswählen.
    fn abort(&mut self);
}

/// Ziel eines Image-Streams
///
/// Transports schreiben über diesen Trait, ohne die Session zu kennen.
pub trait ImageSink {
    /// Wird einmal vor dem ersten Chunk mit der Gesamtgrösse aufgerufen
    fn begin(&mut self, total: u32) -> Result<(), UpdateError>;

    /// Nimmt den nächsten Chunk entgegen
    fn write(&mut self, chunk: &[u8]) -> Result<(), UpdateError>;
}

/// HTTP(S)-Zugriff für den Pull-Pfad
pub trait FirmwareTransport {
    /// GET auf `url`, Body landet in `buf`
    ///
    /// # Rückgabe
    /// Anzahl der gelesenen Bytes
    async fn fetch(&mut self, url: &str, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// HEAD auf `url` ohne Redirects zu folgen
    async fn probe(&mut self, url: &str) -> Result<ProbeResponse, TransportError>;

    /// GET auf `url` (Redirects werden verfolgt), Body geht in `sink`
    async fn download<S: ImageSink>(&mut self, url: &str, sink: &mut S) -> Result<(), UpdateError>;
}

/// Listener des lokalen Push-Protokolls
pub trait PushListener {
    /// Öffnet den Listener-Socket
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Schliesst den Listener-Socket (idempotent)
    fn close(&mut self);

    /// Wartet auf die nächste Einladung
    ///
    /// Ungültige Einladungen werden intern beantwortet und verworfen.
    async fn next_invitation(&mut self) -> Result<PushInvitation, TransportError>;

    /// Lehnt eine Einladung ab, ohne eine Datenverbindung aufzubauen
    async fn reject(&mut self, invitation: &PushInvitation);

    /// Nimmt die Einladung an und streamt das Image in `sink`
    async fn receive<S: ImageSink>(
        &mut self,
        invitation: &PushInvitation,
        sink: &mut S,
    ) -> Result<(), UpdateError>;

    /// Meldet das Ergebnis an den Sender und schliesst die Datenverbindung
    async fn conclude(&mut self, result: &Result<ApplyOutcome, UpdateError>);
}

/// Externer Speicher für [`UpdateConfig`]
pub trait ConfigStore {
    fn get(&self) -> UpdateConfig;

    fn put(&mut self, config: &UpdateConfig) -> Result<(), StoreError>;
}

/// Empfänger von [`UpdateEvent`]s
pub trait UpdateEventSink {
    fn emit(&self, event: UpdateEvent);
}

impl<M: RawMutex, const CAP: usize, const SUBS: usize, const PUBS: usize> UpdateEventSink
    for PubSubChannel<M, UpdateEvent, CAP, SUBS, PUBS>
{
    /// Volle Queue verdrängt das älteste Event
    fn emit(&self, event: UpdateEvent) {
        self.immediate_publisher().publish_immediate(event);
    }
}

impl UpdateEventSink for () {
    fn emit(&self, _event: UpdateEvent) {}
}
