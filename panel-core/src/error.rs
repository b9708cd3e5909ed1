//! Fehler-Typen der Update-Engine
//!
//! Alle Fehler werden lokal in den Update-Loops behandelt (geloggt,
//! danach läuft der Loop weiter). Keiner davon beendet die Firmware.

/// Netzwerk-/Protokoll-Fehler eines Transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Hostname konnte nicht aufgelöst werden
    Dns,
    /// TCP-Verbindung fehlgeschlagen
    Connect,
    /// TLS-Handshake oder TLS-Record fehlerhaft
    Tls,
    /// Deadline überschritten
    Timeout,
    /// Gegenstelle hat die Verbindung geschlossen
    Closed,
    /// HTTP-Status ausserhalb des erwarteten Bereichs
    Status(u16),
    /// Antwort konnte nicht interpretiert werden
    InvalidResponse,
    /// Antwort passt nicht in den bereitgestellten Buffer
    BufferTooSmall,
    /// Zu viele HTTP-Redirects
    TooManyRedirects,
    /// URL länger als `URL_CAPACITY`
    UrlTooLong,
    /// Prüfsumme des Push-Images stimmt nicht
    DigestMismatch,
    /// Listener-Socket konnte nicht gebunden werden
    Bind,
}

/// Fehler beim Zugriff auf die inaktive Flash-Partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Keine OTA-Partition gefunden
    NoUpdatePartition,
    /// Löschen fehlgeschlagen
    EraseFailed,
    /// Schreiben fehlgeschlagen
    WriteFailed,
    /// Lesen fehlgeschlagen
    ReadFailed,
    /// Boot-Partition konnte nicht umgestellt werden
    ActivateFailed,
}

/// Fehler des Konfigurations-Speichers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Record konnte nicht serialisiert werden
    Encode,
    /// Flash-Schreibzugriff fehlgeschlagen
    WriteFailed,
}

/// Ergebnis-Taxonomie eines Update-Versuchs
///
/// `NoUpdateNeeded` ist kein Fehler und steckt in
/// [`ApplyOutcome`](crate::types::ApplyOutcome).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateError {
    /// Kein passendes Release gefunden
    NotFound,
    /// Netzwerk, DNS, TLS oder Stream-Fehler
    Transport(TransportError),
    /// Signatur des neuen Images passt nicht zu dieser Firmware
    SignatureMismatch,
    /// Ein anderer Update-Pfad schreibt gerade die Partition
    Busy,
    /// Pfad wurde während des Downloads deaktiviert
    Aborted,
    /// Flash-Zugriff fehlgeschlagen
    Flash(FlashError),
    /// Image leer, zu gross oder unvollständig
    InvalidImage,
}

impl From<TransportError> for UpdateError {
    fn from(error: TransportError) -> Self {
        UpdateError::Transport(error)
    }
}

impl From<FlashError> for UpdateError {
    fn from(error: FlashError) -> Self {
        UpdateError::Flash(error)
    }
}

impl UpdateError {
    /// Kurzer, stabiler Name für Logs und das Dashboard
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateError::NotFound => "not_found",
            UpdateError::Transport(TransportError::DigestMismatch) => "digest_mismatch",
            UpdateError::Transport(TransportError::Timeout) => "timeout",
            UpdateError::Transport(_) => "transport",
            UpdateError::SignatureMismatch => "signature_mismatch",
            UpdateError::Busy => "busy",
            UpdateError::Aborted => "aborted",
            UpdateError::Flash(_) => "flash",
            UpdateError::InvalidImage => "invalid_image",
        }
    }
}
