//! Update-Session und Single-Writer Lock
//!
//! Die inaktive Partition gehört dem [`PartitionLock`]. Eine
//! [`UpdateSession`] hält den Guard für die gesamte Dauer eines
//! Update-Versuchs. Ein zweiter Versuch scheitert sofort mit `Busy`.
//! Nach einem aktivierten Image bleibt die Partition bis zum Neustart
//! gesperrt.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};

use crate::control::PathControl;
use crate::error::UpdateError;
use crate::logic::ProgressThrottle;
use crate::signature::{self, PartitionSignature, SignatureCheck};
use crate::traits::{FirmwarePartition, ImageSink, UpdateEventSink};
use crate::types::{ApplyOutcome, UpdateEvent, UpdatePath, UpdateStage};

pub struct PartitionLock<M: RawMutex, P> {
    partition: Mutex<M, P>,
    restart_pending: AtomicBool,
}

impl<M: RawMutex, P: FirmwarePartition> PartitionLock<M, P> {
    pub const fn new(partition: P) -> Self {
        Self {
            partition: Mutex::new(partition),
            restart_pending: AtomicBool::new(false),
        }
    }

    /// Startet eine Session, ohne zu warten
    ///
    /// # Fehlerbehandlung
    /// `UpdateError::Busy` wenn bereits eine Session läuft oder ein
    /// aktiviertes Image auf den Neustart wartet
    pub fn try_begin(&self, path: UpdatePath) -> Result<UpdateSession<'_, M, P>, UpdateError> {
        if self.is_restart_pending() {
            warn!("Update: {} refused, restart pending", path.as_str());
            return Err(UpdateError::Busy);
        }
        let guard = self.partition.try_lock().map_err(|_| {
            warn!("Update: {} refused, partition busy", path.as_str());
            UpdateError::Busy
        })?;

        Ok(UpdateSession {
            path,
            stage: UpdateStage::Probing,
            bytes_total: 0,
            bytes_written: 0,
            last_error: None,
            began: false,
            finished: false,
            partition: guard,
            restart_pending: &self.restart_pending,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.is_restart_pending() || self.partition.try_lock().is_err()
    }

    /// Ob ein Image aktiviert wurde und erst nach dem Neustart läuft
    pub fn is_restart_pending(&self) -> bool {
        self.restart_pending.load(Ordering::Acquire)
    }
}

/// Ein laufender Update-Versuch
///
/// Wird die Session ohne `complete()` oder `fail()` gedroppt (z.B. weil
/// der Future abgebrochen wurde), verwirft sie das begonnene Image.
pub struct UpdateSession<'a, M: RawMutex, P: FirmwarePartition> {
    path: UpdatePath,
    stage: UpdateStage,
    bytes_total: u32,
    bytes_written: u32,
    last_error: Option<UpdateError>,
    began: bool,
    finished: bool,
    partition: MutexGuard<'a, M, P>,
    restart_pending: &'a AtomicBool,
}

impl<M: RawMutex, P: FirmwarePartition> UpdateSession<'_, M, P> {
    pub fn path(&self) -> UpdatePath {
        self.path
    }

    pub fn stage(&self) -> UpdateStage {
        self.stage
    }

    pub fn bytes_total(&self) -> u32 {
        self.bytes_total
    }

    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }

    pub fn last_error(&self) -> Option<UpdateError> {
        self.last_error
    }

    /// Ob bereits in die Partition geschrieben wird
    pub fn has_begun(&self) -> bool {
        self.began
    }

    /// Löscht die Partition für ein Image mit `total` Bytes
    pub fn begin(&mut self, total: u32) -> Result<(), UpdateError> {
        if self.began || self.finished {
            return Err(self.fail(UpdateError::InvalidImage));
        }
        if total == 0 || total > self.partition.capacity() {
            warn!(
                "Update: image size {} does not fit partition ({})",
                total,
                self.partition.capacity()
            );
            return Err(self.fail(UpdateError::InvalidImage));
        }

        if let Err(e) = self.partition.begin(total) {
            return Err(self.fail(e.into()));
        }
        self.began = true;
        self.bytes_total = total;
        self.stage = UpdateStage::Receiving;
        Ok(())
    }

    pub fn write(&mut self, chunk: &[u8]) -> Result<(), UpdateError> {
        if !self.began || self.finished {
            return Err(self.fail(UpdateError::InvalidImage));
        }
        let len = chunk.len() as u32;
        if self.bytes_written.saturating_add(len) > self.bytes_total {
            warn!("Update: more data than announced ({} bytes)", self.bytes_total);
            return Err(self.fail(UpdateError::InvalidImage));
        }

        if let Err(e) = self.partition.write(chunk) {
            return Err(self.fail(e.into()));
        }
        self.bytes_written += len;
        Ok(())
    }

    /// Prüft das geschriebene Image und macht es bootbar
    ///
    /// # Ablauf
    /// 1. Vollständigkeit (`bytes_written == bytes_total`)
    /// 2. Signatur, falls `require_signed`
    /// 3. `mark_bootable()`
    ///
    /// `on_stage` wird bei jedem Wechsel nach Verifying und Applying
    /// aufgerufen, bevor der Schritt ausgeführt wird.
    pub fn complete(
        &mut self,
        require_signed: bool,
        expected: &PartitionSignature,
        mut on_stage: impl FnMut(UpdateStage),
    ) -> Result<ApplyOutcome, UpdateError> {
        if !self.began || self.finished || self.bytes_written != self.bytes_total {
            warn!(
                "Update: incomplete image ({}/{} bytes)",
                self.bytes_written,
                self.bytes_total
            );
            return Err(self.fail(UpdateError::InvalidImage));
        }

        self.stage = UpdateStage::Verifying;
        on_stage(self.stage);
        if require_signed {
            if signature::verify(&mut *self.partition, expected) == SignatureCheck::Mismatch {
                error!("Update: signature mismatch, image discarded");
                return Err(self.fail(UpdateError::SignatureMismatch));
            }
            debug!("Update: signature ok");
        }

        self.stage = UpdateStage::Applying;
        on_stage(self.stage);
        if let Err(e) = self.partition.mark_bootable() {
            return Err(self.fail(e.into()));
        }

        self.restart_pending.store(true, Ordering::Release);
        self.stage = UpdateStage::Done;
        self.finished = true;
        info!(
            "Update: {} applied ({} bytes)",
            self.path.as_str(),
            self.bytes_written
        );
        Ok(ApplyOutcome::Applied)
    }

    /// Beendet die Session ohne Schreibzugriff
    pub fn skip(&mut self) -> ApplyOutcome {
        self.stage = UpdateStage::Done;
        self.finished = true;
        ApplyOutcome::NoUpdateNeeded
    }

    /// Beendet die Session mit einem Fehler und verwirft das Image
    ///
    /// Mehrfacher Aufruf ist erlaubt, die Partition wird nur einmal
    /// verworfen.
    pub fn fail(&mut self, error: UpdateError) -> UpdateError {
        if self.began && !self.finished {
            self.partition.abort();
        }
        self.finished = true;
        self.stage = UpdateStage::Failed;
        self.last_error = Some(error);
        error
    }

    /// Meldet das Ergebnis als Event
    ///
    /// Nur Sessions, die bereits Daten empfangen haben, melden einen
    /// Fehler. Eine Probe ohne Download bleibt still.
    pub fn report<E: UpdateEventSink + ?Sized>(
        &self,
        events: &E,
        result: &Result<ApplyOutcome, UpdateError>,
    ) {
        let path = self.path;
        match result {
            Ok(ApplyOutcome::Applied) => events.emit(UpdateEvent::Applied { path }),
            Ok(ApplyOutcome::NoUpdateNeeded) => {}
            Err(error) if self.began => events.emit(UpdateEvent::Failed {
                path,
                error: *error,
            }),
            Err(_) => {}
        }
    }
}

impl<M: RawMutex, P: FirmwarePartition> Drop for UpdateSession<'_, M, P> {
    fn drop(&mut self) {
        if self.began && !self.finished {
            warn!("Update: session dropped mid-transfer, image discarded");
            self.partition.abort();
        }
    }
}

/// [`ImageSink`] auf eine Session, mit Progress-Events
///
/// Mit `cancel` wird vor jedem Chunk geprüft, ob der Pfad noch aktiv ist.
pub struct SessionSink<'s, 'a, M: RawMutex, P: FirmwarePartition, E: UpdateEventSink + ?Sized> {
    session: &'s mut UpdateSession<'a, M, P>,
    events: &'s E,
    cancel: Option<&'s PathControl<M>>,
    throttle: ProgressThrottle,
}

impl<'s, 'a, M: RawMutex, P: FirmwarePartition, E: UpdateEventSink + ?Sized>
    SessionSink<'s, 'a, M, P, E>
{
    pub fn new(
        session: &'s mut UpdateSession<'a, M, P>,
        events: &'s E,
        cancel: Option<&'s PathControl<M>>,
    ) -> Self {
        Self {
            session,
            events,
            cancel,
            throttle: ProgressThrottle::new(),
        }
    }

    fn check_cancelled(&mut self) -> Result<(), UpdateError> {
        match self.cancel {
            Some(control) if !control.is_enabled() => {
                info!("Update: {} disabled, aborting", self.session.path.as_str());
                Err(self.session.fail(UpdateError::Aborted))
            }
            _ => Ok(()),
        }
    }
}

impl<M: RawMutex, P: FirmwarePartition, E: UpdateEventSink + ?Sized> ImageSink
    for SessionSink<'_, '_, M, P, E>
{
    fn begin(&mut self, total: u32) -> Result<(), UpdateError> {
        self.check_cancelled()?;
        self.session.begin(total)?;
        info!("Update: {} receiving {} bytes", self.session.path.as_str(), total);
        self.events.emit(UpdateEvent::Started {
            path: self.session.path,
            total,
        });
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), UpdateError> {
        self.check_cancelled()?;
        self.session.write(chunk)?;

        let written = self.session.bytes_written;
        let total = self.session.bytes_total;
        if self.throttle.update(written, total).is_some() {
            self.events.emit(UpdateEvent::Progress {
                path: self.session.path,
                written,
                total,
            });
        }
        Ok(())
    }
}
