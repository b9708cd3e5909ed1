//! Start/Stop-Signal eines Update-Pfads
//!
//! Der Coordinator schaltet, der Loop des Pfads wartet darauf. Abbruch ist
//! kooperativ: der Loop prüft das Flag an seinen Yield-Punkten.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

use crate::types::WorkerState;

pub struct PathControl<M: RawMutex> {
    enabled: AtomicBool,
    state: AtomicU8,
    changed: Signal<M, bool>,
}

impl<M: RawMutex> PathControl<M> {
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            state: AtomicU8::new(WorkerState::Stopped as u8),
            changed: Signal::new(),
        }
    }

    /// Setzt das Flag und weckt den Loop
    ///
    /// # Rückgabe
    /// `true` wenn sich der Wert geändert hat (sonst No-Op)
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous == enabled {
            return false;
        }
        self.changed.signal(enabled);
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Kehrt zurück sobald der Pfad aktiviert ist
    pub async fn wait_enabled(&self) {
        while !self.is_enabled() {
            self.changed.wait().await;
        }
    }

    /// Kehrt zurück sobald der Pfad deaktiviert ist
    pub async fn wait_disabled(&self) {
        while self.is_enabled() {
            self.changed.wait().await;
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_set_enabled_is_idempotent() {
        let control = PathControl::<NoopRawMutex>::new(false);
        assert!(control.set_enabled(true));
        assert!(!control.set_enabled(true));
        assert!(control.set_enabled(false));
        assert!(!control.set_enabled(false));
    }

    #[test]
    fn test_wait_returns_immediately_in_target_state() {
        let control = PathControl::<NoopRawMutex>::new(true);
        block_on(control.wait_enabled());
        control.set_enabled(false);
        block_on(control.wait_disabled());
    }

    #[test]
    fn test_stale_signal_does_not_end_wait_early() {
        let control = PathControl::<NoopRawMutex>::new(false);
        control.set_enabled(true);
        control.set_enabled(false);
        // Signal ist gesetzt, das Flag aber wieder aus
        let waited = embassy_futures::poll_once(control.wait_enabled());
        assert!(waited.is_pending());
    }

    #[test]
    fn test_state_roundtrip() {
        let control = PathControl::<NoopRawMutex>::new(false);
        assert_eq!(control.state(), WorkerState::Stopped);
        control.set_state(WorkerState::AwaitingSession);
        assert_eq!(control.state(), WorkerState::AwaitingSession);
    }
}
