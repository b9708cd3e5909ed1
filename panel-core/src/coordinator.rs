//! Update Coordinator
//!
//! Einziger Weg, über den der Rest der Firmware (WebSocket-API, Boot)
//! das Update-Verhalten ändert. Besitzt Konfigurations-Speicher,
//! Partition und die Start/Stop-Signale beider Pfade.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::control::PathControl;
use crate::error::StoreError;
use crate::session::PartitionLock;
use crate::traits::{ConfigStore, FirmwarePartition};
use crate::types::{Channel, UpdateConfig, WorkerState};

/// Momentaufnahme für Dashboard und Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateStatus {
    pub config: UpdateConfig,
    pub pull_state: WorkerState,
    pub push_state: WorkerState,
    pub busy: bool,
}

pub struct UpdateCoordinator<M: RawMutex, C: ConfigStore, P: FirmwarePartition> {
    store: BlockingMutex<M, RefCell<C>>,
    partition: PartitionLock<M, P>,
    pull: PathControl<M>,
    push: PathControl<M>,
}

impl<M: RawMutex, C: ConfigStore, P: FirmwarePartition> UpdateCoordinator<M, C, P> {
    /// Beide Pfade starten deaktiviert, siehe [`Self::restore`]
    pub const fn new(store: C, partition: P) -> Self {
        Self {
            store: BlockingMutex::new(RefCell::new(store)),
            partition: PartitionLock::new(partition),
            pull: PathControl::new(false),
            push: PathControl::new(false),
        }
    }

    /// Aktiviert die Pfade laut gespeicherter Konfiguration (Boot)
    pub fn restore(&self) -> UpdateConfig {
        let config = self.config();
        self.pull.set_enabled(config.pull_enabled);
        self.push.set_enabled(config.push_enabled);
        info!(
            "Updates: restored pull={} push={} channel={}",
            config.pull_enabled,
            config.push_enabled,
            config.channel.as_str()
        );
        config
    }

    /// Aktuelle Konfiguration aus dem Speicher
    pub fn config(&self) -> UpdateConfig {
        self.store.lock(|store| store.borrow().get())
    }

    fn persist(&self, change: impl FnOnce(&mut UpdateConfig)) -> Result<UpdateConfig, StoreError> {
        self.store.lock(|store| {
            let mut store = store.borrow_mut();
            let mut config = store.get();
            change(&mut config);
            store.put(&config)?;
            Ok(config)
        })
    }

    /// Schaltet den Pull-Pfad
    ///
    /// Speichert zuerst, schaltet danach den Loop. Schlägt das Speichern
    /// fehl, ist der Loop trotzdem geschaltet und der Fehler wird
    /// zurückgegeben.
    pub fn set_pull_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        let persisted = self.persist(|c| c.pull_enabled = enabled);
        if self.pull.set_enabled(enabled) {
            info!("Updates: pull {}", if enabled { "enabled" } else { "disabled" });
        }
        persisted.map(|_| ())
    }

    /// Schaltet den Push-Pfad, Verhalten wie [`Self::set_pull_enabled`]
    pub fn set_push_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        let persisted = self.persist(|c| c.push_enabled = enabled);
        if self.push.set_enabled(enabled) {
            info!("Updates: push {}", if enabled { "enabled" } else { "disabled" });
        }
        persisted.map(|_| ())
    }

    /// Wirkt ab dem nächsten Poll-Zyklus
    pub fn set_channel(&self, channel: Channel) -> Result<(), StoreError> {
        self.persist(|c| c.channel = channel)?;
        info!("Updates: channel {}", channel.as_str());
        Ok(())
    }

    /// Wirkt ab der nächsten Session
    pub fn set_require_signed(&self, required: bool) -> Result<(), StoreError> {
        self.persist(|c| c.require_signed_firmware = required)?;
        info!("Updates: signed firmware only = {}", required);
        Ok(())
    }

    pub fn status(&self) -> UpdateStatus {
        UpdateStatus {
            config: self.config(),
            pull_state: self.pull.state(),
            push_state: self.push.state(),
            busy: self.partition.is_busy(),
        }
    }

    pub fn partition(&self) -> &PartitionLock<M, P> {
        &self.partition
    }

    pub fn pull(&self) -> &PathControl<M> {
        &self.pull
    }

    pub fn push(&self) -> &PathControl<M> {
        &self.push
    }
}
