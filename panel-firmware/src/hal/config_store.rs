// Einstellungs-Record im Flash
//
// Die Update-Einstellungen liegen als JSON im ersten Sektor der
// nvs-Partition:
//
//   [magic: u32 LE][len: u16 LE][reserved: u16][JSON ...][0xFF Padding]
//
// Fehlt der Record oder ist er kaputt, gelten die Defaults.

use defmt::{error, info, warn};
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use esp_bootloader_esp_idf::partitions::{
    self, DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType,
};
use panel_core::{ConfigStore, StoreError, UpdateConfig};

use crate::SharedFlash;

/// Kennung des Records ("PNLU")
const RECORD_MAGIC: u32 = u32::from_le_bytes(*b"PNLU");

const HEADER_LEN: usize = 8;

/// Maximale Länge des JSON-Teils
const PAYLOAD_CAPACITY: usize = 248;

const RECORD_LEN: usize = HEADER_LEN + PAYLOAD_CAPACITY;

const SECTOR_SIZE: u32 = 4096;

/// Persistente [`UpdateConfig`], im RAM gecacht
pub struct FlashConfigStore {
    flash: &'static SharedFlash,
    config: UpdateConfig,
}

impl FlashConfigStore {
    /// Liest den Record einmalig beim Boot
    pub fn load(flash: &'static SharedFlash) -> Self {
        let config = match read_record(flash) {
            Some(config) => {
                info!("Config: record loaded");
                config
            }
            None => {
                info!("Config: no valid record, using defaults");
                UpdateConfig::default()
            }
        };
        Self { flash, config }
    }
}

impl ConfigStore for FlashConfigStore {
    fn get(&self) -> UpdateConfig {
        self.config
    }

    fn put(&mut self, config: &UpdateConfig) -> Result<(), StoreError> {
        if *config == self.config {
            return Ok(());
        }

        let mut record = [0xFFu8; RECORD_LEN];
        let len = serde_json_core::to_slice(config, &mut record[HEADER_LEN..])
            .map_err(|_| StoreError::Encode)?;
        record[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        record[4..6].copy_from_slice(&(len as u16).to_le_bytes());
        record[6..8].copy_from_slice(&[0, 0]);

        // Cache erst nach erfolgreichem Schreiben nachziehen
        write_record(self.flash, &record)?;
        self.config = *config;
        Ok(())
    }
}

fn read_record(flash: &SharedFlash) -> Option<UpdateConfig> {
    let mut record = [0u8; RECORD_LEN];
    let mut table = [0u8; PARTITION_TABLE_MAX_LEN];

    flash.lock(|flash| {
        let mut flash = flash.borrow_mut();
        let pt = partitions::read_partition_table(&mut *flash, &mut table).ok()?;
        let entry = pt
            .find_partition(PartitionType::Data(DataPartitionSubType::Nvs))
            .ok()
            .flatten()?;
        let mut region = entry.as_embedded_storage(&mut *flash);
        region.read(0, &mut record).ok()
    })?;

    let magic = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
    if magic != RECORD_MAGIC {
        return None;
    }
    let len = u16::from_le_bytes([record[4], record[5]]) as usize;
    if len > PAYLOAD_CAPACITY {
        warn!("Config: record length {} out of range", len);
        return None;
    }

    match serde_json_core::from_slice::<UpdateConfig>(&record[HEADER_LEN..HEADER_LEN + len]) {
        Ok((config, _)) => Some(config),
        Err(_) => {
            warn!("Config: record not parseable");
            None
        }
    }
}

fn write_record(flash: &SharedFlash, record: &[u8; RECORD_LEN]) -> Result<(), StoreError> {
    let mut table = [0u8; PARTITION_TABLE_MAX_LEN];

    flash.lock(|flash| {
        let mut flash = flash.borrow_mut();
        let pt = partitions::read_partition_table(&mut *flash, &mut table)
            .map_err(|_| StoreError::WriteFailed)?;
        let entry = pt
            .find_partition(PartitionType::Data(DataPartitionSubType::Nvs))
            .map_err(|_| StoreError::WriteFailed)?
            .ok_or(StoreError::WriteFailed)?;
        let mut region = entry.as_embedded_storage(&mut *flash);

        region.erase(0, SECTOR_SIZE).map_err(|e| {
            error!("Config: erase failed: {}", e);
            StoreError::WriteFailed
        })?;
        region.write(0, record).map_err(|e| {
            error!("Config: write failed: {}", e);
            StoreError::WriteFailed
        })
    })
}
