// Inaktive OTA-Partition
//
// Implementiert `FirmwarePartition` über den OtaUpdater von
// esp-bootloader-esp-idf. Die Partitionstabelle wird bei jedem Zugriff
// neu gelesen, damit kein Borrow auf den Flash-Treiber über einen
// await-Punkt hinweg gehalten wird.

use defmt::{error, info, warn};
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use esp_bootloader_esp_idf::ota::OtaImageState;
use esp_bootloader_esp_idf::ota_updater::OtaUpdater;
use esp_bootloader_esp_idf::partitions::{FlashRegion, PARTITION_TABLE_MAX_LEN};
use esp_storage::FlashStorage;
use panel_core::{FirmwarePartition, FlashError};

use crate::SharedFlash;

/// Flash-Sektorgrösse (Erase-Einheit)
const SECTOR_SIZE: u32 = 4096;

/// Schreib-Granularität des Flash
const WORD_SIZE: usize = 4;

/// Die jeweils nicht laufende App-Partition (ota_0 / ota_1)
pub struct OtaSlot {
    flash: &'static SharedFlash,
    table: [u8; PARTITION_TABLE_MAX_LEN],
    capacity: u32,
    /// Angekündigte Image-Grösse
    size: u32,
    /// Bereits in den Flash geschriebene Bytes (word-aligned)
    offset: u32,
    /// Rest eines Chunks, der noch kein ganzes Wort füllt
    carry: [u8; WORD_SIZE],
    carry_len: usize,
}

impl OtaSlot {
    /// Liest die Partitionstabelle und bestimmt die Grösse der Ziel-Partition
    ///
    /// # Fehlerbehandlung
    /// `FlashError::NoUpdatePartition` ohne OTA-Partitionen in der Tabelle
    pub fn new(flash: &'static SharedFlash) -> Result<Self, FlashError> {
        let mut slot = Self {
            flash,
            table: [0; PARTITION_TABLE_MAX_LEN],
            capacity: 0,
            size: 0,
            offset: 0,
            carry: [0xFF; WORD_SIZE],
            carry_len: 0,
        };
        slot.capacity = slot.with_region(|region| Ok(region.partition_size() as u32))?;
        info!("OTA: update partition has {} bytes", slot.capacity);
        Ok(slot)
    }

    /// Führt `f` auf der nächsten (inaktiven) Partition aus
    fn with_region<R>(
        &mut self,
        f: impl FnOnce(&mut FlashRegion<'_, FlashStorage<'static>>) -> Result<R, FlashError>,
    ) -> Result<R, FlashError> {
        let table = &mut self.table;
        self.flash.lock(|flash| {
            let mut flash = flash.borrow_mut();
            let mut ota = OtaUpdater::new(&mut *flash, table).map_err(|e| {
                error!("OTA: partition table unreadable: {}", e);
                FlashError::NoUpdatePartition
            })?;
            let (mut region, _slot) = ota
                .next_partition()
                .map_err(|_| FlashError::NoUpdatePartition)?;
            f(&mut region)
        })
    }

    /// Schreibt ganze Wörter ab dem aktuellen Offset
    fn write_words(&mut self, words: &[u8]) -> Result<(), FlashError> {
        if words.is_empty() {
            return Ok(());
        }
        let offset = self.offset;
        self.with_region(|region| {
            region
                .write(offset, words)
                .map_err(|_| FlashError::WriteFailed)
        })?;
        self.offset += words.len() as u32;
        Ok(())
    }

    fn flush_carry(&mut self) -> Result<(), FlashError> {
        if self.carry_len == 0 {
            return Ok(());
        }
        // Auf ein volles Wort mit 0xFF (gelöschter Zustand) auffüllen
        let word = self.carry;
        self.write_words(&word)?;
        self.carry = [0xFF; WORD_SIZE];
        self.carry_len = 0;
        Ok(())
    }

    fn reset(&mut self) {
        self.size = 0;
        self.offset = 0;
        self.carry = [0xFF; WORD_SIZE];
        self.carry_len = 0;
    }
}

impl FirmwarePartition for OtaSlot {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn begin(&mut self, size: u32) -> Result<(), FlashError> {
        self.reset();
        let erase_len = size.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
        info!("OTA: erasing {} bytes", erase_len);
        self.with_region(|region| {
            region
                .erase(0, erase_len)
                .map_err(|_| FlashError::EraseFailed)
        })?;
        self.size = size;
        Ok(())
    }

    fn write(&mut self, mut data: &[u8]) -> Result<(), FlashError> {
        // Angefangenes Wort zuerst auffüllen
        if self.carry_len > 0 {
            let take = (WORD_SIZE - self.carry_len).min(data.len());
            self.carry[self.carry_len..self.carry_len + take].copy_from_slice(&data[..take]);
            self.carry_len += take;
            data = &data[take..];
            if self.carry_len < WORD_SIZE {
                return Ok(());
            }
            self.flush_carry()?;
        }

        let aligned = data.len() - data.len() % WORD_SIZE;
        self.write_words(&data[..aligned])?;

        let rest = &data[aligned..];
        self.carry[..rest.len()].copy_from_slice(rest);
        self.carry_len = rest.len();
        Ok(())
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.flush_carry()?;
        self.with_region(|region| region.read(offset, buf).map_err(|_| FlashError::ReadFailed))
    }

    fn mark_bootable(&mut self) -> Result<(), FlashError> {
        self.flush_carry()?;
        let table = &mut self.table;
        self.flash.lock(|flash| {
            let mut flash = flash.borrow_mut();
            let mut ota = OtaUpdater::new(&mut *flash, table)
                .map_err(|_| FlashError::NoUpdatePartition)?;
            ota.activate_next_partition()
                .map_err(|_| FlashError::ActivateFailed)?;
            ota.set_current_ota_state(OtaImageState::New)
                .map_err(|_| FlashError::ActivateFailed)
        })?;
        info!("OTA: next partition activated ({} bytes)", self.size);
        self.reset();
        Ok(())
    }

    fn abort(&mut self) {
        // Ersten Sektor löschen: ohne Image-Header bootet die Partition nie
        let result = self.with_region(|region| {
            region
                .erase(0, SECTOR_SIZE)
                .map_err(|_| FlashError::EraseFailed)
        });
        if let Err(e) = result {
            warn!("OTA: could not invalidate partition: {}", e);
        }
        self.reset();
    }
}
