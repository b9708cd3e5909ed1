// Hardware Abstraction Layer (HAL) Module
//
// Implementiert die Traits aus panel-core für die ESP32-C6 Hardware:
// Status-LED, inaktive OTA-Partition und Einstellungs-Record im Flash.

pub mod config_store;
pub mod led_writer;
pub mod ota_slot;

pub use config_store::FlashConfigStore;
pub use led_writer::RmtLedWriter;
pub use ota_slot::OtaSlot;
