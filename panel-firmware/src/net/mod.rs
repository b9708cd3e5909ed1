// Netzwerk-Transports der Update-Engine
//
// - https: Release-Registry und Asset-Download (Pull)
// - espota: lokales Push-Protokoll

pub mod espota;
pub mod https;

pub use espota::{EspOtaBuffers, EspOtaListener};
pub use https::{HttpsTcpClient, HttpsTransport};
