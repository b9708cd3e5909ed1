// Projekt-Konfiguration: Konstanten und Hardware-Zuordnungen
#![allow(dead_code)]

use embassy_time::Duration;
use panel_core::PartitionSignature;
use panel_core::resolver::ReleaseSource;

// ============================================================================
// Firmware-Identität
// ============================================================================

/// Versions-Token der laufenden Firmware
/// Wird zur Build-Zeit aus FW_VERSION geladen (CI setzt den Release-Tag).
/// Lokale Builds heissen "DEV" und werden nie als aktuell erkannt.
pub const FW_VERSION: &str = match option_env!("FW_VERSION") {
    Some(version) => version,
    None => "DEV",
};

/// Cookie dieser Firmware-Familie
/// Nur Images mit identischem Cookie werden bei aktivem
/// "signed firmware only" übernommen.
pub const MAGIC_COOKIE: &str = "status_FW";

/// Einkompilierte Signatur (siehe `SIGNATURE_BLOCK` in main.rs)
pub const FIRMWARE_SIGNATURE: PartitionSignature = PartitionSignature::new(MAGIC_COOKIE);

// ============================================================================
// Release-Quelle (Pull-Pfad)
// ============================================================================

/// "<owner>/<repo>" der Release-Registry
/// Kann zur Build-Zeit über REPO_URL überschrieben werden
pub const REPO_URL: &str = match option_env!("REPO_URL") {
    Some(repo) => repo,
    None => "elliotmatson/esp32-hub75-status",
};

/// Dateiname des Firmware-Assets in jedem Release
pub const FIRMWARE_ASSET: &str = "esp32c6.bin";

/// Anzahl Releases im Metadaten-Request (per_page)
pub const RELEASE_PAGE_SIZE: u8 = 4;

pub const RELEASE_SOURCE: ReleaseSource<'static> = ReleaseSource {
    web_host: "github.com",
    api_host: "api.github.com",
    repository: REPO_URL,
    asset: FIRMWARE_ASSET,
    page_size: RELEASE_PAGE_SIZE,
};

/// Intervall zwischen zwei Poll-Zyklen
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// User-Agent (GitHub API lehnt Requests ohne ab)
pub const HTTP_USER_AGENT: &str = "hub75-status";

/// Deadline für Verbindungsaufbau und Request
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Deadline pro gelesenem Body-Chunk
pub const HTTP_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximale Anzahl verfolgter Redirects
pub const HTTP_MAX_REDIRECTS: u8 = 5;

/// TLS Record Buffer (Lesen)
/// 16 KB Record + Overhead, kleiner geht mit GitHub nicht
pub const TLS_READ_BUFFER_SIZE: usize = 16_640;

/// TLS Record Buffer (Schreiben)
pub const TLS_WRITE_BUFFER_SIZE: usize = 4096;

/// Buffer für HTTP Response-Header
/// Redirects des Asset-CDNs haben sehr lange Location-Header
pub const HTTP_HEADER_BUFFER_SIZE: usize = 4096;

/// Buffer für die Release-Metadaten
pub const METADATA_BUFFER_SIZE: usize = 32_768;

/// Chunk-Grösse beim Schreiben in die Partition
pub const DOWNLOAD_CHUNK_SIZE: usize = 1024;

/// TCP Buffer-Größen des HTTPS-Clients
pub const HTTPS_TCP_BUFFER_SIZE: usize = 4096;

// ============================================================================
// Push-Pfad (espota)
// ============================================================================

/// UDP Port für Einladungen
pub const PUSH_PORT: u16 = panel_core::push::PUSH_PORT;

/// Abfrage-Intervall des Listeners
pub const PUSH_POLL_INTERVAL: Duration = panel_core::push::DEFAULT_POLL_INTERVAL;

/// Deadline für die TCP-Verbindung zum Sender
pub const PUSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline pro gelesenem Chunk vom Sender
pub const PUSH_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Wartezeit nach fehlgeschlagenem Bind
pub const PUSH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// TCP Buffer-Größen der Datenverbindung
pub const PUSH_TCP_BUFFER_SIZE: usize = 2048;

/// UDP Buffer-Größe für Einladungen
pub const PUSH_UDP_BUFFER_SIZE: usize = 256;

// ============================================================================
// LED Konfiguration
// ============================================================================

/// RMT Taktfrequenz in MHz
/// 80 MHz ist optimal für WS2812 LED-Timing
pub const RMT_CLOCK_MHZ: u32 = 80;

/// Schritte des Fade-Outs vor dem Neustart
pub const RESTART_FADE_STEPS: u8 = 20;

/// Dauer eines Fade-Schritts
pub const RESTART_FADE_STEP: Duration = Duration::from_millis(50);

// ============================================================================
// WiFi Konfiguration
// ============================================================================

/// WiFi SSID (Netzwerk-Name)
/// Wird zur Build-Zeit aus der Environment Variable WIFI_SSID geladen
pub const WIFI_SSID: &str = env!(
    "WIFI_SSID",
    "WiFi SSID nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// WiFi Passwort
/// Wird zur Build-Zeit aus der Environment Variable WIFI_PASSWORD geladen
pub const WIFI_PASSWORD: &str = env!(
    "WIFI_PASSWORD",
    "WiFi Password nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// Wartezeit nach fehlgeschlagenem Verbindungsversuch
pub const WIFI_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Heap-Größe für WiFi (Bytes)
pub const WIFI_HEAP_SIZE: usize = 65536; // 64 KB

/// Zusätzliche Heap-Größe (Bytes)
pub const EXTRA_HEAP_SIZE: usize = 36864; // 36 KB

// ============================================================================
// mDNS-Konfiguration
// ============================================================================

/// mDNS Hostname (ohne .local suffix)
/// Das Panel ist erreichbar unter: <MDNS_HOSTNAME>.local
pub const MDNS_HOSTNAME: &str = "status";

/// Instanz-Name des Push-Service (`_arduino._tcp`)
pub const MDNS_SERVICE_NAME: &str = "status";

/// mDNS TTL (Time To Live) in Sekunden
pub const MDNS_TTL_SECS: u32 = 120;

/// mDNS Reconnect Delay in Sekunden
pub const MDNS_RECONNECT_DELAY_SECS: u64 = 5;

/// mDNS Port (Standard: 5353)
pub const MDNS_PORT: u16 = 5353;

/// mDNS IPv4 Multicast-Adresse (224.0.0.251)
pub const MDNS_MULTICAST_ADDR: [u8; 4] = [224, 0, 0, 251];

/// UDP Buffer-Größen für mDNS (TX, RX in Bytes)
pub const MDNS_UDP_BUFFER_SIZE: usize = 512;

/// mDNS Receive/Send Buffer-Größen in Bytes
pub const MDNS_PACKET_BUFFER_SIZE: usize = 1500;

// ============================================================================
// HTTP Server Konfiguration
// ============================================================================

/// Anzahl paralleler HTTP Server Tasks
pub const HTTP_TASK_POOL_SIZE: usize = 3;

/// HTTP Buffer-Größe in Bytes
pub const HTTP_BUFFER_SIZE: usize = 1024;

/// TCP RX Buffer-Größe in Bytes
pub const TCP_RX_BUFFER_SIZE: usize = 1024;

/// TCP TX Buffer-Größe in Bytes
pub const TCP_TX_BUFFER_SIZE: usize = 1024;

/// WebSocket Message Buffer-Größe in Bytes
pub const WEBSOCKET_BUFFER_SIZE: usize = 256;

/// JSON Serialisierungs-Buffer für WebSocket Nachrichten
pub const JSON_BUFFER_SIZE: usize = 256;
