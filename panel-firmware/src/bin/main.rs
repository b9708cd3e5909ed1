// Keine Standard-Bibliothek verwenden (Embedded System)
#![no_std]
// Kein normaler main() Einstiegspunkt (wird von esp_rtos bereitgestellt)
#![no_main]
// Verbiete mem::forget - gefährlich bei ESP HAL Types mit DMA-Buffern
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
// Verbiete große Stack-Frames (Stack ist auf Embedded Systemen begrenzt)
#![deny(clippy::large_stack_frames)]

// Heap Allocator (WiFi benötigt dynamischen Speicher)
extern crate alloc;

use core::cell::RefCell;

// Embassy Async Runtime
use defmt::{error, info};
use embassy_executor::Spawner;
use embassy_net::{Config as NetConfig, Stack, StackResources};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_time::{Duration, Timer};

// ESP32-C6 HAL
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

// Backtrace bei Panic und println!() Support
use {esp_backtrace as _, esp_println as _};

use hub75_status::config::{
    EXTRA_HEAP_SIZE, FIRMWARE_SIGNATURE, FW_VERSION, HTTP_TASK_POOL_SIZE, WIFI_HEAP_SIZE,
};
use hub75_status::hal::{FlashConfigStore, OtaSlot};
use hub75_status::tasks::{
    connection_task, dhcp_task, http_server_task, mdns_responder_task, net_task,
    poll_scheduler_task, push_session_task, update_feedback_task,
};
use hub75_status::{Coordinator, SharedFlash, UpdateEventChannel};
use panel_core::SignatureBlock;

// ESP-IDF App Descriptor - erforderlich für den Bootloader!
// Ohne diesen schlägt das Flashen mit "ESP-IDF App Descriptor missing" fehl
esp_bootloader_esp_idf::esp_app_desc!();

/// Cookie dieser Firmware-Familie, liegt direkt hinter dem App-Descriptor.
/// Neue Images werden nur übernommen, wenn ihr Block denselben Cookie trägt.
#[used]
#[unsafe(link_section = ".rodata_desc.custom")]
static SIGNATURE_BLOCK: SignatureBlock = SignatureBlock::new(FIRMWARE_SIGNATURE);

/// Main Entry Point
///
/// Initialisiert Hardware, WiFi, Flash und Update Coordinator und spawnt
/// die Tasks. Danach schläft main() - alle Arbeit läuft in Tasks.
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Heap: reclaimed RAM (64 KB) + extra (36 KB)
    esp_alloc::heap_allocator!(
        #[esp_hal::ram(reclaimed)]
        size: WIFI_HEAP_SIZE
    );
    esp_alloc::heap_allocator!(size: EXTRA_HEAP_SIZE);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_interrupt =
        esp_hal::interrupt::software::SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_interrupt.software_interrupt0);

    info!("Boot: firmware {}", FW_VERSION);

    // ------------------------------------------------------------------
    // Flash + Update Coordinator
    // ------------------------------------------------------------------
    static FLASH: StaticCell<SharedFlash> = StaticCell::new();
    let flash = &*FLASH.init(BlockingMutex::new(RefCell::new(FlashStorage::new(
        peripherals.FLASH,
    ))));

    let store = FlashConfigStore::load(flash);
    let slot = match OtaSlot::new(flash) {
        Ok(slot) => slot,
        Err(e) => {
            // Ohne zweite App-Partition gibt es nichts zu aktualisieren
            error!("Boot: no OTA partition ({}), updates unavailable", e);
            loop {
                Timer::after(Duration::from_secs(3600)).await;
            }
        }
    };

    static COORDINATOR: StaticCell<Coordinator> = StaticCell::new();
    let coordinator = &*COORDINATOR.init(Coordinator::new(store, slot));
    coordinator.restore();

    // PubSubChannel für Update-Events (LED + WebSocket-Clients)
    static EVENTS: StaticCell<UpdateEventChannel> = StaticCell::new();
    let events = &*EVENTS.init(UpdateEventChannel::new());

    // ------------------------------------------------------------------
    // WiFi + Netzwerk-Stack
    // ------------------------------------------------------------------
    static RADIO_INIT: StaticCell<esp_radio::Controller> = StaticCell::new();
    let radio_init =
        RADIO_INIT.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));

    let (wifi_controller, wifi_interface) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi");

    let rng = Rng::new();
    let net_seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let tls_seed = (rng.random() as u64) << 32 | rng.random() as u64;

    // Sockets: HTTP-Server (Pool), mDNS, HTTPS-Client, espota UDP + TCP, DNS
    static RESOURCES: StaticCell<StackResources<12>> = StaticCell::new();
    let resources = RESOURCES.init(StackResources::new());

    let (stack, runner) = embassy_net::new(
        wifi_interface.sta,
        NetConfig::dhcpv4(Default::default()),
        resources,
        net_seed,
    );

    static STACK: StaticCell<Stack<'static>> = StaticCell::new();
    let stack = &*STACK.init(stack);

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------
    let feedback_events = events
        .subscriber()
        .expect("Subscriber slot for status LED");
    spawner
        .spawn(update_feedback_task(
            peripherals.GPIO8,
            peripherals.RMT,
            feedback_events,
        ))
        .unwrap();

    spawner.spawn(connection_task(wifi_controller)).unwrap();
    spawner.spawn(net_task(runner)).unwrap();
    spawner.spawn(dhcp_task(stack)).unwrap();

    spawner
        .spawn(poll_scheduler_task(stack, coordinator, events, tls_seed))
        .unwrap();
    spawner
        .spawn(push_session_task(stack, coordinator, events))
        .unwrap();

    for task_id in 0..HTTP_TASK_POOL_SIZE {
        spawner
            .spawn(http_server_task(task_id, stack, coordinator, events))
            .unwrap();
    }

    spawner.spawn(mdns_responder_task(stack)).unwrap();

    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
