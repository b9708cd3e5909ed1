// Update Tasks - Pull (Release-Registry) und Push (espota)
//
// Beide Tasks laufen für immer. Ein/Aus schaltet der Coordinator,
// die Tasks warten dann in `Stopped`.

use defmt::info;
use embassy_net::Stack;
use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::{TcpClient, TcpClientState};
use panel_core::push::{PushSettings, run_push_handler};
use panel_core::scheduler::{PollSettings, run_poll_scheduler};
use static_cell::ConstStaticCell;

use crate::config::{
    HTTP_HEADER_BUFFER_SIZE, HTTPS_TCP_BUFFER_SIZE, METADATA_BUFFER_SIZE, POLL_INTERVAL,
    PUSH_POLL_INTERVAL, PUSH_RETRY_DELAY, RELEASE_SOURCE, TLS_READ_BUFFER_SIZE,
    TLS_WRITE_BUFFER_SIZE,
};
use crate::net::{EspOtaBuffers, EspOtaListener, HttpsTransport};
use crate::tasks::wifi::wait_for_network;
use crate::{Coordinator, FIRMWARE_IDENTITY, UpdateEventChannel};

// Grosse Buffer liegen statisch, nicht auf dem Task-Stack
static TLS_READ_BUFFER: ConstStaticCell<[u8; TLS_READ_BUFFER_SIZE]> =
    ConstStaticCell::new([0; TLS_READ_BUFFER_SIZE]);
static TLS_WRITE_BUFFER: ConstStaticCell<[u8; TLS_WRITE_BUFFER_SIZE]> =
    ConstStaticCell::new([0; TLS_WRITE_BUFFER_SIZE]);
static HEADER_BUFFER: ConstStaticCell<[u8; HTTP_HEADER_BUFFER_SIZE]> =
    ConstStaticCell::new([0; HTTP_HEADER_BUFFER_SIZE]);
static METADATA_BUFFER: ConstStaticCell<[u8; METADATA_BUFFER_SIZE]> =
    ConstStaticCell::new([0; METADATA_BUFFER_SIZE]);
static TCP_STATE: ConstStaticCell<
    TcpClientState<1, HTTPS_TCP_BUFFER_SIZE, HTTPS_TCP_BUFFER_SIZE>,
> = ConstStaticCell::new(TcpClientState::new());
static PUSH_BUFFERS: ConstStaticCell<EspOtaBuffers> = ConstStaticCell::new(EspOtaBuffers::new());

/// Poll Scheduler Task (Pull-Pfad)
///
/// # Parameter
/// - `stack`: embassy-net Stack
/// - `coordinator`: schaltet den Pfad ein/aus, besitzt die Partition
/// - `events`: Fortschritt/Ergebnis für LED und WebSocket-Clients
/// - `tls_seed`: Zufallswert aus dem Hardware-RNG für embedded-tls
#[embassy_executor::task]
pub async fn poll_scheduler_task(
    stack: &'static Stack<'static>,
    coordinator: &'static Coordinator,
    events: &'static UpdateEventChannel,
    tls_seed: u64,
) -> ! {
    wait_for_network(stack).await;
    info!("Poll: network ready");

    let tcp = TcpClient::new(*stack, TCP_STATE.take());
    let dns = DnsSocket::new(*stack);
    let mut transport = HttpsTransport::new(
        &tcp,
        &dns,
        TLS_READ_BUFFER.take(),
        TLS_WRITE_BUFFER.take(),
        HEADER_BUFFER.take(),
        tls_seed,
    );

    let settings = PollSettings {
        source: RELEASE_SOURCE,
        identity: FIRMWARE_IDENTITY,
        interval: POLL_INTERVAL,
    };

    run_poll_scheduler(
        coordinator,
        &settings,
        &mut transport,
        events,
        METADATA_BUFFER.take(),
    )
    .await
}

/// Push Session Task (espota-Listener)
#[embassy_executor::task]
pub async fn push_session_task(
    stack: &'static Stack<'static>,
    coordinator: &'static Coordinator,
    events: &'static UpdateEventChannel,
) -> ! {
    wait_for_network(stack).await;
    info!("Push: network ready");

    let mut listener = EspOtaListener::new(*stack, PUSH_BUFFERS.take());
    let settings = PushSettings {
        identity: FIRMWARE_IDENTITY,
        poll_interval: PUSH_POLL_INTERVAL,
        retry_delay: PUSH_RETRY_DELAY,
    };

    run_push_handler(coordinator, &settings, &mut listener, events).await
}
