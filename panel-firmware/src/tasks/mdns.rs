// mDNS Responder Task - Hostname und Push-Service im lokalen Netz
//
// - A-Record: <MDNS_HOSTNAME>.local -> IPv4 vom DHCP
// - Service:  <MDNS_SERVICE_NAME>._arduino._tcp.local auf PUSH_PORT,
//             damit Upload-Tools das Panel ohne IP finden
//
// edge-mdns 0.6 über edge-nal-embassy (UDP Multicast 224.0.0.251:5353).

use defmt::{Debug2Format, error, info, warn};
use embassy_net::Stack;
use embassy_time::{Duration, Timer};

use core::net::{Ipv4Addr, SocketAddr};
use core::sync::atomic::{AtomicU32, Ordering};

use edge_mdns::host::{Service, ServiceAnswers};
use edge_mdns::{HostAnswersMdnsHandler, buf::VecBufAccess, domain::base::Ttl, host::Host, io};
use edge_nal::{MulticastV4, UdpBind, UdpSplit};
use edge_nal_embassy::{Udp, UdpBuffers};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use static_cell::StaticCell;

use crate::config::{
    MDNS_HOSTNAME, MDNS_MULTICAST_ADDR, MDNS_PACKET_BUFFER_SIZE, MDNS_PORT,
    MDNS_RECONNECT_DELAY_SECS, MDNS_SERVICE_NAME, MDNS_TTL_SECS, MDNS_UDP_BUFFER_SIZE, PUSH_PORT,
};
use crate::tasks::wifi::wait_for_network;

/// TXT-Einträge, die espota-kompatible Upload-Tools erwarten
const PUSH_SERVICE_TXT: &[(&str, &str)] = &[
    ("board", "esp32c6"),
    ("tcp_check", "no"),
    ("ssh_upload", "no"),
    ("auth_upload", "no"),
];

/// Counter als RNG für Transaction IDs (Eindeutigkeit genügt)
static RNG_COUNTER: AtomicU32 = AtomicU32::new(0);

fn mdns_rng(buf: &mut [u8]) {
    let mut counter = RNG_COUNTER.fetch_add(1, Ordering::Relaxed);
    for chunk in buf.chunks_mut(4) {
        let bytes = counter.to_le_bytes();
        let len = chunk.len().min(4);
        chunk[..len].copy_from_slice(&bytes[..len]);
        counter = counter.wrapping_add(1);
    }
}

/// mDNS Responder Task
///
/// Startet nach dem ersten DHCP-Lease und baut den Responder nach jedem
/// Fehler neu auf (z.B. neue IP nach WiFi-Reconnect).
#[embassy_executor::task]
pub async fn mdns_responder_task(stack: &'static Stack<'static>) {
    info!("mDNS: Task started, waiting for network...");

    // UDP-Buffer überleben die Reconnects
    static UDP_BUFFERS: StaticCell<UdpBuffers<1, MDNS_UDP_BUFFER_SIZE, MDNS_UDP_BUFFER_SIZE>> =
        StaticCell::new();
    let udp_buffers = &*UDP_BUFFERS.init_with(UdpBuffers::new);

    loop {
        wait_for_network(stack).await;

        match run_mdns_responder(stack, udp_buffers).await {
            Ok(_) => warn!("mDNS: Responder stopped normally"),
            Err(e) => error!("mDNS: Error: {}", e),
        }
        info!("mDNS: Reconnecting in {}s...", MDNS_RECONNECT_DELAY_SECS);
        Timer::after(Duration::from_secs(MDNS_RECONNECT_DELAY_SECS)).await;
    }
}

async fn run_mdns_responder(
    stack: &'static Stack<'static>,
    udp_buffers: &UdpBuffers<1, MDNS_UDP_BUFFER_SIZE, MDNS_UDP_BUFFER_SIZE>,
) -> Result<(), MdnsError> {
    let our_ip = stack
        .config_v4()
        .ok_or(MdnsError::NoAddress)?
        .address
        .address();
    info!("mDNS: Using IP {}", Debug2Format(&our_ip));

    let udp_stack = Udp::new(*stack, udp_buffers);

    let mut socket = udp_stack
        .bind(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), MDNS_PORT))
        .await
        .map_err(|_| MdnsError::SocketBindFailed)?;

    socket
        .join_v4(Ipv4Addr::from(MDNS_MULTICAST_ADDR), Ipv4Addr::UNSPECIFIED)
        .await
        .map_err(|_| MdnsError::MulticastJoinFailed)?;

    let (recv, send) = socket.split();

    let host = Host {
        hostname: MDNS_HOSTNAME,
        ipv4: our_ip.into(),
        ipv6: [0u8; 16].into(), // kein proto-ipv6 in smoltcp
        ttl: Ttl::from_secs(MDNS_TTL_SECS),
    };

    let service = Service {
        name: MDNS_SERVICE_NAME,
        priority: 0,
        weight: 0,
        service: "_arduino",
        protocol: "_tcp",
        port: PUSH_PORT,
        service_subtypes: &[],
        txt_kvs: PUSH_SERVICE_TXT,
    };

    let recv_buf = VecBufAccess::<NoopRawMutex, MDNS_PACKET_BUFFER_SIZE>::new();
    let send_buf = VecBufAccess::<NoopRawMutex, MDNS_PACKET_BUFFER_SIZE>::new();

    // Broadcast-Signal wird von der API verlangt, aber nicht benutzt
    let signal = Signal::<NoopRawMutex, ()>::new();

    let mdns = io::Mdns::new(
        Some(our_ip),
        None,
        recv,
        send,
        recv_buf,
        send_buf,
        mdns_rng,
        &signal,
    );

    info!(
        "mDNS: advertising '{}.local' and '{}._arduino._tcp' on port {}",
        MDNS_HOSTNAME, MDNS_SERVICE_NAME, PUSH_PORT
    );

    mdns.run(HostAnswersMdnsHandler::new(ServiceAnswers::new(
        &host, &service,
    )))
    .await
    .map_err(|_| MdnsError::ResponderFailed)?;

    Ok(())
}

#[derive(Debug, defmt::Format)]
enum MdnsError {
    /// Kein DHCP-Lease (mehr)
    NoAddress,
    SocketBindFailed,
    MulticastJoinFailed,
    ResponderFailed,
}
