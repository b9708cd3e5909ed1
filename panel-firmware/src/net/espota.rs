// espota Listener (Push-Pfad)
//
// Ablauf einer Session:
// 1. Sender schickt per UDP "<cmd> <port> <size> <md5>\n" an Port 3232
// 2. Gerät antwortet "OK" und verbindet sich per TCP mit <sender>:<port>
// 3. Nach jedem Chunk schickt das Gerät die Byte-Anzahl als ASCII zurück
// 4. Am Ende "OK" (oder "ERR"), danach wird die Verbindung geschlossen

use core::fmt::Write as _;
use core::net::SocketAddrV4;

use defmt::{debug, info, warn};
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack};
use embassy_time::{Duration, with_timeout};
use embedded_io_async::Write as _;
use md5::{Digest, Md5};
use panel_core::push::parse_invitation;
use panel_core::{
    ApplyOutcome, ImageSink, PushInvitation, PushListener, TransportError, UpdateError,
};

use crate::config::{
    PUSH_CONNECT_TIMEOUT, PUSH_PORT, PUSH_READ_TIMEOUT, PUSH_TCP_BUFFER_SIZE,
    PUSH_UDP_BUFFER_SIZE,
};

/// Anzahl UDP-Pakete, die gleichzeitig gepuffert werden
const UDP_PACKET_SLOTS: usize = 4;

/// Max. Länge der Chunk-Quittung ("4294967295")
const ACK_LEN: usize = 10;

/// Deadline für das Zurücksetzen der Datenverbindung
const RESET_TIMEOUT: Duration = Duration::from_millis(200);

const REPLY_OK: &[u8] = b"OK";
const REPLY_ERR: &[u8] = b"ERR";

/// Socket-Buffer des Listeners (liegen in einer `ConstStaticCell`)
pub struct EspOtaBuffers {
    udp_rx_meta: [PacketMetadata; UDP_PACKET_SLOTS],
    udp_tx_meta: [PacketMetadata; UDP_PACKET_SLOTS],
    udp_rx: [u8; PUSH_UDP_BUFFER_SIZE],
    udp_tx: [u8; PUSH_UDP_BUFFER_SIZE],
    tcp_rx: [u8; PUSH_TCP_BUFFER_SIZE],
    tcp_tx: [u8; PUSH_TCP_BUFFER_SIZE],
}

impl EspOtaBuffers {
    pub const fn new() -> Self {
        Self {
            udp_rx_meta: [PacketMetadata::EMPTY; UDP_PACKET_SLOTS],
            udp_tx_meta: [PacketMetadata::EMPTY; UDP_PACKET_SLOTS],
            udp_rx: [0; PUSH_UDP_BUFFER_SIZE],
            udp_tx: [0; PUSH_UDP_BUFFER_SIZE],
            tcp_rx: [0; PUSH_TCP_BUFFER_SIZE],
            tcp_tx: [0; PUSH_TCP_BUFFER_SIZE],
        }
    }
}

impl Default for EspOtaBuffers {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EspOtaListener<'a> {
    udp: UdpSocket<'a>,
    tcp: TcpSocket<'a>,
    bound: bool,
    connected: bool,
    datagram: [u8; PUSH_UDP_BUFFER_SIZE],
    chunk: [u8; PUSH_TCP_BUFFER_SIZE],
}

fn endpoint(addr: SocketAddrV4) -> IpEndpoint {
    IpEndpoint::new(IpAddress::Ipv4(*addr.ip()), addr.port())
}

impl<'a> EspOtaListener<'a> {
    pub fn new(stack: Stack<'a>, buffers: &'a mut EspOtaBuffers) -> Self {
        let EspOtaBuffers {
            udp_rx_meta,
            udp_tx_meta,
            udp_rx,
            udp_tx,
            tcp_rx,
            tcp_tx,
        } = buffers;
        Self {
            udp: UdpSocket::new(stack, udp_rx_meta, udp_rx, udp_tx_meta, udp_tx),
            tcp: TcpSocket::new(stack, tcp_rx, tcp_tx),
            bound: false,
            connected: false,
            datagram: [0; PUSH_UDP_BUFFER_SIZE],
            chunk: [0; PUSH_TCP_BUFFER_SIZE],
        }
    }

    /// Bringt den TCP Socket zurück in den Zustand `Closed`
    async fn reset_data_connection(&mut self) {
        self.tcp.abort();
        let _ = with_timeout(RESET_TIMEOUT, self.tcp.flush()).await;
        self.connected = false;
    }

    async fn reply(&mut self, to: IpEndpoint, text: &[u8]) {
        if self.udp.send_to(text, to).await.is_err() {
            warn!("Push: UDP reply failed");
        }
    }
}

impl PushListener for EspOtaListener<'_> {
    async fn open(&mut self) -> Result<(), TransportError> {
        if self.bound {
            return Ok(());
        }
        self.udp.bind(PUSH_PORT).map_err(|_| TransportError::Bind)?;
        self.bound = true;
        info!("Push: bound UDP port {}", PUSH_PORT);
        Ok(())
    }

    fn close(&mut self) {
        self.tcp.abort();
        self.connected = false;
        if self.bound {
            self.udp.close();
            self.bound = false;
        }
    }

    async fn next_invitation(&mut self) -> Result<PushInvitation, TransportError> {
        loop {
            let (len, meta) = self
                .udp
                .recv_from(&mut self.datagram)
                .await
                .map_err(|_| TransportError::Closed)?;

            #[allow(unreachable_patterns)]
            let peer = match meta.endpoint.addr {
                IpAddress::Ipv4(ip) => SocketAddrV4::new(ip, meta.endpoint.port),
                _ => continue,
            };

            match parse_invitation(&self.datagram[..len]) {
                Ok(request) => {
                    return Ok(PushInvitation {
                        peer,
                        data_port: request.data_port,
                        size: request.size,
                        digest: request.digest,
                    });
                }
                Err(e) => {
                    warn!("Push: invalid invitation: {}", e);
                    self.reply(meta.endpoint, REPLY_ERR).await;
                }
            }
        }
    }

    async fn reject(&mut self, invitation: &PushInvitation) {
        self.reply(endpoint(invitation.peer), REPLY_ERR).await;
    }

    async fn receive<S: ImageSink>(
        &mut self,
        invitation: &PushInvitation,
        sink: &mut S,
    ) -> Result<(), UpdateError> {
        self.udp
            .send_to(REPLY_OK, endpoint(invitation.peer))
            .await
            .map_err(|_| TransportError::Closed)?;

        self.reset_data_connection().await;
        self.tcp.set_timeout(Some(PUSH_READ_TIMEOUT));
        let data = SocketAddrV4::new(*invitation.peer.ip(), invitation.data_port);
        with_timeout(PUSH_CONNECT_TIMEOUT, self.tcp.connect(endpoint(data)))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|_| TransportError::Connect)?;
        self.connected = true;
        debug!("Push: data connection established");

        sink.begin(invitation.size)?;

        let mut hasher = Md5::new();
        let mut received: u32 = 0;
        while received < invitation.size {
            let n = with_timeout(PUSH_READ_TIMEOUT, self.tcp.read(&mut self.chunk))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|_| TransportError::Closed)?;
            if n == 0 {
                return Err(TransportError::Closed.into());
            }

            let data = &self.chunk[..n];
            hasher.update(data);
            sink.write(data)?;
            received += n as u32;

            let mut ack = heapless::String::<ACK_LEN>::new();
            let _ = write!(ack, "{}", n);
            self.tcp
                .write_all(ack.as_bytes())
                .await
                .map_err(|_| TransportError::Closed)?;
        }

        let digest: [u8; 16] = hasher.finalize().into();
        if digest != invitation.digest {
            warn!("Push: MD5 mismatch");
            return Err(TransportError::DigestMismatch.into());
        }
        Ok(())
    }

    async fn conclude(&mut self, result: &Result<ApplyOutcome, UpdateError>) {
        if !self.connected {
            return;
        }
        let reply = if result.is_ok() { REPLY_OK } else { REPLY_ERR };

        let sent = with_timeout(PUSH_READ_TIMEOUT, async {
            self.tcp.write_all(reply).await?;
            self.tcp.flush().await
        })
        .await;
        if !matches!(sent, Ok(Ok(()))) {
            warn!("Push: final reply not delivered");
        }

        self.tcp.close();
        self.reset_data_connection().await;
    }
}
