//! Mocks für die Host-Tests
//!
//! Jeder Mock teilt sein Protokoll über `Rc<RefCell<..>>` mit dem Test,
//! weil Partition und Store in den Coordinator verschoben werden.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use panel_core::signature::SIGNATURE_OFFSET;
use panel_core::types::{ProbeResponse, Url};
use panel_core::{
    ApplyOutcome, ConfigStore, FirmwarePartition, FirmwareTransport, FlashError, ImageSink,
    LedError, PartitionSignature, PushInvitation, PushListener, SmartLedWriter, StoreError,
    TransportError, UpdateConfig, UpdateCoordinator, UpdateError, UpdateEvent, UpdateEventSink,
};
use rgb::RGB8;

pub const COOKIE: &str = "status_FW";
pub const EXPECTED_SIGNATURE: PartitionSignature = PartitionSignature::new(COOKIE);

pub type TestCoordinator = UpdateCoordinator<NoopRawMutex, MockConfigStore, MockPartition>;

/// Image mit `cookie` an der Signatur-Position, insgesamt `len` Bytes
pub fn signed_image(cookie: &str, len: usize) -> Vec<u8> {
    let mut image = vec![0xA5u8; len];
    let signature = PartitionSignature::new(cookie);
    let offset = SIGNATURE_OFFSET as usize;
    image[offset..offset + 32].copy_from_slice(signature.as_bytes());
    image
}

pub fn url(text: &str) -> Url {
    let mut url = Url::new();
    url.push_str(text).unwrap();
    url
}

/// Coordinator mit beiden Pfaden deaktiviert
pub fn coordinator(
    config: UpdateConfig,
) -> (TestCoordinator, Rc<RefCell<PartitionLog>>, Rc<RefCell<StoreLog>>) {
    let (partition, partition_log) = MockPartition::new(64 * 1024);
    let (store, store_log) = MockConfigStore::new(config);
    (
        UpdateCoordinator::new(store, partition),
        partition_log,
        store_log,
    )
}

// ============================================================================
// Partition
// ============================================================================

/// Art des Zugriffs für `PartitionLog::on_access`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionAccess {
    Read,
    MarkBootable,
}

#[derive(Default)]
pub struct PartitionLog {
    pub capacity: u32,
    pub image: Vec<u8>,
    pub begin_count: usize,
    pub write_count: usize,
    pub bytes_written: usize,
    pub abort_count: usize,
    pub bootable: bool,
    pub fail_next_write: bool,
    /// Wird vor `read` und `mark_bootable` aufgerufen
    pub on_access: Option<Box<dyn FnMut(PartitionAccess)>>,
}

pub struct MockPartition {
    log: Rc<RefCell<PartitionLog>>,
}

impl MockPartition {
    pub fn new(capacity: u32) -> (Self, Rc<RefCell<PartitionLog>>) {
        let log = Rc::new(RefCell::new(PartitionLog {
            capacity,
            ..Default::default()
        }));
        (Self { log: log.clone() }, log)
    }

    // Hook ohne aktiven Borrow aufrufen, er darf das Log selbst lesen
    fn notify(&self, access: PartitionAccess) {
        let hook = self.log.borrow_mut().on_access.take();
        if let Some(mut hook) = hook {
            hook(access);
            self.log.borrow_mut().on_access = Some(hook);
        }
    }
}

impl FirmwarePartition for MockPartition {
    fn capacity(&self) -> u32 {
        self.log.borrow().capacity
    }

    fn begin(&mut self, _size: u32) -> Result<(), FlashError> {
        let mut log = self.log.borrow_mut();
        log.begin_count += 1;
        log.image.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), FlashError> {
        let mut log = self.log.borrow_mut();
        if log.fail_next_write {
            log.fail_next_write = false;
            return Err(FlashError::WriteFailed);
        }
        log.write_count += 1;
        log.bytes_written += data.len();
        log.image.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.notify(PartitionAccess::Read);
        let log = self.log.borrow();
        let start = offset as usize;
        let end = start + buf.len();
        if end > log.image.len() {
            return Err(FlashError::ReadFailed);
        }
        buf.copy_from_slice(&log.image[start..end]);
        Ok(())
    }

    fn mark_bootable(&mut self) -> Result<(), FlashError> {
        self.notify(PartitionAccess::MarkBootable);
        self.log.borrow_mut().bootable = true;
        Ok(())
    }

    fn abort(&mut self) {
        let mut log = self.log.borrow_mut();
        log.abort_count += 1;
        log.image.clear();
    }
}

// ============================================================================
// Config Store
// ============================================================================

#[derive(Debug, Default)]
pub struct StoreLog {
    pub put_count: usize,
    pub saved: Option<UpdateConfig>,
    pub fail_puts: bool,
}

pub struct MockConfigStore {
    config: UpdateConfig,
    log: Rc<RefCell<StoreLog>>,
}

impl MockConfigStore {
    pub fn new(config: UpdateConfig) -> (Self, Rc<RefCell<StoreLog>>) {
        let log = Rc::new(RefCell::new(StoreLog::default()));
        (
            Self {
                config,
                log: log.clone(),
            },
            log,
        )
    }
}

impl ConfigStore for MockConfigStore {
    fn get(&self) -> UpdateConfig {
        self.config
    }

    fn put(&mut self, config: &UpdateConfig) -> Result<(), StoreError> {
        let mut log = self.log.borrow_mut();
        if log.fail_puts {
            return Err(StoreError::WriteFailed);
        }
        log.put_count += 1;
        log.saved = Some(*config);
        self.config = *config;
        Ok(())
    }
}

// ============================================================================
// Event Sink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    pub events: RefCell<Vec<UpdateEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<UpdateEvent> {
        self.events.take()
    }
}

impl UpdateEventSink for RecordingSink {
    fn emit(&self, event: UpdateEvent) {
        self.events.borrow_mut().push(event);
    }
}

// ============================================================================
// HTTP Transport
// ============================================================================

#[derive(Debug, Default)]
pub struct TransportLog {
    pub fetched: Vec<String>,
    pub probed: Vec<String>,
    pub downloaded: Vec<String>,
}

/// Skriptbarer Transport für den Pull-Pfad
pub struct MockTransport<'h> {
    /// Body für `fetch`, `None` ergibt HTTP 404
    pub releases: Option<Vec<u8>>,
    pub probe: Result<ProbeResponse, TransportError>,
    pub image: Vec<u8>,
    pub chunk_size: usize,
    /// Stream bricht nach so vielen Chunks ab
    pub fail_after_chunks: Option<usize>,
    /// Wird vor jedem Chunk aufgerufen
    pub on_chunk: Option<Box<dyn FnMut(usize) + 'h>>,
    pub log: Rc<RefCell<TransportLog>>,
}

impl<'h> MockTransport<'h> {
    /// Probe 302, Image wird in 256-Byte Chunks geliefert
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            releases: None,
            probe: Ok(ProbeResponse {
                status: 302,
                location: Some(url("https://objects.example.com/release-asset/esp32c6.bin")),
            }),
            image,
            chunk_size: 256,
            fail_after_chunks: None,
            on_chunk: None,
            log: Rc::new(RefCell::new(TransportLog::default())),
        }
    }

    pub fn with_releases(mut self, body: &str) -> Self {
        self.releases = Some(body.as_bytes().to_vec());
        self
    }
}

impl FirmwareTransport for MockTransport<'_> {
    async fn fetch(&mut self, url: &str, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.log.borrow_mut().fetched.push(url.to_string());
        let body = self.releases.as_ref().ok_or(TransportError::Status(404))?;
        if body.len() > buf.len() {
            return Err(TransportError::BufferTooSmall);
        }
        buf[..body.len()].copy_from_slice(body);
        Ok(body.len())
    }

    async fn probe(&mut self, url: &str) -> Result<ProbeResponse, TransportError> {
        self.log.borrow_mut().probed.push(url.to_string());
        self.probe.clone()
    }

    async fn download<S: ImageSink>(&mut self, url: &str, sink: &mut S) -> Result<(), UpdateError> {
        self.log.borrow_mut().downloaded.push(url.to_string());
        sink.begin(self.image.len() as u32)?;

        for (index, chunk) in self.image.chunks(self.chunk_size).enumerate() {
            if self.fail_after_chunks == Some(index) {
                return Err(TransportError::Closed.into());
            }
            if let Some(hook) = self.on_chunk.as_mut() {
                hook(index);
            }
            sink.write(chunk)?;
            yield_now().await;
        }
        Ok(())
    }
}

// ============================================================================
// Push Listener
// ============================================================================

#[derive(Debug, Default)]
pub struct ListenerLog {
    pub invitations: VecDeque<PushInvitation>,
    pub open_count: usize,
    pub close_count: usize,
    pub rejected: usize,
    pub received: usize,
    pub concluded: Vec<Result<ApplyOutcome, UpdateError>>,
    pub fail_open: bool,
    pub digest_ok: bool,
}

/// Skriptbarer Push-Listener: Einladungen kommen aus `ListenerLog::invitations`
pub struct MockListener<'h> {
    pub image: Vec<u8>,
    pub chunk_size: usize,
    pub on_chunk: Option<Box<dyn FnMut(usize) + 'h>>,
    pub log: Rc<RefCell<ListenerLog>>,
}

impl<'h> MockListener<'h> {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            chunk_size: 256,
            on_chunk: None,
            log: Rc::new(RefCell::new(ListenerLog {
                digest_ok: true,
                ..Default::default()
            })),
        }
    }

    pub fn invitation(&self) -> PushInvitation {
        PushInvitation {
            peer: SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 20), 53_000),
            data_port: 48_213,
            size: self.image.len() as u32,
            digest: [0; 16],
        }
    }
}

impl PushListener for MockListener<'_> {
    async fn open(&mut self) -> Result<(), TransportError> {
        let mut log = self.log.borrow_mut();
        log.open_count += 1;
        if log.fail_open {
            return Err(TransportError::Bind);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.log.borrow_mut().close_count += 1;
    }

    async fn next_invitation(&mut self) -> Result<PushInvitation, TransportError> {
        let next = self.log.borrow_mut().invitations.pop_front();
        match next {
            Some(invitation) => Ok(invitation),
            None => core::future::pending().await,
        }
    }

    async fn reject(&mut self, _invitation: &PushInvitation) {
        self.log.borrow_mut().rejected += 1;
    }

    async fn receive<S: ImageSink>(
        &mut self,
        invitation: &PushInvitation,
        sink: &mut S,
    ) -> Result<(), UpdateError> {
        self.log.borrow_mut().received += 1;
        sink.begin(invitation.size)?;

        for (index, chunk) in self.image.chunks(self.chunk_size).enumerate() {
            if let Some(hook) = self.on_chunk.as_mut() {
                hook(index);
            }
            sink.write(chunk)?;
            yield_now().await;
        }

        if !self.log.borrow().digest_ok {
            return Err(TransportError::DigestMismatch.into());
        }
        Ok(())
    }

    async fn conclude(&mut self, result: &Result<ApplyOutcome, UpdateError>) {
        self.log.borrow_mut().concluded.push(*result);
    }
}

// ============================================================================
// LED
// ============================================================================

#[derive(Default)]
pub struct MockLedWriter {
    pub last_color: Option<RGB8>,
    pub write_count: usize,
    pub fail_next_write: bool,
}

impl MockLedWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SmartLedWriter for MockLedWriter {
    fn write(&mut self, color: RGB8) -> Result<(), LedError> {
        if self.fail_next_write {
            self.fail_next_write = false;
            return Err(LedError::WriteFailed);
        }
        self.last_color = Some(color);
        self.write_count += 1;
        Ok(())
    }
}
