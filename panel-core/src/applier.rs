//! Downloader / Applier
//!
//! Streamt ein aufgelöstes Artefakt in die inaktive Partition.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::control::PathControl;
use crate::error::UpdateError;
use crate::logic::embeds_version;
use crate::session::{PartitionLock, SessionSink};
use crate::traits::{FirmwarePartition, FirmwareTransport, UpdateEventSink};
use crate::types::{ApplyOutcome, FirmwareIdentity, ProbeResponse, ResolvedArtifact, UpdatePath};

/// Parameter eines `apply()`-Aufrufs
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions<'a> {
    pub path: UpdatePath,
    pub require_signed: bool,
    pub identity: FirmwareIdentity<'a>,
}

/// Entscheidet anhand der HEAD-Probe, ob ein Download nötig ist
///
/// Kein Download bei Status ausserhalb 200..=399 oder wenn die URL bzw.
/// das Redirect-Ziel die laufende Version enthält.
pub fn probe_allows_download(url: &str, probe: &ProbeResponse, version: &str) -> bool {
    if !(200..=399).contains(&probe.status) {
        info!("Update: probe status {}, skipping", probe.status);
        return false;
    }
    if embeds_version(url, version) {
        info!("Update: {} is the running version", url);
        return false;
    }
    if let Some(location) = &probe.location {
        if embeds_version(location, version) {
            info!("Update: redirect target {} is the running version", location.as_str());
            return false;
        }
    }
    true
}

/// Lädt `artifact` herunter, prüft und aktiviert es
///
/// # Ablauf
/// 1. Session öffnen (`Busy` wenn der andere Pfad schreibt)
/// 2. HEAD-Probe, bei gleicher Version `NoUpdateNeeded`
/// 3. Download in die Partition mit Progress-Events
/// 4. Signaturprüfung und `mark_bootable()`
///
/// Der Neustart in das neue Image ist Sache des Aufrufers.
///
/// # Fehlerbehandlung
/// Jeder Fehler nach Schritt 1 verwirft das begonnene Image.
pub async fn apply<M, P, T, E>(
    artifact: &ResolvedArtifact,
    options: &ApplyOptions<'_>,
    transport: &mut T,
    lock: &PartitionLock<M, P>,
    control: &PathControl<M>,
    events: &E,
) -> Result<ApplyOutcome, UpdateError>
where
    M: RawMutex,
    P: FirmwarePartition,
    T: FirmwareTransport,
    E: UpdateEventSink + ?Sized,
{
    let mut session = lock.try_begin(options.path)?;
    let url = artifact.url();

    let probe = match transport.probe(url).await {
        Ok(probe) => probe,
        Err(e) => {
            warn!("Update: probe failed: {:?}", e);
            return Err(session.fail(e.into()));
        }
    };
    if !probe_allows_download(url, &probe, options.identity.version) {
        return Ok(session.skip());
    }

    // Nur der Pull-Pfad bricht bei Deaktivierung ab
    let cancel = (options.path == UpdatePath::Pull).then_some(control);
    let streamed = {
        let mut sink = SessionSink::new(&mut session, events, cancel);
        transport.download(url, &mut sink).await
    };

    let result = match streamed {
        Ok(()) => session.complete(options.require_signed, options.identity.signature, |_| {}),
        Err(e) => {
            warn!("Update: download failed: {:?}", e);
            Err(session.fail(e))
        }
    };
    session.report(events, &result);
    result
}
