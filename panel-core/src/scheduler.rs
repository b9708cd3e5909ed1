//! Poll Scheduler (Pull-Pfad)
//!
//! `Stopped -> Running (Resolve -> Apply -> Sleep) -> Stopped`

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Timer};

use crate::applier::{ApplyOptions, apply};
use crate::coordinator::UpdateCoordinator;
use crate::error::UpdateError;
use crate::resolver::{ReleaseSource, resolve};
use crate::traits::{ConfigStore, FirmwarePartition, FirmwareTransport, UpdateEventSink};
use crate::types::{ApplyOutcome, FirmwareIdentity, UpdatePath, WorkerState};

/// Standard-Intervall zwischen zwei Poll-Zyklen
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct PollSettings<'a> {
    pub source: ReleaseSource<'a>,
    pub identity: FirmwareIdentity<'a>,
    pub interval: Duration,
}

/// Ein einzelner Poll-Zyklus
///
/// Liest die Konfiguration bei jedem Aufruf neu, damit Kanal-Wechsel im
/// nächsten Zyklus greifen.
pub async fn poll_cycle<M, C, P, T, E>(
    coordinator: &UpdateCoordinator<M, C, P>,
    settings: &PollSettings<'_>,
    transport: &mut T,
    events: &E,
    buf: &mut [u8],
) -> Result<ApplyOutcome, UpdateError>
where
    M: RawMutex,
    C: ConfigStore,
    P: FirmwarePartition,
    T: FirmwareTransport,
    E: UpdateEventSink + ?Sized,
{
    let config = coordinator.config();
    let artifact = resolve(
        &settings.source,
        config.channel,
        settings.identity.version,
        transport,
        buf,
    )
    .await?;
    info!("Poll: candidate {}", artifact.url());

    let options = ApplyOptions {
        path: UpdatePath::Pull,
        require_signed: config.require_signed_firmware,
        identity: settings.identity,
    };
    apply(
        &artifact,
        &options,
        transport,
        coordinator.partition(),
        coordinator.pull(),
        events,
    )
    .await
}

/// Loop des Pull-Pfads, läuft für immer
///
/// Wartet im Zustand `Stopped` bis der Pfad aktiviert wird. Deaktivieren
/// weckt den Sleep sofort. Ein laufender Zyklus beendet zuerst seinen
/// aktuellen I/O-Schritt.
pub async fn run_poll_scheduler<M, C, P, T, E>(
    coordinator: &UpdateCoordinator<M, C, P>,
    settings: &PollSettings<'_>,
    transport: &mut T,
    events: &E,
    buf: &mut [u8],
) -> !
where
    M: RawMutex,
    C: ConfigStore,
    P: FirmwarePartition,
    T: FirmwareTransport,
    E: UpdateEventSink + ?Sized,
{
    let control = coordinator.pull();

    loop {
        control.set_state(WorkerState::Stopped);
        control.wait_enabled().await;
        control.set_state(WorkerState::Running);
        info!("Poll: started, interval {}s", settings.interval.as_secs());

        while control.is_enabled() {
            match poll_cycle(coordinator, settings, transport, events, buf).await {
                Ok(ApplyOutcome::Applied) => info!("Poll: update applied"),
                Ok(ApplyOutcome::NoUpdateNeeded) | Err(UpdateError::NotFound) => {
                    debug!("Poll: up to date")
                }
                Err(e) => warn!("Poll: cycle failed: {}", e.as_str()),
            }

            if let Either::Second(()) =
                select(Timer::after(settings.interval), control.wait_disabled()).await
            {
                break;
            }
        }

        info!("Poll: stopped");
    }
}
