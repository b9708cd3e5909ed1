//! Push Session Handler
//!
//! `Idle -> AwaitingSession -> Receiving -> Verifying -> Applying -> Idle`,
//! `Failed -> Idle` aus jedem Zustand.
//!
//! Das lokale Protokoll ist espota: der Sender schickt per UDP eine
//! Einladung `"<cmd> <port> <size> <md5>\n"`, das Gerät antwortet und
//! holt das Image über TCP vom Sender ab.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Timer, with_timeout};

use crate::coordinator::UpdateCoordinator;
use crate::error::UpdateError;
use crate::session::SessionSink;
use crate::traits::{ConfigStore, FirmwarePartition, PushListener, UpdateEventSink};
use crate::types::{ApplyOutcome, FirmwareIdentity, PushInvitation, UpdatePath, WorkerState};

/// Standard-Port des Push-Protokolls
pub const PUSH_PORT: u16 = 3232;

/// Kommando "Firmware flashen"
pub const COMMAND_FLASH: u16 = 0;

/// Kommando "Dateisystem flashen" (nicht unterstützt)
pub const COMMAND_FILESYSTEM: u16 = 100;

/// Abfrage-Intervall des Listeners
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct PushSettings<'a> {
    pub identity: FirmwareIdentity<'a>,
    pub poll_interval: Duration,
    /// Wartezeit nach einem fehlgeschlagenen `open()`
    pub retry_delay: Duration,
}

/// Inhalt einer Einladung, ohne Absender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvitationRequest {
    pub command: u16,
    pub data_port: u16,
    pub size: u32,
    pub digest: [u8; 16],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InvitationError {
    /// Text entspricht nicht `"<cmd> <port> <size> <md5>"`
    Malformed,
    /// Kommando ist kein Firmware-Update
    UnsupportedCommand(u16),
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn parse_digest(hex: &str) -> Option<[u8; 16]> {
    let bytes = hex.as_bytes();
    if bytes.len() != 32 {
        return None;
    }
    let mut digest = [0u8; 16];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        digest[i] = (hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?;
    }
    Some(digest)
}

/// Parst eine espota-Einladung
///
/// # Beispiele
///
/// ```
/// # use panel_core::push::parse_invitation;
/// let request = parse_invitation(b"0 48213 1048576 0123456789abcdef0123456789abcdef\n").unwrap();
/// assert_eq!(request.data_port, 48213);
/// assert_eq!(request.size, 1048576);
/// ```
pub fn parse_invitation(datagram: &[u8]) -> Result<InvitationRequest, InvitationError> {
    let text = core::str::from_utf8(datagram).map_err(|_| InvitationError::Malformed)?;
    let mut fields = text.split_ascii_whitespace();

    let mut next = || fields.next().ok_or(InvitationError::Malformed);
    let command: u16 = next()?.parse().map_err(|_| InvitationError::Malformed)?;
    let data_port: u16 = next()?.parse().map_err(|_| InvitationError::Malformed)?;
    let size: u32 = next()?.parse().map_err(|_| InvitationError::Malformed)?;
    let digest = parse_digest(next()?).ok_or(InvitationError::Malformed)?;

    if data_port == 0 {
        return Err(InvitationError::Malformed);
    }
    if command != COMMAND_FLASH {
        return Err(InvitationError::UnsupportedCommand(command));
    }

    Ok(InvitationRequest {
        command,
        data_port,
        size,
        digest,
    })
}

/// Bedient eine angenommene Einladung
///
/// Ist die Partition belegt, wird die Einladung abgelehnt und die
/// laufende Session nicht angefasst.
pub async fn push_session<M, C, P, L, E>(
    coordinator: &UpdateCoordinator<M, C, P>,
    settings: &PushSettings<'_>,
    listener: &mut L,
    invitation: &PushInvitation,
    events: &E,
) -> Result<ApplyOutcome, UpdateError>
where
    M: RawMutex,
    C: ConfigStore,
    P: FirmwarePartition,
    L: PushListener,
    E: UpdateEventSink + ?Sized,
{
    let control = coordinator.push();
    let mut session = match coordinator.partition().try_begin(UpdatePath::Push) {
        Ok(session) => session,
        Err(e) => {
            listener.reject(invitation).await;
            return Err(e);
        }
    };
    let require_signed = coordinator.config().require_signed_firmware;

    info!(
        "Push: session from {:?} ({} bytes)",
        invitation.peer.ip().octets(),
        invitation.size
    );
    control.set_state(WorkerState::Receiving);

    // Deaktivieren während der Übertragung bricht nicht ab
    let received = {
        let mut sink = SessionSink::new(&mut session, events, None);
        listener.receive(invitation, &mut sink).await
    };

    let result = match received {
        Ok(()) => session.complete(require_signed, settings.identity.signature, |stage| {
            control.set_state(stage.into())
        }),
        Err(e) => {
            warn!("Push: transfer failed: {:?}", e);
            Err(session.fail(e))
        }
    };
    control.set_state(session.stage().into());

    listener.conclude(&result).await;
    session.report(events, &result);
    result
}

/// Loop des Push-Pfads, läuft für immer
///
/// Solange der Pfad aktiv ist, wird der Listener alle
/// `poll_interval` abgefragt. Deaktivieren schliesst ihn sofort, solange
/// keine Session läuft.
pub async fn run_push_handler<M, C, P, L, E>(
    coordinator: &UpdateCoordinator<M, C, P>,
    settings: &PushSettings<'_>,
    listener: &mut L,
    events: &E,
) -> !
where
    M: RawMutex,
    C: ConfigStore,
    P: FirmwarePartition,
    L: PushListener,
    E: UpdateEventSink + ?Sized,
{
    let control = coordinator.push();

    loop {
        control.set_state(WorkerState::Stopped);
        control.wait_enabled().await;
        control.set_state(WorkerState::Idle);

        if let Err(e) = listener.open().await {
            error!("Push: listener could not be opened: {:?}", e);
            control.set_state(WorkerState::Failed);
            select(Timer::after(settings.retry_delay), control.wait_disabled()).await;
            continue;
        }
        info!("Push: listening");

        while control.is_enabled() {
            control.set_state(WorkerState::AwaitingSession);

            let polled = select(
                with_timeout(settings.poll_interval, listener.next_invitation()),
                control.wait_disabled(),
            )
            .await;

            let invitation = match polled {
                Either::Second(()) => break,
                Either::First(Err(_timeout)) => continue,
                Either::First(Ok(Err(e))) => {
                    warn!("Push: listener error: {:?}", e);
                    continue;
                }
                Either::First(Ok(Ok(invitation))) => invitation,
            };

            match push_session(coordinator, settings, listener, &invitation, events).await {
                Ok(_) => info!("Push: session finished"),
                Err(e) => {
                    warn!("Push: session failed: {}", e.as_str());
                    control.set_state(WorkerState::Failed);
                }
            }
            control.set_state(WorkerState::Idle);
        }

        listener.close();
        info!("Push: stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_invitation() {
        let request = parse_invitation(b"0 48213 1048576 0123456789abcdef0123456789ABCDEF\n").unwrap();
        assert_eq!(request.command, COMMAND_FLASH);
        assert_eq!(request.data_port, 48213);
        assert_eq!(request.size, 1_048_576);
        assert_eq!(request.digest[0], 0x01);
        assert_eq!(request.digest[15], 0xEF);
    }

    #[test]
    fn test_parse_invitation_rejects_filesystem() {
        assert_eq!(
            parse_invitation(b"100 48213 4096 0123456789abcdef0123456789abcdef\n"),
            Err(InvitationError::UnsupportedCommand(COMMAND_FILESYSTEM))
        );
    }

    #[test]
    fn test_parse_invitation_malformed() {
        assert_eq!(parse_invitation(b""), Err(InvitationError::Malformed));
        assert_eq!(parse_invitation(b"0 48213 4096\n"), Err(InvitationError::Malformed));
        assert_eq!(
            parse_invitation(b"0 48213 4096 xyz\n"),
            Err(InvitationError::Malformed)
        );
        assert_eq!(
            parse_invitation(b"0 0 4096 0123456789abcdef0123456789abcdef\n"),
            Err(InvitationError::Malformed)
        );
        assert_eq!(
            parse_invitation(b"0 70000 4096 0123456789abcdef0123456789abcdef\n"),
            Err(InvitationError::Malformed)
        );
    }

    #[test]
    fn test_parse_invitation_non_utf8() {
        assert_eq!(parse_invitation(&[0xFF, 0xFE]), Err(InvitationError::Malformed));
    }
}
