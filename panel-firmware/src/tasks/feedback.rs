// Status-LED Task - zeigt Update-Fortschritt an und startet nach einem
// übernommenen Image neu
use defmt::{error, info};
use embassy_time::{Duration, Timer};
use esp_hal_smartled::smart_led_buffer;
use panel_core::logic::dim;
use panel_core::{SmartLedWriter, UpdateEvent, feedback_color};
use rgb::RGB8;

use crate::UpdateEventSubscriber;
use crate::config::{RESTART_FADE_STEP, RESTART_FADE_STEPS, RMT_CLOCK_MHZ};
use crate::hal::RmtLedWriter;

/// Wie lange Rot nach einem Fehler stehen bleibt
const FAILURE_HOLD: Duration = Duration::from_secs(3);

/// Platzhalter, wenn das RMT Peripheral nicht verfügbar ist
struct NoLed;

impl SmartLedWriter for NoLed {
    fn write(&mut self, _color: RGB8) -> Result<(), panel_core::LedError> {
        Ok(())
    }
}

fn show<L: SmartLedWriter>(led: &mut L, color: RGB8) {
    if led.write(color).is_err() {
        error!("Feedback: failed to write to LED");
    }
}

/// Status-LED Logic - hardwareunabhängig über `SmartLedWriter`
///
/// Setzt für jedes Update-Event die passende Farbe. Nach `Applied` wird
/// die LED ausgeblendet und `restart` aufgerufen, damit der Bootloader
/// das neue Image startet.
pub async fn update_feedback_logic<L: SmartLedWriter>(
    mut led: L,
    mut events: UpdateEventSubscriber,
    restart: fn() -> !,
) -> ! {
    show(&mut led, RGB8::default());

    loop {
        let event = events.next_message_pure().await;
        let color = feedback_color(&event);
        show(&mut led, color);

        match event {
            UpdateEvent::Applied { path } => {
                info!("Feedback: {} update applied, restarting", path.as_str());
                for step in 1..=RESTART_FADE_STEPS {
                    Timer::after(RESTART_FADE_STEP).await;
                    show(&mut led, dim(color, step, RESTART_FADE_STEPS));
                }
                restart();
            }
            UpdateEvent::Failed { path, error } => {
                info!("Feedback: {} update failed ({})", path.as_str(), error.as_str());
                Timer::after(FAILURE_HOLD).await;
                show(&mut led, RGB8::default());
            }
            UpdateEvent::Started { .. } | UpdateEvent::Progress { .. } => {}
        }
    }
}

/// Status-LED Task - initialisiert RMT und startet die Logic
#[embassy_executor::task]
pub async fn update_feedback_task(
    gpio8: esp_hal::peripherals::GPIO8<'static>,
    rmt_peripheral: esp_hal::peripherals::RMT<'static>,
    events: UpdateEventSubscriber,
) {
    let mut rmt_buffer = smart_led_buffer!(1);

    match RmtLedWriter::new(gpio8, rmt_peripheral, RMT_CLOCK_MHZ, &mut rmt_buffer) {
        Ok(led) => update_feedback_logic(led, events, esp_hal::system::software_reset).await,
        Err(e) => {
            // Neustart nach einem Update muss auch ohne LED passieren
            error!("Feedback: LED init failed: {}", e);
            update_feedback_logic(NoLed, events, esp_hal::system::software_reset).await
        }
    }
}
