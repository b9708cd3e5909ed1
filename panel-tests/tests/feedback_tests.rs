//! Integration Tests für die Status-LED
//!
//! Diese Tests laufen auf dem Host (x86_64) und nutzen MockLedWriter

mod mocks;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::pubsub::PubSubChannel;
use mocks::MockLedWriter;
use panel_core::logic::{ProgressThrottle, dim};
use panel_core::{
    LedError, SmartLedWriter, UpdateError, UpdateEvent, UpdateEventSink, UpdatePath,
    feedback_color, progress_percent,
};
use rgb::RGB8;

type Events = PubSubChannel<NoopRawMutex, UpdateEvent, 4, 2, 0>;

fn progress(written: u32) -> UpdateEvent {
    UpdateEvent::Progress {
        path: UpdatePath::Push,
        written,
        total: 1000,
    }
}

// ============================================================================
// Tests: MockLedWriter
// ============================================================================

#[test]
fn test_mock_led_writer_fail() {
    let mut mock = MockLedWriter::new();
    mock.fail_next_write = true;

    let result = mock.write(RGB8 { r: 10, g: 0, b: 0 });
    assert_eq!(result, Err(LedError::WriteFailed));
    assert_eq!(mock.write_count, 0);

    mock.write(RGB8 { r: 0, g: 10, b: 0 }).unwrap();
    assert_eq!(mock.last_color, Some(RGB8 { r: 0, g: 10, b: 0 }));
}

// ============================================================================
// Tests: Farben
// ============================================================================

#[test]
fn test_progress_brightens_blue() {
    let mut led = MockLedWriter::new();
    let mut last_blue = 0;

    led.write(feedback_color(&UpdateEvent::Started {
        path: UpdatePath::Push,
        total: 1000,
    }))
    .unwrap();
    assert_eq!(led.last_color, Some(RGB8 { r: 0, g: 0, b: 1 }));

    for written in (0..=1000).step_by(100) {
        led.write(feedback_color(&progress(written))).unwrap();
        let color = led.last_color.unwrap();
        assert_eq!((color.r, color.g), (0, 0));
        assert!(color.b >= last_blue);
        last_blue = color.b;
    }
    assert_eq!(last_blue, 40);
}

#[test]
fn test_result_colors() {
    let applied = feedback_color(&UpdateEvent::Applied {
        path: UpdatePath::Pull,
    });
    let failed = feedback_color(&UpdateEvent::Failed {
        path: UpdatePath::Pull,
        error: UpdateError::SignatureMismatch,
    });

    assert_eq!(applied, RGB8 { r: 0, g: 40, b: 0 });
    assert_eq!(failed, RGB8 { r: 40, g: 0, b: 0 });
}

#[test]
fn test_restart_fade_ends_dark() {
    let mut led = MockLedWriter::new();
    let green = RGB8 { r: 0, g: 40, b: 0 };

    for step in 1..=8 {
        led.write(dim(green, step, 8)).unwrap();
    }

    assert_eq!(led.write_count, 8);
    assert_eq!(led.last_color, Some(RGB8::default()));
    assert_eq!(dim(green, 4, 8), RGB8 { r: 0, g: 20, b: 0 });
    assert_eq!(dim(green, 0, 0), RGB8::default());
}

// ============================================================================
// Tests: Progress und Event-Verteilung
// ============================================================================

#[test]
fn test_progress_throttle_once_per_percent() {
    let mut throttle = ProgressThrottle::new();
    let total = 100_000;

    let reported: Vec<u8> = (0..=total)
        .step_by(250)
        .filter_map(|written| throttle.update(written, total))
        .collect();

    assert_eq!(reported.len(), 101);
    assert_eq!(reported.first(), Some(&0));
    assert_eq!(reported.last(), Some(&100));
    assert_eq!(progress_percent(5, 0), 0);
}

#[test]
fn test_channel_reaches_every_subscriber() {
    let channel = Events::new();
    let mut led = channel.subscriber().unwrap();
    let mut dashboard = channel.subscriber().unwrap();

    channel.emit(UpdateEvent::Applied {
        path: UpdatePath::Push,
    });

    let expected = Some(UpdateEvent::Applied {
        path: UpdatePath::Push,
    });
    assert_eq!(led.try_next_message_pure(), expected);
    assert_eq!(dashboard.try_next_message_pure(), expected);
}

#[test]
fn test_full_channel_drops_oldest_event() {
    let channel = Events::new();
    let mut slow = channel.subscriber().unwrap();

    for written in 1..=6 {
        channel.emit(progress(written));
    }

    // Kapazität 4: die ersten beiden Events sind verdrängt
    let received: Vec<UpdateEvent> = core::iter::from_fn(|| slow.try_next_message_pure()).collect();
    assert_eq!(received.first(), Some(&progress(3)));
    assert_eq!(received.len(), 4);
}
