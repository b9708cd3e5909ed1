//! Pure Business Logic Functions
//!
//! Funktionen ohne Hardware-Dependencies (testbar!)

use rgb::RGB8;

use crate::types::UpdateEvent;

/// Entfernt ein führendes `v`/`V` (`"v0.2.3"` == `"0.2.3"`)
fn strip_version_prefix(token: &str) -> &str {
    token
        .strip_prefix('v')
        .or_else(|| token.strip_prefix('V'))
        .unwrap_or(token)
}

/// Prüft ob `url` das Versions-Token `version` enthält
///
/// Gesucht wird in der ganzen URL (Pfad, Dateiname, Query). Ein Treffer
/// muss an beiden Enden begrenzt sein, damit `v0.2.3` nicht in `v0.2.30`
/// oder `10.2.3` gefunden wird. Ein führendes `v`/`V` zählt zum Token.
/// Ein leeres Token passt nie.
///
/// # Beispiele
///
/// ```
/// # use panel_core::embeds_version;
/// let url = "https://github.com/o/r/releases/download/v0.2.3/esp32c6.bin";
/// assert!(embeds_version(url, "v0.2.3"));
/// assert!(embeds_version(url, "0.2.3"));
/// assert!(!embeds_version(url, "v0.2.2"));
/// assert!(embeds_version("https://cdn.example.com/esp32c6-v0.2.2.bin", "v0.2.2"));
/// ```
pub fn embeds_version(url: &str, version: &str) -> bool {
    let version = strip_version_prefix(version.trim());
    if version.is_empty() {
        return false;
    }

    let bytes = url.as_bytes();
    url.match_indices(version).any(|(start, token)| {
        bounded_left(bytes, start) && bounded_right(bytes, start + token.len())
    })
}

/// Davor steht kein Teil einer längeren Versionsnummer
fn bounded_left(bytes: &[u8], start: usize) -> bool {
    let Some(&prev) = start.checked_sub(1).and_then(|i| bytes.get(i)) else {
        return true;
    };
    if prev == b'v' || prev == b'V' {
        // `v` nur als Präfix, nicht als Ende eines Worts (`dev0.2.3`)
        return start
            .checked_sub(2)
            .and_then(|i| bytes.get(i))
            .is_none_or(|b| !b.is_ascii_alphanumeric());
    }
    !prev.is_ascii_alphanumeric() && prev != b'.'
}

/// Danach folgt keine weitere Stelle der Versionsnummer
fn bounded_right(bytes: &[u8], end: usize) -> bool {
    match bytes.get(end) {
        None => true,
        // `.bin` beendet die Version, `.1` verlängert sie
        Some(b'.') => bytes.get(end + 1).is_none_or(|b| !b.is_ascii_digit()),
        Some(next) => !next.is_ascii_alphanumeric(),
    }
}

/// Fortschritt in ganzen Prozent (0..=100)
pub fn progress_percent(written: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (written as u64 * 100) / total as u64;
    percent.min(100) as u8
}

/// Drosselt Progress-Events auf eine Meldung pro Prozentpunkt
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last: Option<u8>,
}

impl ProgressThrottle {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Liefert den neuen Prozentwert, falls er sich geändert hat
    pub fn update(&mut self, written: u32, total: u32) -> Option<u8> {
        let percent = progress_percent(written, total);
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }
}

/// Helligkeit der Status-LED während eines Updates
const FEEDBACK_BRIGHTNESS: u8 = 40;

/// Farbe der Status-LED für ein Update-Event
///
/// - Transfer: Blau, Helligkeit steigt mit dem Fortschritt
/// - Applied: Grün
/// - Failed: Rot
pub fn feedback_color(event: &UpdateEvent) -> RGB8 {
    match *event {
        UpdateEvent::Started { .. } => RGB8 { r: 0, g: 0, b: 1 },
        UpdateEvent::Progress { written, total, .. } => {
            let percent = progress_percent(written, total) as u16;
            let b = (percent * FEEDBACK_BRIGHTNESS as u16 / 100).max(1) as u8;
            RGB8 { r: 0, g: 0, b }
        }
        UpdateEvent::Applied { .. } => RGB8 { r: 0, g: FEEDBACK_BRIGHTNESS, b: 0 },
        UpdateEvent::Failed { .. } => RGB8 { r: FEEDBACK_BRIGHTNESS, g: 0, b: 0 },
    }
}

/// Skaliert eine Farbe linear herunter (Fade-Out vor dem Neustart)
pub fn dim(color: RGB8, step: u8, steps: u8) -> RGB8 {
    if steps == 0 || step >= steps {
        return RGB8::default();
    }
    let remaining = (steps - step) as u16;
    let scale = |c: u8| ((c as u16 * remaining) / steps as u16) as u8;
    RGB8 {
        r: scale(color.r),
        g: scale(color.g),
        b: scale(color.b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdateError;
    use crate::types::UpdatePath;

    #[test]
    fn test_embeds_version_matches_tag_segment() {
        let url = "https://github.com/o/r/releases/download/v0.2.3/esp32c6.bin";
        assert!(embeds_version(url, "v0.2.3"));
        assert!(embeds_version(url, "0.2.3"));
    }

    #[test]
    fn test_embeds_version_ignores_longer_versions() {
        let url = "https://github.com/o/r/releases/download/v0.2.30/esp32c6.bin";
        assert!(!embeds_version(url, "v0.2.3"));
        assert!(!embeds_version("https://h/10.2.3/a.bin", "0.2.3"));
        assert!(!embeds_version("https://h/v0.2.3.1/a.bin", "v0.2.3"));
        assert!(!embeds_version("https://h/dev0.2.3/a.bin", "v0.2.3"));
    }

    #[test]
    fn test_embeds_version_in_asset_name() {
        let url = "https://objects.example.com/download/esp32c6-v0.2.2.bin";
        assert!(embeds_version(url, "v0.2.2"));
        assert!(embeds_version("https://h/esp32c6_0.2.2", "v0.2.2"));
    }

    #[test]
    fn test_embeds_version_empty_token_never_matches() {
        assert!(!embeds_version("https://github.com/o/r/releases/latest/download/a.bin", ""));
        assert!(!embeds_version("https://github.com//x", "v"));
    }

    #[test]
    fn test_embeds_version_in_query() {
        let url = "https://objects.example.com/a/b.bin?tag=v0.2.3&x=1";
        assert!(embeds_version(url, "v0.2.3"));
    }

    #[test]
    fn test_latest_alias_does_not_embed_version() {
        let url = "https://github.com/o/r/releases/latest/download/esp32c6.bin";
        assert!(!embeds_version(url, "DEV"));
    }

    #[test]
    fn test_progress_percent_bounds() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(50, 200), 25);
        assert_eq!(progress_percent(300, 200), 100);
        assert_eq!(progress_percent(u32::MAX, u32::MAX), 100);
    }

    #[test]
    fn test_progress_throttle_reports_each_percent_once() {
        let mut throttle = ProgressThrottle::new();
        let mut reported = 0;
        for written in (0..=10_000u32).step_by(7) {
            if throttle.update(written, 10_000).is_some() {
                reported += 1;
            }
        }
        assert_eq!(reported, 100);
        assert_eq!(throttle.update(10_000, 10_000), Some(100));
    }

    #[test]
    fn test_progress_throttle_is_monotonic() {
        let mut throttle = ProgressThrottle::new();
        assert_eq!(throttle.update(10, 100), Some(10));
        assert_eq!(throttle.update(5, 100), None);
        assert_eq!(throttle.update(10, 100), None);
        assert_eq!(throttle.update(11, 100), Some(11));
    }

    #[test]
    fn test_feedback_color_by_outcome() {
        let path = UpdatePath::Pull;
        assert_eq!(feedback_color(&UpdateEvent::Applied { path }).g, FEEDBACK_BRIGHTNESS);
        let failed = UpdateEvent::Failed { path, error: UpdateError::Busy };
        assert_eq!(feedback_color(&failed).r, FEEDBACK_BRIGHTNESS);
    }

    #[test]
    fn test_feedback_color_progress_ramp() {
        let path = UpdatePath::Push;
        let low = feedback_color(&UpdateEvent::Progress { path, written: 1, total: 100 });
        let high = feedback_color(&UpdateEvent::Progress { path, written: 100, total: 100 });
        assert!(low.b >= 1);
        assert_eq!(high.b, FEEDBACK_BRIGHTNESS);
    }

    #[test]
    fn test_dim_reaches_black() {
        let color = RGB8 { r: 0, g: 40, b: 0 };
        assert_eq!(dim(color, 0, 4), color);
        assert_eq!(dim(color, 2, 4).g, 20);
        assert_eq!(dim(color, 4, 4), RGB8::default());
    }
}
