// Resolver Tests
// Kanal -> Download-URL gegen einen Mock-Transport

mod mocks;

use embassy_futures::block_on;
use mocks::MockTransport;
use panel_core::{Channel, ReleaseSource, TransportError, UpdateError, resolve};

const SOURCE: ReleaseSource<'static> = ReleaseSource {
    web_host: "github.com",
    api_host: "api.github.com",
    repository: "owner/panel",
    asset: "esp32c6.bin",
    page_size: 5,
};

const RELEASES: &str = r#"[
    {"name":"v0.2.2","prerelease":true,"published_at":"2024-01-01T00:00:00Z"},
    {"name":"v0.2.3","prerelease":true,"published_at":"2024-02-01T00:00:00Z"},
    {"name":"v0.2.1","prerelease":false,"published_at":"2024-03-01T00:00:00Z"}
]"#;

fn resolve_with(
    transport: &mut MockTransport<'_>,
    channel: Channel,
    running: &str,
) -> Result<String, UpdateError> {
    let mut buf = [0u8; 2048];
    block_on(resolve(&SOURCE, channel, running, transport, &mut buf))
        .map(|artifact| artifact.url().to_string())
}

#[test]
fn test_prerelease_picks_newest_prerelease() {
    let mut transport = MockTransport::new(Vec::new()).with_releases(RELEASES);

    let url = resolve_with(&mut transport, Channel::Prerelease, "v0.1.0").unwrap();

    assert_eq!(
        url,
        "https://github.com/owner/panel/releases/download/v0.2.3/esp32c6.bin"
    );
    let log = transport.log.borrow();
    assert_eq!(
        log.fetched,
        vec!["https://api.github.com/repos/owner/panel/releases?per_page=5".to_string()]
    );
}

#[test]
fn test_prerelease_order_does_not_matter() {
    let orderings = [
        r#"[{"name":"v0.2.3","prerelease":true,"published_at":"2024-02-01T00:00:00Z"},
            {"name":"v0.2.1","prerelease":false,"published_at":"2024-03-01T00:00:00Z"},
            {"name":"v0.2.2","prerelease":true,"published_at":"2024-01-01T00:00:00Z"}]"#,
        r#"[{"name":"v0.2.1","prerelease":false,"published_at":"2024-03-01T00:00:00Z"},
            {"name":"v0.2.2","prerelease":true,"published_at":"2024-01-01T00:00:00Z"},
            {"name":"v0.2.3","prerelease":true,"published_at":"2024-02-01T00:00:00Z"}]"#,
    ];

    for body in orderings {
        let mut transport = MockTransport::new(Vec::new()).with_releases(body);
        let url = resolve_with(&mut transport, Channel::Prerelease, "DEV").unwrap();
        assert!(url.ends_with("/releases/download/v0.2.3/esp32c6.bin"), "{}", url);
    }
}

#[test]
fn test_prerelease_none_available() {
    let body = r#"[{"name":"v0.2.1","prerelease":false,"published_at":"2024-03-01T00:00:00Z"}]"#;
    let mut transport = MockTransport::new(Vec::new()).with_releases(body);

    assert_eq!(
        resolve_with(&mut transport, Channel::Prerelease, "v0.1.0"),
        Err(UpdateError::NotFound)
    );
}

#[test]
fn test_prerelease_already_running() {
    let mut transport = MockTransport::new(Vec::new()).with_releases(RELEASES);

    assert_eq!(
        resolve_with(&mut transport, Channel::Prerelease, "v0.2.3"),
        Err(UpdateError::NotFound)
    );
}

#[test]
fn test_prerelease_registry_error() {
    // Kein Body konfiguriert -> HTTP 404
    let mut transport = MockTransport::new(Vec::new());

    assert_eq!(
        resolve_with(&mut transport, Channel::Prerelease, "v0.1.0"),
        Err(UpdateError::Transport(TransportError::Status(404)))
    );
}

#[test]
fn test_prerelease_invalid_metadata() {
    let mut transport = MockTransport::new(Vec::new()).with_releases("{\"message\":\"API rate limit\"}");

    assert_eq!(
        resolve_with(&mut transport, Channel::Prerelease, "v0.1.0"),
        Err(UpdateError::Transport(TransportError::InvalidResponse))
    );
}

#[test]
fn test_stable_needs_no_metadata() {
    let mut transport = MockTransport::new(Vec::new());

    let url = resolve_with(&mut transport, Channel::Stable, "v0.2.3").unwrap();

    assert_eq!(
        url,
        "https://github.com/owner/panel/releases/latest/download/esp32c6.bin"
    );
    assert!(transport.log.borrow().fetched.is_empty());
}
