//! Release Resolver
//!
//! Bestimmt aus Kanal und Release-Registry genau eine Download-URL.
//!
//! - **Stable:** feste "latest" URL, kein Metadaten-Request
//! - **Prerelease:** Release-Liste laden, neuestes Prerelease auswählen

use core::fmt::{self, Write};
use core::marker::PhantomData;

use heapless::Vec;
use serde::de::{Deserializer, SeqAccess, Visitor};
use serde::Deserialize;

use crate::error::{TransportError, UpdateError};
use crate::logic::embeds_version;
use crate::traits::FirmwareTransport;
use crate::types::{Channel, ReleaseCandidate, ResolvedArtifact, Url};

/// Maximale Anzahl Releases pro Metadaten-Antwort
pub const MAX_RELEASES: usize = 8;

/// Anzahl Asset-Namen, die pro Release gespeichert werden
///
/// Weitere Assets werden dekodiert, aber nur als [`AssetList::is_truncated`]
/// vermerkt.
pub const MAX_ASSETS: usize = 16;

/// Woher Releases kommen
#[derive(Debug, Clone, Copy)]
pub struct ReleaseSource<'a> {
    /// Host für Downloads (z.B. "github.com")
    pub web_host: &'a str,
    /// Host der REST API (z.B. "api.github.com")
    pub api_host: &'a str,
    /// "<owner>/<repo>"
    pub repository: &'a str,
    /// Dateiname des Firmware-Assets
    pub asset: &'a str,
    /// `per_page` des Metadaten-Requests, höchstens [`MAX_RELEASES`]
    pub page_size: u8,
}

/// Ein Eintrag der Release-Liste
///
/// Nur die benötigten Felder werden dekodiert, alle anderen überspringt
/// der Parser.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseEntry<'a> {
    #[serde(default, borrow)]
    pub tag_name: Option<&'a str>,
    #[serde(default, borrow)]
    pub name: Option<&'a str>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default, borrow)]
    pub published_at: Option<&'a str>,
    #[serde(default, borrow)]
    pub assets: AssetList<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetEntry<'a> {
    #[serde(borrow)]
    pub name: &'a str,
}

/// Asset-Namen eines Releases, höchstens [`MAX_ASSETS`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetList<'a> {
    names: Vec<&'a str, MAX_ASSETS>,
    truncated: bool,
}

impl<'a> AssetList<'a> {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && !self.truncated
    }

    /// Ob die Liste mehr Assets hatte als gespeichert wurden
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.names.iter().any(|name| *name == asset)
    }
}

impl<'de: 'a, 'a> Deserialize<'de> for AssetList<'a> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AssetVisitor<'a>(PhantomData<&'a ()>);

        impl<'de: 'a, 'a> Visitor<'de> for AssetVisitor<'a> {
            type Value = AssetList<'a>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of release assets")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut list = AssetList::default();
                while let Some(asset) = seq.next_element::<AssetEntry<'a>>()? {
                    if list.names.push(asset.name).is_err() {
                        list.truncated = true;
                    }
                }
                Ok(list)
            }
        }

        deserializer.deserialize_seq(AssetVisitor(PhantomData))
    }
}

impl<'a> ReleaseEntry<'a> {
    /// Versions-Tag, `name` als Fallback
    pub fn tag(&self) -> Option<&'a str> {
        self.tag_name
            .filter(|t| !t.is_empty())
            .or(self.name.filter(|n| !n.is_empty()))
    }

    /// Eine leere oder abgeschnittene Liste gilt als unbekannt und damit
    /// als passend
    fn offers(&self, asset: &str) -> bool {
        self.assets.is_empty() || self.assets.contains(asset) || self.assets.is_truncated()
    }
}

/// Dekodiert die Release-Liste der Registry
pub fn parse_releases(body: &[u8]) -> Result<Vec<ReleaseEntry<'_>, MAX_RELEASES>, TransportError> {
    match serde_json_core::from_slice::<Vec<ReleaseEntry<'_>, MAX_RELEASES>>(body) {
        Ok((entries, _)) => Ok(entries),
        Err(_) => {
            warn!("Resolver: release metadata could not be parsed ({} bytes)", body.len());
            Err(TransportError::InvalidResponse)
        }
    }
}

/// Wählt das Prerelease mit dem grössten `published_at`
///
/// ISO-8601 UTC Zeitstempel sortieren lexikographisch korrekt. Bei
/// Gleichstand gewinnt der erste Eintrag der Liste.
pub fn select_newest_prerelease<'a>(
    entries: &[ReleaseEntry<'a>],
    asset: &'a str,
) -> Option<ReleaseCandidate<'a>> {
    let mut newest: Option<ReleaseCandidate<'a>> = None;

    for entry in entries.iter().filter(|e| e.prerelease) {
        let Some(name) = entry.tag() else {
            continue;
        };
        if !entry.offers(asset) {
            debug!("Resolver: {} has no asset {}", name, asset);
            continue;
        }

        let published_at = entry.published_at.unwrap_or("");
        match newest {
            Some(current) if published_at <= current.published_at => {}
            _ => {
                newest = Some(ReleaseCandidate {
                    name,
                    published_at,
                    asset_path: asset,
                })
            }
        }
    }

    newest
}

fn build_url(args: core::fmt::Arguments<'_>) -> Result<Url, UpdateError> {
    let mut url = Url::new();
    url.write_fmt(args)
        .map_err(|_| UpdateError::Transport(TransportError::UrlTooLong))?;
    Ok(url)
}

/// `https://<host>/<repo>/releases/latest/download/<asset>`
pub fn stable_url(source: &ReleaseSource<'_>) -> Result<Url, UpdateError> {
    build_url(format_args!(
        "https://{}/{}/releases/latest/download/{}",
        source.web_host, source.repository, source.asset
    ))
}

/// `https://<host>/<repo>/releases/download/<tag>/<asset>`
pub fn tagged_url(source: &ReleaseSource<'_>, tag: &str) -> Result<Url, UpdateError> {
    build_url(format_args!(
        "https://{}/{}/releases/download/{}/{}",
        source.web_host, source.repository, tag, source.asset
    ))
}

/// `https://<api>/repos/<repo>/releases?per_page=<n>`
pub fn releases_url(source: &ReleaseSource<'_>) -> Result<Url, UpdateError> {
    let page_size = source.page_size.clamp(1, MAX_RELEASES as u8);
    build_url(format_args!(
        "https://{}/repos/{}/releases?per_page={}",
        source.api_host, source.repository, page_size
    ))
}

/// Löst den Kanal zu einer Download-URL auf
///
/// # Parameter
/// - `running_version`: Versions-Token der laufenden Firmware
/// - `buf`: Buffer für die Release-Metadaten (nur Prerelease)
///
/// # Fehlerbehandlung
/// - `NotFound`: kein passendes Prerelease, oder das Ziel ist die
///   laufende Version
/// - `Transport(..)`: Request fehlgeschlagen oder Antwort ungültig
pub async fn resolve<T: FirmwareTransport>(
    source: &ReleaseSource<'_>,
    channel: Channel,
    running_version: &str,
    transport: &mut T,
    buf: &mut [u8],
) -> Result<ResolvedArtifact, UpdateError> {
    let download_url = match channel {
        Channel::Stable => stable_url(source)?,
        Channel::Prerelease => {
            let list_url = releases_url(source)?;
            let len = transport.fetch(&list_url, buf).await?;
            let entries = parse_releases(&buf[..len])?;

            let candidate =
                select_newest_prerelease(&entries, source.asset).ok_or(UpdateError::NotFound)?;
            info!(
                "Resolver: newest prerelease {} ({})",
                candidate.name,
                candidate.published_at
            );
            tagged_url(source, candidate.name)?
        }
    };

    if embeds_version(&download_url, running_version) {
        info!("Resolver: {} is already running", running_version);
        return Err(UpdateError::NotFound);
    }

    Ok(ResolvedArtifact { download_url })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: ReleaseSource<'static> = ReleaseSource {
        web_host: "github.com",
        api_host: "api.github.com",
        repository: "owner/panel",
        asset: "esp32c6.bin",
        page_size: 4,
    };

    const SCENARIO: &str = r#"[
        {"name":"v0.2.2","prerelease":true,"published_at":"2024-01-01T00:00:00Z"},
        {"name":"v0.2.3","prerelease":true,"published_at":"2024-02-01T00:00:00Z"},
        {"name":"v0.2.1","prerelease":false,"published_at":"2024-03-01T00:00:00Z"}
    ]"#;

    #[test]
    fn test_stable_url() {
        let url = stable_url(&SOURCE).unwrap();
        assert_eq!(
            url.as_str(),
            "https://github.com/owner/panel/releases/latest/download/esp32c6.bin"
        );
    }

    #[test]
    fn test_releases_url_clamps_page_size() {
        let source = ReleaseSource { page_size: 100, ..SOURCE };
        let url = releases_url(&source).unwrap();
        assert!(url.ends_with("releases?per_page=8"));
    }

    #[test]
    fn test_url_too_long() {
        let bytes = [b'p'; 1100];
        let long = core::str::from_utf8(&bytes).unwrap();
        let source = ReleaseSource { repository: long, ..SOURCE };
        assert_eq!(
            stable_url(&source),
            Err(UpdateError::Transport(TransportError::UrlTooLong))
        );
    }

    #[test]
    fn test_parse_and_select_scenario() {
        let entries = parse_releases(SCENARIO.as_bytes()).unwrap();
        assert_eq!(entries.len(), 3);
        let newest = select_newest_prerelease(&entries, SOURCE.asset).unwrap();
        assert_eq!(newest.name, "v0.2.3");
        assert_eq!(newest.published_at, "2024-02-01T00:00:00Z");
    }

    #[test]
    fn test_parse_skips_unknown_fields() {
        let body = br#"[{"url":"https://x","id":7,"author":{"login":"a","site_admin":false},
            "tag_name":"v1.0.0-rc1","name":"Release candidate","draft":false,
            "prerelease":true,"published_at":"2024-05-01T10:00:00Z",
            "assets":[{"name":"esp32c6.bin","size":1024,"uploader":{"id":1}}],
            "body":"notes"}]"#;
        let entries = parse_releases(body).unwrap();
        assert_eq!(entries[0].tag(), Some("v1.0.0-rc1"));
        assert_eq!(entries[0].assets.len(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            parse_releases(b"<html>rate limited</html>"),
            Err(TransportError::InvalidResponse)
        );
    }

    #[test]
    fn test_no_prerelease_is_none() {
        let body = br#"[{"name":"v1","prerelease":false,"published_at":"2024-01-01T00:00:00Z"}]"#;
        let entries = parse_releases(body).unwrap();
        assert_eq!(select_newest_prerelease(&entries, SOURCE.asset), None);
    }

    #[test]
    fn test_tie_keeps_first_entry() {
        let body = br#"[
            {"name":"a","prerelease":true,"published_at":"2024-01-01T00:00:00Z"},
            {"name":"b","prerelease":true,"published_at":"2024-01-01T00:00:00Z"}
        ]"#;
        let entries = parse_releases(body).unwrap();
        assert_eq!(select_newest_prerelease(&entries, SOURCE.asset).unwrap().name, "a");
    }

    #[test]
    fn test_prerelease_without_asset_is_skipped() {
        let body = br#"[
            {"name":"v2","prerelease":true,"published_at":"2024-06-01T00:00:00Z",
             "assets":[{"name":"esp32s3.bin"}]},
            {"name":"v1","prerelease":true,"published_at":"2024-05-01T00:00:00Z",
             "assets":[{"name":"esp32c6.bin"}]}
        ]"#;
        let entries = parse_releases(body).unwrap();
        assert_eq!(select_newest_prerelease(&entries, SOURCE.asset).unwrap().name, "v1");
    }

    #[test]
    fn test_many_assets_do_not_break_the_list() {
        let mut body: heapless::String<2048> = heapless::String::new();
        body.push_str(r#"[{"name":"v3","prerelease":true,"published_at":"2024-07-01T00:00:00Z","assets":["#)
            .unwrap();
        for i in 0..MAX_ASSETS + 4 {
            write!(body, r#"{{"name":"extra-{}.zip"}},"#, i).unwrap();
        }
        body.push_str(
            r#"{"name":"esp32c6.bin"}]},
            {"name":"v2","prerelease":true,"published_at":"2024-06-01T00:00:00Z",
             "assets":[{"name":"esp32c6.bin"}]}]"#,
        )
        .unwrap();

        let entries = parse_releases(body.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].assets.len(), MAX_ASSETS);
        assert!(entries[0].assets.is_truncated());
        assert_eq!(select_newest_prerelease(&entries, SOURCE.asset).unwrap().name, "v3");
    }

    #[test]
    fn test_tagged_url() {
        let url = tagged_url(&SOURCE, "v0.2.3").unwrap();
        assert!(url.ends_with("/releases/download/v0.2.3/esp32c6.bin"));
    }
}
