//! Audio source resolution.
//!
//! Items carry their voice clip as an absolute URL, a path relative to the
//! server origin, or an embedded `data:` URI. All three resolve to a
//! [`MediaSource`] before anything is loaded.

use std::fmt;
use std::sync::Arc;

use banter_core::AudioError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use url::Url;

/// A loadable audio resource.
#[derive(Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Bytes carried inline in a `data:` URI.
    Embedded {
        /// Declared MIME type, if any.
        mime: Option<String>,
        /// Decoded payload.
        bytes: Arc<[u8]>,
    },
    /// Resource fetched over HTTP.
    Remote(Url),
}

impl MediaSource {
    /// MIME type when known up front.
    pub fn mime(&self) -> Option<&str> {
        match self {
            Self::Embedded { mime, .. } => mime.as_deref(),
            Self::Remote(_) => None,
        }
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded { mime, bytes } => f
                .debug_struct("Embedded")
                .field("mime", mime)
                .field("len", &bytes.len())
                .finish(),
            Self::Remote(url) => f.debug_tuple("Remote").field(&url.as_str()).finish(),
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded { mime, bytes } => write!(
                f,
                "data:{} ({} bytes)",
                mime.as_deref().unwrap_or("application/octet-stream"),
                bytes.len()
            ),
            Self::Remote(url) => f.write_str(url.as_str()),
        }
    }
}

/// Resolve a raw audio reference against the server origin.
pub fn resolve_source(raw: &str, origin: &Url) -> Result<MediaSource, AudioError> {
    let raw = raw.trim();
    let invalid = |reason: &str| AudioError::InvalidSource {
        location: abbreviate(raw),
        reason: reason.to_owned(),
    };

    if raw.is_empty() {
        return Err(invalid("empty audio url"));
    }
    if raw.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
        return parse_data_uri(&raw[5..]).map_err(|reason| invalid(&reason));
    }

    match Url::parse(raw) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(MediaSource::Remote(url)),
            other => Err(invalid(&format!("unsupported scheme {other}"))),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => origin
            .join(raw)
            .map(MediaSource::Remote)
            .map_err(|e| invalid(&e.to_string())),
        Err(e) => Err(invalid(&e.to_string())),
    }
}

/// `[<mime>][;param]*[;base64],<payload>`
fn parse_data_uri(rest: &str) -> Result<MediaSource, String> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data uri has no payload separator".to_owned())?;

    let mut parts = header.split(';');
    let mime = parts
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_ascii_lowercase);
    let is_base64 = parts.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| format!("bad base64 payload: {e}"))?
    } else {
        payload.as_bytes().to_vec()
    };
    if bytes.is_empty() {
        return Err("data uri payload is empty".into());
    }

    Ok(MediaSource::Embedded {
        mime,
        bytes: bytes.into(),
    })
}

/// Keep log lines readable when the reference is a large data URI.
fn abbreviate(raw: &str) -> String {
    const MAX: usize = 64;
    if raw.len() <= MAX {
        return raw.to_owned();
    }
    let mut end = MAX;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &raw[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn origin() -> Url {
        Url::parse("https://banter.example/overlay/page").unwrap()
    }

    #[test]
    fn absolute_url_kept() {
        let src = resolve_source("https://cdn.example/a.mp3", &origin()).unwrap();
        assert_eq!(src, MediaSource::Remote(Url::parse("https://cdn.example/a.mp3").unwrap()));
    }

    #[test]
    fn root_relative_path_joined_to_origin() {
        let src = resolve_source("/audio/x1.mp3", &origin()).unwrap();
        assert_eq!(src.to_string(), "https://banter.example/audio/x1.mp3");
    }

    #[test]
    fn bare_relative_path_joined_to_origin() {
        let src = resolve_source("clips/x1.mp3", &origin()).unwrap();
        assert_eq!(src.to_string(), "https://banter.example/overlay/clips/x1.mp3");
    }

    #[test]
    fn base64_data_uri_decoded() {
        let src = resolve_source("data:audio/mpeg;base64,SUQz", &origin()).unwrap();
        assert_matches!(&src, MediaSource::Embedded { mime: Some(m), bytes } if m == "audio/mpeg" && &bytes[..] == b"ID3");
        assert_eq!(src.mime(), Some("audio/mpeg"));
    }

    #[test]
    fn data_uri_scheme_case_insensitive() {
        let src = resolve_source("DATA:audio/wav;BASE64,UklG", &origin()).unwrap();
        assert_matches!(src, MediaSource::Embedded { .. });
    }

    #[test]
    fn data_uri_without_mime() {
        let src = resolve_source("data:;base64,AAEC", &origin()).unwrap();
        assert_matches!(src, MediaSource::Embedded { mime: None, ref bytes } if bytes.len() == 3);
    }

    #[test]
    fn bad_base64_rejected() {
        let err = resolve_source("data:audio/wav;base64,!!!", &origin()).unwrap_err();
        assert_matches!(err, AudioError::InvalidSource { .. });
        assert_eq!(err.kind(), banter_core::AudioFailureKind::AudioLoadFailure);
    }

    #[test]
    fn data_uri_without_comma_rejected() {
        assert!(resolve_source("data:audio/wav;base64", &origin()).is_err());
    }

    #[test]
    fn unsupported_scheme_rejected() {
        assert!(resolve_source("ftp://h/a.mp3", &origin()).is_err());
        assert!(resolve_source("   ", &origin()).is_err());
    }

    #[test]
    fn long_locations_abbreviated_in_errors() {
        let raw = format!("data:audio/wav;base64,{}", "!".repeat(500));
        let AudioError::InvalidSource { location, .. } = resolve_source(&raw, &origin()).unwrap_err() else {
            panic!("expected InvalidSource");
        };
        assert!(location.chars().count() <= 65);
    }

    #[test]
    fn display_hides_payload() {
        let src = resolve_source("data:audio/wav;base64,UklGRg==", &origin()).unwrap();
        assert_eq!(src.to_string(), "data:audio/wav (4 bytes)");
    }
}
