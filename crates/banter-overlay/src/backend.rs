//! Media element abstraction.
//!
//! [`MediaBackend::load`] creates one element for one source and returns
//! immediately; loading happens in the background. The element reports
//! [`MediaEvent::CanPlay`] once it is ready and does not start until told to
//! [`MediaCommand::Play`]. Dropping the command sender stops it.
//!
//! [`ClockBackend`] is the headless production element: it fetches the
//! resource, probes the duration with `symphonia`, and runs a pausable clock
//! that reports [`MediaEvent::Ended`] when the duration has elapsed.

use std::io::Cursor;
use std::time::Duration;

use banter_core::AudioError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::source::MediaSource;

/// Instruction to a media element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MediaCommand {
    /// Start playback (after `CanPlay`).
    Play,
    /// Pause, keeping position.
    Pause,
    /// Continue from the paused position.
    Resume,
    /// Set output volume in `[0, 1]`.
    SetVolume(f32),
    /// Stop and release.
    Stop,
}

/// Notification from a media element.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    /// Loaded and ready to start.
    CanPlay,
    /// Playback reached the end.
    Ended,
    /// Loading or playback failed.
    Error(AudioError),
}

/// Both directions of one media element.
#[derive(Debug)]
pub struct MediaHandle {
    /// Commands to the element.
    pub commands: mpsc::UnboundedSender<MediaCommand>,
    /// Events from the element.
    pub events: mpsc::UnboundedReceiver<MediaEvent>,
}

/// Creates media elements.
pub trait MediaBackend: Send + Sync + 'static {
    /// Create an element for `source` at `volume` and start loading it.
    fn load(&self, source: MediaSource, volume: f32) -> MediaHandle;
}

// ─────────────────────────────────────────────────────────────────────────────
// ClockBackend
// ─────────────────────────────────────────────────────────────────────────────

/// Upper bound on fetching one remote clip.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Headless element: fetch, probe duration, run a clock.
#[derive(Clone, Debug)]
pub struct ClockBackend {
    client: reqwest::Client,
}

impl ClockBackend {
    /// Create a backend with a shared HTTP client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Create a backend whose fetches give up after `timeout`, so a stalled
    /// clip surfaces as [`MediaEvent::Error`] instead of loading forever.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("banter/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self::new(client)
    }
}

impl Default for ClockBackend {
    fn default() -> Self {
        Self::with_timeout(FETCH_TIMEOUT)
    }
}

impl MediaBackend for ClockBackend {
    fn load(&self, source: MediaSource, volume: f32) -> MediaHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();
        drop(tokio::spawn(run_element(
            self.client.clone(),
            source,
            volume,
            cmd_rx,
            evt_tx,
        )));
        MediaHandle {
            commands: cmd_tx,
            events: evt_rx,
        }
    }
}

async fn run_element(
    client: reqwest::Client,
    source: MediaSource,
    mut volume: f32,
    mut commands: mpsc::UnboundedReceiver<MediaCommand>,
    events: mpsc::UnboundedSender<MediaEvent>,
) {
    // ── Loading ─────────────────────────────────────────────────────
    let load = load_duration(&client, &source);
    tokio::pin!(load);
    let mut play_requested = false;

    let duration = loop {
        tokio::select! {
            result = &mut load => match result {
                Ok(duration) => break duration,
                Err(e) => {
                    let _ = events.send(MediaEvent::Error(e));
                    return;
                }
            },
            cmd = commands.recv() => match cmd {
                None | Some(MediaCommand::Stop) => return,
                Some(MediaCommand::SetVolume(v)) => volume = v,
                Some(MediaCommand::Play) => play_requested = true,
                Some(MediaCommand::Pause | MediaCommand::Resume) => {}
            },
        }
    };
    debug!(%source, duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX), "media loaded");
    if events.send(MediaEvent::CanPlay).is_err() {
        return;
    }

    // ── Waiting for Play ────────────────────────────────────────────
    while !play_requested {
        match commands.recv().await {
            None | Some(MediaCommand::Stop) => return,
            Some(MediaCommand::Play) => play_requested = true,
            Some(MediaCommand::SetVolume(v)) => volume = v,
            Some(MediaCommand::Pause | MediaCommand::Resume) => {}
        }
    }

    // ── Playing ─────────────────────────────────────────────────────
    let mut remaining = duration;
    // `None` while paused.
    let mut deadline = Some(Instant::now() + remaining);
    loop {
        if let Some(at) = deadline {
            tokio::select! {
                () = tokio::time::sleep_until(at) => {
                    debug!(%source, volume, "media ended");
                    let _ = events.send(MediaEvent::Ended);
                    return;
                }
                cmd = commands.recv() => match cmd {
                    None | Some(MediaCommand::Stop) => return,
                    Some(MediaCommand::Pause) => {
                        remaining = at.saturating_duration_since(Instant::now());
                        deadline = None;
                    }
                    Some(MediaCommand::SetVolume(v)) => volume = v,
                    Some(MediaCommand::Play | MediaCommand::Resume) => {}
                },
            }
        } else {
            match commands.recv().await {
                None | Some(MediaCommand::Stop) => return,
                Some(MediaCommand::Resume | MediaCommand::Play) => {
                    deadline = Some(Instant::now() + remaining);
                }
                Some(MediaCommand::SetVolume(v)) => volume = v,
                Some(MediaCommand::Pause) => {}
            }
        }
    }
}

async fn load_duration(client: &reqwest::Client, source: &MediaSource) -> Result<Duration, AudioError> {
    let (bytes, mime) = match source {
        MediaSource::Embedded { mime, bytes } => (bytes.to_vec(), mime.clone()),
        MediaSource::Remote(url) => fetch(client, url).await?,
    };
    let location = source.to_string();
    tokio::task::spawn_blocking(move || probe_duration(bytes, mime.as_deref()))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r)
        .map_err(|reason| AudioError::Load { location, reason })
}

async fn fetch(
    client: &reqwest::Client,
    url: &url::Url,
) -> Result<(Vec<u8>, Option<String>), AudioError> {
    let load_err = |reason: String| AudioError::Load {
        location: url.to_string(),
        reason,
    };
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| load_err(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        warn!(%url, status = status.as_u16(), "audio fetch failed");
        return Err(load_err(format!("HTTP {}", status.as_u16())));
    }
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());
    let bytes = response.bytes().await.map_err(|e| load_err(e.to_string()))?;
    Ok((bytes.to_vec(), mime))
}

/// Probe the playable duration of an encoded clip.
pub fn probe_duration(bytes: Vec<u8>, mime: Option<&str>) -> Result<Duration, String> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = mime.and_then(extension_for_mime) {
        let _ = hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("probe failed: {e}"))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| "no audio track found".to_owned())?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let time_base = params
        .time_base
        .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)))
        .ok_or_else(|| "track has no time base".to_owned())?;

    let frames = if let Some(n) = params.n_frames {
        n
    } else {
        // No frame count in the header: add up packet durations.
        let mut total = 0u64;
        while let Ok(packet) = format.next_packet() {
            if packet.track_id() == track_id {
                total += packet.dur;
            }
        }
        total
    };
    if frames == 0 {
        return Err("clip is empty".into());
    }

    let time = time_base.calc_time(frames);
    Ok(Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac))
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "audio/wav" | "audio/wave" | "audio/x-wav" => Some("wav"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/ogg" | "audio/vorbis" => Some("ogg"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => Some("m4a"),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
