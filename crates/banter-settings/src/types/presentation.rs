//! Overlay and dashboard settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Entry/exit animation of the overlay card. Pure rendering parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Animation {
    /// Opacity transition.
    #[default]
    Fade,
    /// Slide in from the bottom edge.
    Slide,
    /// Grow from the centre.
    Scale,
}

impl fmt::Display for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fade => f.write_str("fade"),
            Self::Slide => f.write_str("slide"),
            Self::Scale => f.write_str("scale"),
        }
    }
}

/// Overlay presentation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlaySettings {
    /// How long an item stays on screen, in ms.
    pub display_duration_ms: u64,
    /// Exit animation length before the card is cleared, in ms.
    pub exit_delay_ms: u64,
    /// Card animation.
    pub animation: Animation,
    /// Whether items with audio start playback automatically.
    pub auto_play: bool,
    /// Playback volume, 0–100.
    pub volume: u8,
    /// Bind address of the capture surface.
    pub surface_host: String,
    /// Port of the capture surface.
    pub surface_port: u16,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            display_duration_ms: 12_000,
            exit_delay_ms: 500,
            animation: Animation::Fade,
            auto_play: true,
            volume: 80,
            surface_host: "127.0.0.1".to_string(),
            surface_port: 4455,
        }
    }
}

/// Dashboard queue settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSettings {
    /// Fallback refetch period, in ms.
    pub poll_interval_ms: u64,
    /// Ask the server for unplayed items only.
    pub unplayed_only: bool,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            unplayed_only: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_defaults() {
        let s = OverlaySettings::default();
        assert_eq!(s.display_duration_ms, 12_000);
        assert_eq!(s.animation, Animation::Fade);
        assert!(s.auto_play);
        assert_eq!(s.volume, 80);
    }

    #[test]
    fn animation_wire_names() {
        let a: Animation = serde_json::from_str("\"slide\"").unwrap();
        assert_eq!(a, Animation::Slide);
        assert_eq!(serde_json::to_string(&Animation::Scale).unwrap(), "\"scale\"");
        assert_eq!(Animation::Fade.to_string(), "fade");
    }

    #[test]
    fn unknown_animation_rejected() {
        assert!(serde_json::from_str::<Animation>("\"spin\"").is_err());
    }

    #[test]
    fn dashboard_defaults() {
        let s = DashboardSettings::default();
        assert_eq!(s.poll_interval_ms, 30_000);
        assert!(s.unplayed_only);
    }
}
