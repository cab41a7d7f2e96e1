//! Response bodies of the HTTP collaborators.

use banter_core::DisplayableItem;
use banter_settings::{Animation, OverlaySettings};
use serde::{Deserialize, Serialize};

/// Item list as returned by list-by-owner.
///
/// Accepts either a bare array or an object wrapping it under `items`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ItemList {
    Bare(Vec<DisplayableItem>),
    Wrapped { items: Vec<DisplayableItem> },
}

impl ItemList {
    pub(crate) fn into_items(self) -> Vec<DisplayableItem> {
        match self {
            Self::Bare(items) | Self::Wrapped { items } => items,
        }
    }
}

/// Per-owner overlay preferences (settings-by-owner).
///
/// Every field is optional; missing fields keep the locally configured value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayPreferences {
    /// Display duration in seconds.
    pub overlay_duration: Option<f64>,
    /// Card animation.
    pub overlay_animation: Option<Animation>,
    /// Start audio automatically.
    pub auto_play: Option<bool>,
    /// Volume on a 0–100 scale.
    pub volume: Option<f64>,
}

impl OverlayPreferences {
    /// Volume converted to `[0, 1]`, clamped.
    #[allow(clippy::cast_possible_truncation)]
    pub fn volume_fraction(&self) -> Option<f32> {
        self.volume
            .filter(|v| v.is_finite())
            .map(|v| (v / 100.0).clamp(0.0, 1.0) as f32)
    }

    /// Overlay settings with these preferences layered on top of `base`.
    #[must_use]
    pub fn apply_to(&self, base: &OverlaySettings) -> OverlaySettings {
        let mut merged = base.clone();
        if let Some(secs) = self.overlay_duration.filter(|s| s.is_finite() && *s > 0.0) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let ms = (secs * 1000.0).round() as u64;
            merged.display_duration_ms = ms.max(1);
        }
        if let Some(animation) = self.overlay_animation {
            merged.animation = animation;
        }
        if let Some(auto_play) = self.auto_play {
            merged.auto_play = auto_play;
        }
        if let Some(volume) = self.volume.filter(|v| v.is_finite()) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let percent = volume.round().clamp(0.0, 100.0) as u8;
            merged.volume = percent;
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_accepts_bare_array() {
        let list: ItemList =
            serde_json::from_str(r#"[{"id":"a","banterText":"one"},{"id":"b","text":"two"}]"#).unwrap();
        let items = list.into_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].text, "two");
    }

    #[test]
    fn list_accepts_wrapped_object() {
        let list: ItemList = serde_json::from_str(r#"{"items":[{"id":"a"}],"total":1}"#).unwrap();
        assert_eq!(list.into_items().len(), 1);
    }

    #[test]
    fn preferences_parse_partial() {
        let prefs: OverlayPreferences =
            serde_json::from_str(r#"{"overlayAnimation":"scale","volume":50}"#).unwrap();
        assert_eq!(prefs.overlay_animation, Some(Animation::Scale));
        assert!(prefs.overlay_duration.is_none());
        assert_eq!(prefs.volume_fraction(), Some(0.5));
    }

    #[test]
    fn volume_clamped() {
        let loud = OverlayPreferences {
            volume: Some(250.0),
            ..Default::default()
        };
        assert_eq!(loud.volume_fraction(), Some(1.0));
        let negative = OverlayPreferences {
            volume: Some(-3.0),
            ..Default::default()
        };
        assert_eq!(negative.volume_fraction(), Some(0.0));
    }

    #[test]
    fn apply_overrides_only_present_fields() {
        let base = OverlaySettings::default();
        let prefs = OverlayPreferences {
            overlay_duration: Some(8.0),
            auto_play: Some(false),
            ..Default::default()
        };
        let merged = prefs.apply_to(&base);
        assert_eq!(merged.display_duration_ms, 8000);
        assert!(!merged.auto_play);
        assert_eq!(merged.animation, base.animation);
        assert_eq!(merged.volume, base.volume);
    }

    #[test]
    fn apply_ignores_nonsense_duration() {
        let prefs = OverlayPreferences {
            overlay_duration: Some(-1.0),
            volume: Some(130.0),
            ..Default::default()
        };
        let merged = prefs.apply_to(&OverlaySettings::default());
        assert_eq!(merged.display_duration_ms, 12_000);
        assert_eq!(merged.volume, 100);
    }
}
