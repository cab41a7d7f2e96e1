//! Overlay presentation state machine.
//!
//! ```text
//!            qualifying item (any phase)
//!   ┌──────────────────────────────────────────┐
//!   ▼                                          │
//! Idle ──item──▶ Showing ──hide timer──▶ Hiding ──exit delay──▶ Idle
//! ```
//!
//! The machine is pure: inputs are inbound messages and timer firings, outputs
//! are [`Effect`]s the driver executes. Every armed timer carries the
//! machine's generation at arming time; a firing with any other generation is
//! stale and ignored.

use std::time::Duration;

use banter_core::ids::ItemId;
use banter_core::messages::{DisplayableItem, InboundMessage};
use banter_settings::OverlaySettings;
use serde::Serialize;
use tracing::{debug, trace};

/// Lifecycle phase of the display window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Nothing on screen.
    #[default]
    Idle,
    /// Card visible.
    Showing,
    /// Exit animation running.
    Hiding,
}

/// Which timer fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// End of the display duration.
    Hide,
    /// End of the exit animation.
    Clear,
}

/// The single on-screen slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayWindow {
    /// Current phase.
    pub phase: Phase,
    /// Item being shown or animated out.
    pub item: Option<DisplayableItem>,
}

impl DisplayWindow {
    /// Whether the card is fully shown.
    pub fn visible(&self) -> bool {
        self.phase == Phase::Showing
    }

    /// Text of the active item.
    pub fn text(&self) -> Option<&str> {
        self.item.as_ref().map(|item| item.text.as_str())
    }
}

/// Side effect requested by the machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Cancel the outstanding timer, if any.
    CancelTimer,
    /// Arm a timer that reports back `(generation, kind)` after `after`.
    ArmTimer {
        /// Generation to echo back.
        generation: u64,
        /// Timer purpose.
        kind: TimerKind,
        /// Delay.
        after: Duration,
    },
    /// Start audio for the adopted item.
    PlayAudio {
        /// Audio reference.
        url: String,
        /// Owning item.
        item_id: ItemId,
    },
}

/// Timing and playback parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentationConfig {
    /// How long an item stays in `Showing`.
    pub display_duration: Duration,
    /// Length of the exit animation.
    pub exit_delay: Duration,
    /// Start audio automatically.
    pub auto_play: bool,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self::from(&OverlaySettings::default())
    }
}

impl From<&OverlaySettings> for PresentationConfig {
    fn from(settings: &OverlaySettings) -> Self {
        Self {
            display_duration: Duration::from_millis(settings.display_duration_ms),
            exit_delay: Duration::from_millis(settings.exit_delay_ms),
            auto_play: settings.auto_play,
        }
    }
}

/// Idle → Showing → Hiding → Idle.
#[derive(Clone, Debug, Default)]
pub struct PresentationMachine {
    config: PresentationConfig,
    window: DisplayWindow,
    generation: u64,
    timer_armed: bool,
}

impl PresentationMachine {
    /// Create an idle machine.
    pub fn new(config: PresentationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Current window.
    pub fn window(&self) -> &DisplayWindow {
        &self.window
    }

    /// Current generation; bumped on every transition that arms a timer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a timer is outstanding.
    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    /// Feed one inbound message.
    pub fn on_message(&mut self, message: &InboundMessage) -> Vec<Effect> {
        if !message.kind.is_presentable() {
            trace!(kind = message.kind.as_str(), "not a presentable message");
            return Vec::new();
        }
        let Some(item) = message.item().filter(DisplayableItem::has_text) else {
            trace!(kind = message.kind.as_str(), "message carries no displayable text");
            return Vec::new();
        };

        let mut effects = Vec::with_capacity(3);
        if self.timer_armed {
            effects.push(Effect::CancelTimer);
        }
        if self.config.auto_play {
            if let Some(url) = item.audio() {
                effects.push(Effect::PlayAudio {
                    url: url.to_owned(),
                    item_id: item.id.clone(),
                });
            }
        }
        debug!(
            kind = message.kind.as_str(),
            item_id = %item.id,
            from = ?self.window.phase,
            "showing item"
        );
        self.window = DisplayWindow {
            phase: Phase::Showing,
            item: Some(item),
        };
        effects.push(self.arm(TimerKind::Hide, self.config.display_duration));
        effects
    }

    /// Feed a timer firing.
    pub fn on_timer(&mut self, generation: u64, kind: TimerKind) -> Vec<Effect> {
        if !self.timer_armed || generation != self.generation {
            trace!(generation, current = self.generation, ?kind, "stale timer ignored");
            return Vec::new();
        }
        self.timer_armed = false;
        match (kind, self.window.phase) {
            (TimerKind::Hide, Phase::Showing) => {
                self.window.phase = Phase::Hiding;
                vec![self.arm(TimerKind::Clear, self.config.exit_delay)]
            }
            (TimerKind::Clear, Phase::Hiding) => {
                self.window = DisplayWindow::default();
                Vec::new()
            }
            (kind, phase) => {
                debug!(?kind, ?phase, "timer does not match phase");
                Vec::new()
            }
        }
    }

    /// Cancel any outstanding timer and go idle.
    pub fn teardown(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.window = DisplayWindow::default();
        if std::mem::take(&mut self.timer_armed) {
            vec![Effect::CancelTimer]
        } else {
            Vec::new()
        }
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) -> Effect {
        self.generation += 1;
        self.timer_armed = true;
        Effect::ArmTimer {
            generation: self.generation,
            kind,
            after,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
