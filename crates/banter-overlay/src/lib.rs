//! # banter-overlay
//!
//! The broadcast overlay:
//!
//! - **Presentation**: [`presentation::PresentationMachine`], the pure
//!   Idle → Showing → Hiding state machine, driven by
//!   [`controller::OverlayController`]
//! - **Audio**: [`audio::AudioCoordinator`], the single-slot player with a
//!   generation guard against late media callbacks
//! - **Media**: [`source::resolve_source`] and the [`backend::MediaBackend`]
//!   seam, with the headless [`backend::ClockBackend`]
//! - **Hub**: [`hub::OverlayHub`], one overlay per owner shared by all
//!   capture clients
//! - **Surface**: [`surface::router`], the axum capture surface

#![deny(unsafe_code)]

pub mod audio;
pub mod backend;
pub mod controller;
pub mod hub;
pub mod presentation;
pub mod source;
pub mod surface;

pub use audio::{AudioCoordinator, AudioEvent, AudioSnapshot, PlaybackSession};
pub use backend::{ClockBackend, MediaBackend, MediaCommand, MediaEvent, MediaHandle};
pub use controller::OverlayController;
pub use hub::{Overlay, OverlayClient, OverlayHub};
pub use presentation::{DisplayWindow, Effect, Phase, PresentationConfig, PresentationMachine, TimerKind};
pub use source::{MediaSource, resolve_source};
pub use surface::{HealthResponse, RenderFrame, router, serve};
