//! # banter-api
//!
//! HTTP collaborators of the live client: the owner's item list, manual
//! play-by-id, and per-owner overlay preferences. [`BanterApi`] is the seam;
//! [`HttpApi`] talks to the real server with `reqwest`. Enable the `mock`
//! feature for `MockBanterApi` in downstream tests.

#![deny(unsafe_code)]

pub mod client;
pub mod types;

pub use client::{BanterApi, HttpApi};
#[cfg(any(test, feature = "mock"))]
pub use client::MockBanterApi;
pub use types::OverlayPreferences;
