//! # banter-core
//!
//! Foundation types shared by every banter crate:
//!
//! - **Wire frames**: [`messages::InboundMessage`] / [`messages::OutboundMessage`]
//!   and the [`messages::DisplayableItem`] payload
//! - **Branded IDs**: `ItemId`, `OwnerId`, `ClientId` newtypes
//! - **Close codes**: WebSocket close-code constants and classification
//! - **Backoff**: exponential delay math used by reconnection
//! - **Errors**: `BanterError` hierarchy via `thiserror`
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod close;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod retry;

pub use errors::{ApiError, AudioError, AudioFailureKind, BanterError, ConnectionError};
pub use ids::{ClientId, ItemId, OwnerId};
pub use messages::{DisplayableItem, InboundMessage, MessageKind, OutboundMessage};
