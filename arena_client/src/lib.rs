//! `arena_client`
//!
//! Client-side systems:
//! - Input sampling and edge detection
//! - Prediction and reconciliation for the local player
//! - Interpolation for remote entity states
//! - Weapon fire, hit resolution and the bomb lifecycle
//! - Sans-IO session dispatch and the socket-level connection manager

pub mod client;
pub mod input;
pub mod interp;
pub mod prediction;
pub mod session;
pub mod weapon;

pub use client::{ConnectionStatus, GameClient};
pub use session::ClientSession;
