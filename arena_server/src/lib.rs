//! `arena_server`
//!
//! Authoritative side of the arena:
//! - Fixed timestep simulation of movement, bullets and bombs
//! - Validates fire, plant and defuse requests
//! - Sends per-client snapshots acknowledging processed input
//!
//! Networking model:
//! - TCP with length-prefixed JSON frames for everything

pub mod server;
pub mod world;

pub use server::GameServer;
pub use world::{Outgoing, ServerWorld};
