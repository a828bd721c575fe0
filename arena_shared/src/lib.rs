//! `arena_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Deterministic where it matters: motion and bullet flight are computed
//!   identically on every peer.
//! - One owner of entity state (the [`store::EntityStore`]); everything else
//!   holds ids.
//! - Pure decode, explicit dispatch: the codec never touches the store.
//! - Traits at the collaborator seams (render, effects, motion).
//! - No `unsafe`.

pub mod config;
pub mod effects;
pub mod entity;
pub mod error;
pub mod input;
pub mod math;
pub mod net;
pub mod physics;
pub mod render;
pub mod store;
pub mod weapon;
