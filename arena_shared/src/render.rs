//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend.
//! The renderer consumes one pose per live entity each frame and never
//! mutates entity state.

use crate::{entity::EntityKey, math::Vec3};

/// Where to draw one entity this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityPose {
    pub key: EntityKey,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

/// A minimal rendering API.
pub trait RenderSink {
    fn begin_frame(&mut self) {}
    fn draw(&mut self, pose: &EntityPose);
    fn end_frame(&mut self) {}
}

/// A no-op renderer useful for headless runs.
#[derive(Default)]
pub struct NullRenderer;

impl RenderSink for NullRenderer {
    fn draw(&mut self, _pose: &EntityPose) {}
}

/// Collects poses; handy for tests and debug overlays.
#[derive(Default, Debug)]
pub struct PoseCollector {
    pub poses: Vec<EntityPose>,
}

impl RenderSink for PoseCollector {
    fn begin_frame(&mut self) {
        self.poses.clear();
    }

    fn draw(&mut self, pose: &EntityPose) {
        self.poses.push(*pose);
    }
}
