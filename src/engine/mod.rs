//! Per-surface navigation engine and render-model construction.

pub mod navigation;
pub mod render;
