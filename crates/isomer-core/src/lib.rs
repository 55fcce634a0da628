//! Isomer Core
//!
//! Shared utilities for the Isomer renderer workspace.

pub mod geometry;
pub mod logging;
