//! HTTP surface
//!
//! Thin warp layer over [`crate::simulation::session::SessionRegistry`]:
//! session lifecycle, telegram polling, control commands and one-shot
//! scenario runs.

pub mod rest;
