//! System utilities
//!
//! Hardware probing used to choose inference defaults.

pub mod gpu;
