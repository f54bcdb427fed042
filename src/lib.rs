//! HexaSLM Library
//!
//! Core library for the HexaSLM terminal chat: local GGUF inference,
//! model resolution and the interactive session loop.

pub mod chat;
pub mod inference;
pub mod storage;
pub mod system;
pub mod types;
