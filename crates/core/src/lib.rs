//! # Wannabe Core
//!
//! Domain types, traits, and error definitions for the Wannabe prompt
//! composer. This crate has **zero framework dependencies**; it defines the
//! document model that the prompt, provider and CLI crates build against.
//!
//! ## Design Philosophy
//!
//! The remote inference server is reached only through traits defined here
//! ([`TokenOracle`], [`TextGenerator`]). Implementations live in
//! `wannabe-providers`; tests plug in stubs.

pub mod document;
pub mod error;
pub mod oracle;
pub mod project;
pub mod task;

// Re-export key types at crate root for ergonomics
pub use document::{BlockOrder, DialogueLevel, DocumentState, Metadata, Mode, Rating};
pub use error::{Error, Result};
pub use oracle::{GenerationRequest, TextGenerator, TokenOracle};
pub use project::ProjectFile;
pub use task::TaskType;
