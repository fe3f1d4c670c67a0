//! Inference server clients for Wannabe.
//!
//! Clients implement the `wannabe_core` oracle traits so the prompt layer
//! never depends on a concrete server.

pub mod kobold;

pub use kobold::KoboldClient;
