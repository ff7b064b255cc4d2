//! Service Layer
//!
//! The orchestrator that sequences config store and cache operations, plus
//! the per-project locks it holds while writing.

mod chunk_service;
mod locks;

pub use chunk_service::*;
pub use locks::*;
