//! Inference backend implementations
//!
//! Production inference uses the pure-Rust Tract backend (feature `tract`,
//! on by default). `test_utils` provides a deterministic mock backend for
//! unit and integration tests.

#[cfg(feature = "tract")]
pub mod tract;
#[cfg(feature = "tract")]
pub use tract::TractSegmentationBackend;

pub mod test_utils;
