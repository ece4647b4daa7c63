//! Small concurrency helpers shared by operations and traversals.

pub mod atomics;
pub mod channels;
mod errors;

pub use errors::ErrorCollector;
