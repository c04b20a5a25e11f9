//! Presentation of flow progress.

pub mod observer;
pub mod plain;
pub mod ticker;

pub use observer::{FlowObserver, NoopObserver, TokenSummary};
pub use plain::PlainObserver;

#[cfg(test)]
pub use observer::testing;
