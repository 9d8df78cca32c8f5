//! Core trait abstractions for the notice pipeline.
//!
//! These traits define the interfaces that applications implement
//! to provide storage and oracle capabilities.

pub mod oracle;
pub mod store;
