//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software: the joint topology shared by
//! every executable, the messages exchanged between them, and the networking layer carrying those
//! messages.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Joint identification and robot topology
pub mod joint;

/// Messages exchanged between executables
pub mod msg;

/// Network module
pub mod net;
