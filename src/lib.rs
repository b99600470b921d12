//! calltrace - low-overhead call instrumentation for foreign function-call APIs
//!
//! Sits in front of a fixed API surface whose operations are identified by
//! small integer ids. Every call site runs an enter/exit pair that counts
//! the call, adds the wall-clock time spent in it, and optionally notifies
//! user observers with the operation's name.

pub mod catalog;
pub mod cli;
pub mod clock;
pub mod context;
pub mod duration;
pub mod error;
pub mod host;
pub mod observer;
pub mod protocol;
pub mod report;
