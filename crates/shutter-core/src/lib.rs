//! Core types and trait definitions for the Shutter image intake service.
//!
//! This crate is deliberately free of HTTP and file-format dependencies.
//! Storage backends implement [`ledger::SubmissionLedger`]; transports
//! implement the collaborator traits in [`intake`] and drive an
//! [`intake::IntakeHandler`].

pub mod admission;
pub mod blocklist;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod submission;

pub use error::{Error, Result};
