//! # Bonder Node Test Suite
//!
//! Cross-subsystem tests that run the real transfer state store, bus and
//! store bridges, with chains, signer and attestation service replaced by
//! the doubles in [`fixtures`].
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs      # Node harness, chain doubles, event builders
//! ├── integration/     # End-to-end flows through the store
//! └── properties/      # Ledger-wide invariants under random schedules
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bn-tests
//! cargo test -p bn-tests integration::
//! cargo test -p bn-tests properties::
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
pub mod properties;
