// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for SafeVault integration tests.
//!
//! Provides fault-injecting storage and a session harness for fast,
//! deterministic tests that never touch a real user vault.
//!
//! # Components
//!
//! - [`FailingBackend`] - In-memory backend whose reads and writes can be made to fail
//! - [`TestHarness`] - A session wired to temp storage with fast KDF parameters

pub mod failing_backend;
pub mod fixtures;
pub mod harness;

pub use failing_backend::FailingBackend;
pub use fixtures::{bank_credential, fast_kdf, fast_session_config, passphrase};
pub use harness::{HarnessBackend, TestHarness};
