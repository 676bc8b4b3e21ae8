// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the vault engine and its pluggable collaborators.
//!
//! Traits use `#[async_trait]` so backends can be held as trait objects.

pub mod backend;

pub use backend::PersistenceBackend;
