// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The vault session: unlock state machine, decrypted record cache, and the
//! single-writer mutation path.
//!
//! Decrypted state lives only in [`SessionState::Unlocked`]. Every mutation
//! re-encrypts the whole record set under a fresh nonce and is durable before
//! it returns. Mutations are serialized by an async writer gate; readers
//! take a cheap `Arc` snapshot of the record set and never block on a write.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use safevault_config::model::VaultConfig;
use safevault_core::{
    Attachment, AttachmentId, CredentialRecord, CredentialUpdate, ErrorKind, NewAttachment,
    NewCredential, RecordId, VaultError,
};
use secrecy::{ExposeSecret, SecretString};
use strum::Display;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::container::VaultContainer;
use crate::kdf::{self, KdfParams, VaultKey, SALT_LEN};
use crate::store::VaultStore;

/// Session tuning, usually built from the `[vault]` config section.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Parameters used when creating a new vault.
    pub kdf: KdfParams,
    /// Inactivity threshold honored by [`VaultSession::lock_if_idle`].
    pub idle_timeout: Duration,
    /// Upper bound on one unlock attempt. `None` waits indefinitely.
    pub unlock_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&VaultConfig::default())
    }
}

impl SessionConfig {
    pub fn from_config(config: &VaultConfig) -> Self {
        Self {
            kdf: KdfParams::from_config(config),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            unlock_timeout: config.unlock_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Why the last unlock attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    AuthenticationFailed,
    CorruptData,
    StorageFailure,
    Timeout,
    Internal,
}

impl FailureReason {
    fn from_error(err: &VaultError) -> Self {
        match err.kind() {
            ErrorKind::AuthenticationFailed => Self::AuthenticationFailed,
            ErrorKind::CorruptData => Self::CorruptData,
            ErrorKind::StorageFailure => Self::StorageFailure,
            ErrorKind::Timeout => Self::Timeout,
            _ => Self::Internal,
        }
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Locked,
    /// The store holds no vault; `create_vault` is the way forward.
    Uninitialized,
    Unlocking,
    Unlocked,
    /// Locked after a failed unlock attempt.
    LockedWithError(FailureReason),
}

impl SessionStatus {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, Self::Unlocked)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => f.write_str("locked"),
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Unlocking => f.write_str("unlocking"),
            Self::Unlocked => f.write_str("unlocked"),
            Self::LockedWithError(reason) => write!(f, "locked (last unlock failed: {reason})"),
        }
    }
}

/// Result of a successful `unlock` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked { record_count: usize },
    /// No vault exists yet; the session is now `Uninitialized`.
    Uninitialized,
}

/// How an imported backup is applied.
#[derive(Debug, Clone, Copy)]
pub enum ImportMode<'a> {
    /// Atomically replace the stored container and lock the session.
    Replace,
    /// Decrypt the backup with its own passphrase and add records whose ids
    /// are not already present. Needs an unlocked session.
    Merge(&'a SecretString),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Replaced,
    Merged { added: usize, skipped: usize },
}

/// File name suggested for an exported backup taken on `date`.
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("safevault-backup-{}.svault", date.format("%Y-%m-%d"))
}

#[derive(Clone)]
struct OpenVault {
    key: Arc<VaultKey>,
    salt: [u8; SALT_LEN],
    kdf: KdfParams,
    records: Arc<Vec<CredentialRecord>>,
}

enum SessionState {
    Locked,
    Uninitialized,
    Unlocking,
    Unlocked(OpenVault),
    LockedWithError(FailureReason),
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        match self {
            Self::Locked => SessionStatus::Locked,
            Self::Uninitialized => SessionStatus::Uninitialized,
            Self::Unlocking => SessionStatus::Unlocking,
            Self::Unlocked(_) => SessionStatus::Unlocked,
            Self::LockedWithError(reason) => SessionStatus::LockedWithError(*reason),
        }
    }
}

/// State plus a counter bumped on every lock/unlock transition. A write
/// started under one epoch only commits to memory if the epoch is unchanged.
struct StateCell {
    state: SessionState,
    epoch: u64,
}

enum Change {
    Records(Vec<CredentialRecord>),
    Rekey { key: VaultKey, kdf: KdfParams },
    Open(OpenVault),
    Lock,
}

struct Commit {
    epoch: u64,
    change: Change,
}

enum PendingWrite {
    Container(VaultContainer),
    Raw(Vec<u8>),
}

struct Shared {
    store: VaultStore,
    config: SessionConfig,
    cell: RwLock<StateCell>,
    writer: Arc<AsyncMutex<()>>,
    last_activity: Mutex<Instant>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, StateCell> {
        self.cell.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StateCell> {
        self.cell.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the state unconditionally and return the new epoch.
    fn transition(&self, next: SessionState) -> u64 {
        let (previous, epoch) = {
            let mut cell = self.write();
            cell.epoch += 1;
            (std::mem::replace(&mut cell.state, next), cell.epoch)
        };
        // Dropping an unlocked state wipes its key and records.
        drop(previous);
        epoch
    }

    /// Replace the state only if no other transition happened since `epoch`.
    fn transition_from(&self, epoch: u64, next: SessionState) -> bool {
        let previous = {
            let mut cell = self.write();
            if cell.epoch != epoch {
                return false;
            }
            cell.epoch += 1;
            std::mem::replace(&mut cell.state, next)
        };
        drop(previous);
        true
    }

    fn apply(&self, commit: Commit) -> bool {
        let mut cell = self.write();
        match commit.change {
            Change::Lock => {
                cell.epoch += 1;
                cell.state = SessionState::Locked;
                true
            }
            _ if cell.epoch != commit.epoch => false,
            Change::Open(vault) => {
                cell.epoch += 1;
                cell.state = SessionState::Unlocked(vault);
                true
            }
            Change::Records(records) => match &mut cell.state {
                SessionState::Unlocked(vault) => {
                    vault.records = Arc::new(records);
                    true
                }
                _ => false,
            },
            Change::Rekey { key, kdf } => match &mut cell.state {
                SessionState::Unlocked(vault) => {
                    vault.key = Arc::new(key);
                    vault.kdf = kdf;
                    true
                }
                _ => false,
            },
        }
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }
}

/// Resets an in-progress unlock to `Locked` if its future is dropped.
struct UnlockReset<'a> {
    shared: &'a Shared,
    epoch: u64,
    armed: bool,
}

impl Drop for UnlockReset<'_> {
    fn drop(&mut self) {
        if self.armed && self.shared.transition_from(self.epoch, SessionState::Locked) {
            info!("unlock abandoned; session locked");
        }
    }
}

/// A handle to one vault. Cloning shares the same session.
#[derive(Clone)]
pub struct VaultSession {
    shared: Arc<Shared>,
}

impl fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSession")
            .field("store", &self.shared.store)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl VaultSession {
    pub fn new(store: VaultStore, config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                config,
                cell: RwLock::new(StateCell {
                    state: SessionState::Locked,
                    epoch: 0,
                }),
                writer: Arc::new(AsyncMutex::new(())),
                last_activity: Mutex::new(Instant::now()),
            }),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.read().state.status()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn store(&self) -> &VaultStore {
        &self.shared.store
    }

    // --- lifecycle -------------------------------------------------------

    /// Unlock with `passphrase`. See [`unlock_cancellable`](Self::unlock_cancellable).
    pub async fn unlock(&self, passphrase: &SecretString) -> Result<UnlockOutcome, VaultError> {
        self.unlock_cancellable(passphrase, &CancellationToken::new())
            .await
    }

    /// Load the container, derive the key, and decrypt the record set.
    ///
    /// Any previously unlocked state is discarded first, so a failed attempt
    /// always leaves the session locked. Failures move the session to
    /// `LockedWithError`; cancellation (via `cancel` or by dropping the
    /// future) leaves it `Locked`. Nothing is written to the store.
    pub async fn unlock_cancellable(
        &self,
        passphrase: &SecretString,
        cancel: &CancellationToken,
    ) -> Result<UnlockOutcome, VaultError> {
        ensure_passphrase(passphrase)?;
        let _gate = self.shared.writer.lock().await;

        let epoch = self.shared.transition(SessionState::Unlocking);
        let mut reset = UnlockReset {
            shared: &self.shared,
            epoch,
            armed: true,
        };
        debug!(slot = self.shared.store.slot(), "unlock attempt started");

        let attempt = bounded(self.shared.config.unlock_timeout, self.open_existing(passphrase));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VaultError::Cancelled),
            result = attempt => result,
        };
        reset.armed = false;

        // A lock() issued while the attempt was running moves the epoch; the
        // attempt then reports cancellation and leaves that state alone.
        match result {
            Ok(Some(vault)) => {
                let record_count = vault.records.len();
                if !self.shared.transition_from(epoch, SessionState::Unlocked(vault)) {
                    info!("unlock superseded by lock");
                    return Err(VaultError::Cancelled);
                }
                self.shared.touch();
                info!(slot = self.shared.store.slot(), records = record_count, "vault unlocked");
                Ok(UnlockOutcome::Unlocked { record_count })
            }
            Ok(None) => {
                if !self.shared.transition_from(epoch, SessionState::Uninitialized) {
                    info!("unlock superseded by lock");
                    return Err(VaultError::Cancelled);
                }
                info!(slot = self.shared.store.slot(), "no vault in slot yet");
                Ok(UnlockOutcome::Uninitialized)
            }
            Err(VaultError::Cancelled) => {
                self.shared.transition_from(epoch, SessionState::Locked);
                info!("unlock cancelled");
                Err(VaultError::Cancelled)
            }
            Err(err) => {
                let reason = FailureReason::from_error(&err);
                self.shared
                    .transition_from(epoch, SessionState::LockedWithError(reason));
                warn!(slot = self.shared.store.slot(), reason = %reason, "unlock failed");
                Err(err)
            }
        }
    }

    /// Create a new, empty vault and leave the session unlocked.
    ///
    /// Fails with `InvalidInput` if the store already holds a container.
    pub async fn create_vault(&self, passphrase: &SecretString) -> Result<(), VaultError> {
        ensure_passphrase(passphrase)?;
        let gate = Arc::clone(&self.shared.writer).lock_owned().await;

        if self.shared.store.load_raw().await?.is_some() {
            return Err(VaultError::InvalidInput(format!(
                "a vault already exists in slot `{}`",
                self.shared.store.slot()
            )));
        }

        let epoch = self.shared.read().epoch;
        let kdf = self.shared.config.kdf;
        kdf.validate()?;
        let salt = kdf::generate_salt()?;
        let key = derive_blocking(passphrase, salt, kdf).await?;
        let container = VaultContainer::seal_records(&key, salt, kdf, &[])?;
        let vault = OpenVault {
            key: Arc::new(key),
            salt,
            kdf,
            records: Arc::new(Vec::new()),
        };

        self.persist(
            gate,
            PendingWrite::Container(container),
            Commit {
                epoch,
                change: Change::Open(vault),
            },
        )
        .await?;
        self.shared.touch();
        info!(slot = self.shared.store.slot(), kdf = %kdf, "vault created");
        Ok(())
    }

    /// Wipe the key and record cache.
    pub fn lock(&self) {
        self.shared.transition(SessionState::Locked);
        info!(slot = self.shared.store.slot(), "vault locked");
    }

    /// Lock if unlocked and idle for at least the configured threshold.
    /// Returns whether the session was locked by this call.
    pub fn lock_if_idle(&self) -> bool {
        if !self.status().is_unlocked() || self.idle_for() < self.shared.config.idle_timeout {
            return false;
        }
        info!(idle_secs = self.idle_for().as_secs(), "idle timeout reached");
        self.lock();
        true
    }

    pub fn idle_timeout(&self) -> Duration {
        self.shared.config.idle_timeout
    }

    /// Time since the last unlock, read, or mutation.
    pub fn idle_for(&self) -> Duration {
        self.shared
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    // --- reads -----------------------------------------------------------

    /// All records, newest first.
    pub fn list_records(&self) -> Result<Vec<CredentialRecord>, VaultError> {
        self.with_records(|records| records.to_vec())
    }

    pub fn get_record(&self, id: RecordId) -> Result<CredentialRecord, VaultError> {
        self.with_records(|records| records.iter().find(|r| r.id == id).cloned())?
            .ok_or_else(|| VaultError::NotFound(format!("record {id}")))
    }

    /// Records whose title, username, or email contain `query`, ignoring case.
    pub fn search(&self, query: &str) -> Result<Vec<CredentialRecord>, VaultError> {
        self.with_records(|records| {
            records
                .iter()
                .filter(|r| r.matches(query))
                .cloned()
                .collect()
        })
    }

    pub fn record_count(&self) -> Result<usize, VaultError> {
        self.with_records(|records| records.len())
    }

    pub fn get_attachment(
        &self,
        record_id: RecordId,
        attachment_id: AttachmentId,
    ) -> Result<Attachment, VaultError> {
        let record = self.get_record(record_id)?;
        record
            .attachment(attachment_id)
            .cloned()
            .ok_or_else(|| {
                VaultError::NotFound(format!("attachment {attachment_id} in record {record_id}"))
            })
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&[CredentialRecord]) -> T,
    ) -> Result<T, VaultError> {
        let records = match &self.shared.read().state {
            SessionState::Unlocked(vault) => Arc::clone(&vault.records),
            _ => return Err(VaultError::Locked),
        };
        self.shared.touch();
        Ok(f(&records))
    }

    // --- mutations -------------------------------------------------------

    /// Add a record at the front of the list and persist.
    pub async fn add_record(&self, input: NewCredential) -> Result<RecordId, VaultError> {
        let id = self
            .mutate(move |records| {
                let mut id = RecordId::new_random();
                while records.iter().any(|r| r.id == id) {
                    id = RecordId::new_random();
                }
                records.insert(0, input.into_record(id, Utc::now())?);
                Ok(id)
            })
            .await?;
        debug!(record_id = %id, "record added");
        Ok(id)
    }

    pub async fn update_record(
        &self,
        id: RecordId,
        mut update: CredentialUpdate,
    ) -> Result<(), VaultError> {
        if update.is_empty() {
            self.get_record(id)?;
            return Ok(());
        }
        self.mutate(move |records| update.apply_to(find_mut(records, id)?, Utc::now()))
            .await?;
        debug!(record_id = %id, "record updated");
        Ok(())
    }

    pub async fn delete_record(&self, id: RecordId) -> Result<(), VaultError> {
        let remaining = self
            .mutate(move |records| {
                let index = records
                    .iter()
                    .position(|r| r.id == id)
                    .ok_or_else(|| VaultError::NotFound(format!("record {id}")))?;
                records.remove(index);
                Ok(records.len())
            })
            .await?;
        debug!(record_id = %id, remaining, "record deleted");
        Ok(())
    }

    pub async fn add_attachment(
        &self,
        record_id: RecordId,
        attachment: NewAttachment,
    ) -> Result<AttachmentId, VaultError> {
        let size = attachment.content.len();
        let id = self
            .mutate(move |records| {
                find_mut(records, record_id)?.push_attachment(attachment, Utc::now())
            })
            .await?;
        debug!(record_id = %record_id, attachment_id = %id, bytes = size, "attachment added");
        Ok(id)
    }

    pub async fn remove_attachment(
        &self,
        record_id: RecordId,
        attachment_id: AttachmentId,
    ) -> Result<(), VaultError> {
        self.mutate(move |records| {
            find_mut(records, record_id)?.remove_attachment(attachment_id, Utc::now())
        })
        .await?;
        debug!(record_id = %record_id, attachment_id = %attachment_id, "attachment removed");
        Ok(())
    }

    /// Re-derive the key from `new_passphrase` (same salt and parameters)
    /// and re-seal the vault under it.
    pub async fn change_passphrase(&self, new_passphrase: &SecretString) -> Result<(), VaultError> {
        ensure_passphrase(new_passphrase)?;
        let gate = Arc::clone(&self.shared.writer).lock_owned().await;
        let (epoch, vault) = self.snapshot()?;

        let key = derive_blocking(new_passphrase, vault.salt, vault.kdf).await?;
        self.ensure_epoch(epoch)?;
        let container = VaultContainer::seal_records(&key, vault.salt, vault.kdf, &vault.records)?;
        self.persist(
            gate,
            PendingWrite::Container(container),
            Commit {
                epoch,
                change: Change::Rekey { key, kdf: vault.kdf },
            },
        )
        .await?;
        self.shared.touch();
        info!(slot = self.shared.store.slot(), "vault passphrase changed");
        Ok(())
    }

    /// Move the vault to stronger KDF parameters, keeping the salt.
    ///
    /// `passphrase` must be the current one; it is verified against the
    /// stored container before anything is re-sealed.
    pub async fn upgrade_kdf(
        &self,
        passphrase: &SecretString,
        params: KdfParams,
    ) -> Result<(), VaultError> {
        ensure_passphrase(passphrase)?;
        params.validate()?;
        let gate = Arc::clone(&self.shared.writer).lock_owned().await;
        let (epoch, vault) = self.snapshot()?;
        if !params.is_at_least(&vault.kdf) {
            return Err(VaultError::InvalidInput(format!(
                "{params} is weaker than the current {}",
                vault.kdf
            )));
        }

        let stored = self
            .shared
            .store
            .load()
            .await?
            .ok_or(VaultError::VaultAbsent)?;
        let current = derive_blocking(passphrase, vault.salt, vault.kdf).await?;
        // Decrypting proves the passphrase; the records themselves are not needed.
        drop(stored.open_records(&current)?);
        drop(current);

        let key = derive_blocking(passphrase, vault.salt, params).await?;
        self.ensure_epoch(epoch)?;
        let container = VaultContainer::seal_records(&key, vault.salt, params, &vault.records)?;
        self.persist(
            gate,
            PendingWrite::Container(container),
            Commit {
                epoch,
                change: Change::Rekey { key, kdf: params },
            },
        )
        .await?;
        self.shared.touch();
        info!(from = %vault.kdf, to = %params, "vault KDF parameters upgraded");
        Ok(())
    }

    // --- backup ----------------------------------------------------------

    /// The stored container bytes, still encrypted. Works in any state.
    pub async fn export_vault_blob(&self) -> Result<Vec<u8>, VaultError> {
        let bytes = self
            .shared
            .store
            .load_raw()
            .await?
            .ok_or(VaultError::VaultAbsent)?;
        info!(slot = self.shared.store.slot(), bytes = bytes.len(), "vault exported");
        Ok(bytes)
    }

    /// Apply a backup produced by [`export_vault_blob`](Self::export_vault_blob).
    ///
    /// The bytes are structurally validated before anything is written.
    pub async fn import_vault_blob(
        &self,
        bytes: &[u8],
        mode: ImportMode<'_>,
    ) -> Result<ImportOutcome, VaultError> {
        let incoming = VaultContainer::from_bytes(bytes)?;
        match mode {
            ImportMode::Replace => {
                let gate = Arc::clone(&self.shared.writer).lock_owned().await;
                let epoch = self.shared.read().epoch;
                self.persist(
                    gate,
                    PendingWrite::Raw(bytes.to_vec()),
                    Commit {
                        epoch,
                        change: Change::Lock,
                    },
                )
                .await?;
                info!(slot = self.shared.store.slot(), "vault replaced from backup; session locked");
                Ok(ImportOutcome::Replaced)
            }
            ImportMode::Merge(passphrase) => {
                ensure_passphrase(passphrase)?;
                let gate = Arc::clone(&self.shared.writer).lock_owned().await;
                let (epoch, vault) = self.snapshot()?;

                let key = derive_blocking(passphrase, incoming.salt, incoming.kdf).await?;
                let imported = incoming.open_records(&key)?;
                drop(key);
                self.ensure_epoch(epoch)?;

                // Imported records go first, in backup order, like new ones.
                let (fresh, present): (Vec<_>, Vec<_>) = imported
                    .into_iter()
                    .partition(|record| !vault.records.iter().any(|r| r.id == record.id));
                let (added, skipped) = (fresh.len(), present.len());
                let mut records = fresh;
                records.extend(vault.records.iter().cloned());

                if added > 0 {
                    let container =
                        VaultContainer::seal_records(&vault.key, vault.salt, vault.kdf, &records)?;
                    self.persist(
                        gate,
                        PendingWrite::Container(container),
                        Commit {
                            epoch,
                            change: Change::Records(records),
                        },
                    )
                    .await?;
                }
                self.shared.touch();
                info!(added, skipped, "backup merged into vault");
                Ok(ImportOutcome::Merged { added, skipped })
            }
        }
    }

    // --- internals -------------------------------------------------------

    async fn open_existing(
        &self,
        passphrase: &SecretString,
    ) -> Result<Option<OpenVault>, VaultError> {
        let Some(container) = self.shared.store.load().await? else {
            return Ok(None);
        };
        let key = derive_blocking(passphrase, container.salt, container.kdf).await?;
        let records = container.open_records(&key)?;
        Ok(Some(OpenVault {
            key: Arc::new(key),
            salt: container.salt,
            kdf: container.kdf,
            records: Arc::new(records),
        }))
    }

    fn snapshot(&self) -> Result<(u64, OpenVault), VaultError> {
        let cell = self.shared.read();
        match &cell.state {
            SessionState::Unlocked(vault) => Ok((cell.epoch, vault.clone())),
            _ => Err(VaultError::Locked),
        }
    }

    fn ensure_epoch(&self, epoch: u64) -> Result<(), VaultError> {
        if self.shared.read().epoch == epoch {
            Ok(())
        } else {
            Err(VaultError::Locked)
        }
    }

    /// Apply `f` to a copy of the record set, seal it, and persist.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<CredentialRecord>) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let gate = Arc::clone(&self.shared.writer).lock_owned().await;
        let (epoch, vault) = self.snapshot()?;

        let mut records = vault.records.as_ref().clone();
        let value = f(&mut records)?;
        let container = VaultContainer::seal_records(&vault.key, vault.salt, vault.kdf, &records)?;

        self.persist(
            gate,
            PendingWrite::Container(container),
            Commit {
                epoch,
                change: Change::Records(records),
            },
        )
        .await?;
        self.shared.touch();
        Ok(value)
    }

    /// Write and commit on a spawned task that owns the writer gate.
    ///
    /// Once this is called the write runs to completion even if the caller's
    /// future is dropped. On failure nothing in memory changes.
    async fn persist(
        &self,
        gate: OwnedMutexGuard<()>,
        write: PendingWrite,
        commit: Commit,
    ) -> Result<(), VaultError> {
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let _gate = gate;
            let written = match write {
                PendingWrite::Container(container) => shared.store.save(&container).await,
                PendingWrite::Raw(bytes) => shared.store.save_raw(&bytes).await.map(|_| ()),
            };
            if let Err(err) = written {
                warn!(
                    slot = shared.store.slot(),
                    error = %err,
                    "vault write failed; previous container and cache kept"
                );
                return Err(err);
            }
            if !shared.apply(commit) {
                debug!("session changed during write; in-memory commit skipped");
            }
            Ok(())
        });
        task.await
            .map_err(|e| VaultError::Internal(format!("vault write task failed: {e}")))?
    }
}

fn ensure_passphrase(passphrase: &SecretString) -> Result<(), VaultError> {
    if passphrase.expose_secret().is_empty() {
        return Err(VaultError::InvalidInput(
            "passphrase must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn find_mut(
    records: &mut [CredentialRecord],
    id: RecordId,
) -> Result<&mut CredentialRecord, VaultError> {
    records
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| VaultError::NotFound(format!("record {id}")))
}

/// Run the KDF on the blocking pool.
async fn derive_blocking(
    passphrase: &SecretString,
    salt: [u8; SALT_LEN],
    params: KdfParams,
) -> Result<VaultKey, VaultError> {
    let passphrase = Zeroizing::new(passphrase.expose_secret().as_bytes().to_vec());
    tokio::task::spawn_blocking(move || kdf::derive_key(&passphrase, &salt, &params))
        .await
        .map_err(|e| VaultError::Internal(format!("key derivation task failed: {e}")))?
}

async fn bounded<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, VaultError>>,
) -> Result<T, VaultError> {
    match limit {
        Some(duration) => tokio::time::timeout(duration, fut)
            .await
            .map_err(|_| VaultError::Timeout { duration })?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use safevault_core::PersistenceBackend;
    use safevault_storage::MemoryBackend;
    use tracing_test::traced_test;

    use super::*;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            kdf: KdfParams::argon2id(8, 1, 1),
            idle_timeout: Duration::from_secs(300),
            unlock_timeout: None,
        }
    }

    fn session_with(config: SessionConfig) -> VaultSession {
        VaultSession::new(VaultStore::new(Arc::new(MemoryBackend::new()), "vault"), config)
    }

    fn session() -> VaultSession {
        session_with(fast_config())
    }

    fn pass(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    async fn created() -> VaultSession {
        let session = session();
        session.create_vault(&pass("hunter2")).await.unwrap();
        session
    }

    #[tokio::test]
    async fn starts_locked_and_reads_are_refused() {
        let session = session();
        assert_eq!(session.status(), SessionStatus::Locked);
        assert!(matches!(session.list_records(), Err(VaultError::Locked)));
        assert!(matches!(
            session.add_record(NewCredential::new("x")).await,
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn unlock_of_empty_store_is_uninitialized() {
        let session = session();
        let outcome = session.unlock(&pass("hunter2")).await.unwrap();
        assert_eq!(outcome, UnlockOutcome::Uninitialized);
        assert_eq!(session.status(), SessionStatus::Uninitialized);
    }

    #[tokio::test]
    async fn create_vault_unlocks_with_no_records() {
        let session = created().await;
        assert!(session.status().is_unlocked());
        assert_eq!(session.record_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn create_vault_twice_is_invalid_input() {
        let session = created().await;
        let err = session.create_vault(&pass("other")).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn empty_passphrase_is_rejected_without_state_change() {
        let session = session();
        let err = session.unlock(&pass("")).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
        assert_eq!(session.status(), SessionStatus::Locked);
        assert!(session.create_vault(&pass("")).await.is_err());
    }

    #[tokio::test]
    async fn records_survive_lock_and_unlock() {
        let session = created().await;
        let id = session
            .add_record(NewCredential::new("Bank").username("alice").password("p@ss"))
            .await
            .unwrap();
        session.lock();
        assert_eq!(session.status(), SessionStatus::Locked);
        assert!(matches!(session.get_record(id), Err(VaultError::Locked)));

        let outcome = session.unlock(&pass("hunter2")).await.unwrap();
        assert_eq!(outcome, UnlockOutcome::Unlocked { record_count: 1 });
        let record = session.get_record(id).unwrap();
        assert_eq!(record.password.as_deref(), Some("p@ss"));
    }

    #[tokio::test]
    async fn new_records_come_first() {
        let session = created().await;
        session.add_record(NewCredential::new("First")).await.unwrap();
        session.add_record(NewCredential::new("Second")).await.unwrap();
        let titles: Vec<String> = session
            .list_records()
            .unwrap()
            .iter()
            .map(|r| r.title.clone())
            .collect();
        assert_eq!(titles, ["Second", "First"]);
    }

    #[tokio::test]
    async fn invalid_input_does_not_write() {
        let session = created().await;
        let before = session.export_vault_blob().await.unwrap();
        let err = session.add_record(NewCredential::new("  ")).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
        assert_eq!(session.export_vault_blob().await.unwrap(), before);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let session = created().await;
        let id = session
            .add_record(NewCredential::new("Mail").email("a@example.com"))
            .await
            .unwrap();
        session
            .update_record(id, CredentialUpdate::default().title("Webmail").clear_email())
            .await
            .unwrap();
        let record = session.get_record(id).unwrap();
        assert_eq!(record.title, "Webmail");
        assert_eq!(record.email, None);
        assert!(record.updated_at >= record.created_at);

        session.delete_record(id).await.unwrap();
        assert!(matches!(session.get_record(id), Err(VaultError::NotFound(_))));
        assert!(matches!(
            session.delete_record(id).await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn attachments_are_added_and_removed() {
        let session = created().await;
        let id = session.add_record(NewCredential::new("Passport")).await.unwrap();
        let attachment_id = session
            .add_attachment(id, NewAttachment::new("scan.png", "", vec![1, 2, 3]))
            .await
            .unwrap();
        let attachment = session.get_attachment(id, attachment_id).unwrap();
        assert_eq!(attachment.content, vec![1, 2, 3]);
        assert_eq!(attachment.mime_type, safevault_core::DEFAULT_MIME_TYPE);

        session.remove_attachment(id, attachment_id).await.unwrap();
        assert!(session.get_record(id).unwrap().attachments.is_empty());
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let session = created().await;
        session
            .add_record(NewCredential::new("Netflix").username("Alice"))
            .await
            .unwrap();
        session.add_record(NewCredential::new("Bank")).await.unwrap();
        assert_eq!(session.search("alice").unwrap().len(), 1);
        assert_eq!(session.search("").unwrap().len(), 2);
        assert!(session.search("nothing").unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_passphrase_locks_with_error() {
        let session = created().await;
        session.lock();
        let err = session.unlock(&pass("wrong")).await.unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
        assert_eq!(
            session.status(),
            SessionStatus::LockedWithError(FailureReason::AuthenticationFailed)
        );
    }

    #[tokio::test]
    async fn failed_reunlock_drops_previous_plaintext() {
        let session = created().await;
        session.add_record(NewCredential::new("Bank")).await.unwrap();
        assert!(session.unlock(&pass("wrong")).await.is_err());
        assert!(matches!(session.list_records(), Err(VaultError::Locked)));
    }

    #[tokio::test]
    async fn corrupt_container_locks_with_corrupt_data() {
        let backend = Arc::new(MemoryBackend::new());
        safevault_core::PersistenceBackend::write_all_atomic(backend.as_ref(), "vault", b"nope")
            .await
            .unwrap();
        let session = VaultSession::new(VaultStore::new(backend, "vault"), fast_config());
        assert!(matches!(
            session.unlock(&pass("hunter2")).await,
            Err(VaultError::CorruptData(_))
        ));
        assert_eq!(
            session.status(),
            SessionStatus::LockedWithError(FailureReason::CorruptData)
        );
    }

    #[tokio::test]
    async fn cancelled_unlock_returns_to_locked() {
        let session = created().await;
        session.lock();
        let token = CancellationToken::new();
        token.cancel();
        let err = session
            .unlock_cancellable(&pass("hunter2"), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Cancelled));
        assert_eq!(session.status(), SessionStatus::Locked);
    }

    /// Reads wait until released, so a test can act mid-unlock.
    struct HeldBackend {
        inner: Arc<MemoryBackend>,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl safevault_core::PersistenceBackend for HeldBackend {
        fn name(&self) -> &str {
            "held"
        }

        async fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.read_all(key).await
        }

        async fn write_all_atomic(&self, key: &str, bytes: &[u8]) -> Result<(), VaultError> {
            self.inner.write_all_atomic(key, bytes).await
        }
    }

    #[tokio::test]
    async fn lock_during_unlock_is_not_overridden() {
        let memory = Arc::new(MemoryBackend::new());
        VaultSession::new(VaultStore::new(memory.clone(), "vault"), fast_config())
            .create_vault(&pass("hunter2"))
            .await
            .unwrap();
        let held = Arc::new(HeldBackend {
            inner: memory,
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let session = VaultSession::new(VaultStore::new(held.clone(), "vault"), fast_config());

        let passphrase = pass("hunter2");
        let (result, ()) = tokio::join!(session.unlock(&passphrase), async {
            held.entered.notified().await;
            assert_eq!(session.status(), SessionStatus::Unlocking);
            session.lock();
            held.release.notify_one();
        });

        assert!(matches!(result, Err(VaultError::Cancelled)));
        assert_eq!(session.status(), SessionStatus::Locked);
        assert!(matches!(session.list_records(), Err(VaultError::Locked)));

        // The next attempt is unaffected.
        session.unlock(&passphrase).await.unwrap();
        assert!(session.status().is_unlocked());
    }

    /// A backend whose reads never complete.
    struct StalledBackend;

    #[async_trait::async_trait]
    impl safevault_core::PersistenceBackend for StalledBackend {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn read_all(&self, _key: &str) -> Result<Option<Vec<u8>>, VaultError> {
            std::future::pending().await
        }

        async fn write_all_atomic(&self, _key: &str, _bytes: &[u8]) -> Result<(), VaultError> {
            std::future::pending().await
        }
    }

    fn stalled(config: SessionConfig) -> VaultSession {
        VaultSession::new(VaultStore::new(Arc::new(StalledBackend), "vault"), config)
    }

    #[tokio::test]
    async fn unlock_timeout_locks_with_timeout() {
        let session = stalled(SessionConfig {
            unlock_timeout: Some(Duration::from_millis(20)),
            ..fast_config()
        });
        let err = session.unlock(&pass("hunter2")).await.unwrap_err();
        assert!(matches!(err, VaultError::Timeout { .. }));
        assert_eq!(
            session.status(),
            SessionStatus::LockedWithError(FailureReason::Timeout)
        );
    }

    #[tokio::test]
    async fn dropped_unlock_future_returns_to_locked() {
        let session = stalled(fast_config());
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), session.unlock(&pass("hunter2"))).await;
        assert!(abandoned.is_err());
        assert_eq!(session.status(), SessionStatus::Locked);
    }

    #[tokio::test]
    async fn token_cancels_a_hung_unlock() {
        let session = stalled(fast_config());
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let err = session
            .unlock_cancellable(&pass("hunter2"), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Cancelled));
        assert_eq!(session.status(), SessionStatus::Locked);
    }

    #[tokio::test]
    async fn lock_if_idle_respects_threshold() {
        let mut config = fast_config();
        config.idle_timeout = Duration::from_millis(20);
        let session = session_with(config);
        session.create_vault(&pass("hunter2")).await.unwrap();
        assert!(!session.lock_if_idle());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(session.lock_if_idle());
        assert_eq!(session.status(), SessionStatus::Locked);
        assert!(!session.lock_if_idle());
    }

    #[tokio::test]
    async fn change_passphrase_keeps_salt_and_records() {
        let session = created().await;
        session.add_record(NewCredential::new("Bank")).await.unwrap();
        let salt_before = session.store().load().await.unwrap().unwrap().salt;

        session.change_passphrase(&pass("correct horse")).await.unwrap();
        session.lock();
        assert!(session.unlock(&pass("hunter2")).await.is_err());
        session.unlock(&pass("correct horse")).await.unwrap();
        assert_eq!(session.record_count().unwrap(), 1);
        assert_eq!(session.store().load().await.unwrap().unwrap().salt, salt_before);
    }

    #[tokio::test]
    async fn upgrade_kdf_rewrites_params_and_keeps_passphrase() {
        let session = created().await;
        session.add_record(NewCredential::new("Bank")).await.unwrap();
        let stronger = KdfParams::argon2id(16, 2, 1);

        let err = session
            .upgrade_kdf(&pass("wrong"), stronger)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));

        session.upgrade_kdf(&pass("hunter2"), stronger).await.unwrap();
        let stored = session.store().load().await.unwrap().unwrap();
        assert_eq!(stored.kdf, stronger);

        session.lock();
        session.unlock(&pass("hunter2")).await.unwrap();
        assert_eq!(session.record_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn upgrade_kdf_refuses_weaker_params() {
        let session = created().await;
        session
            .upgrade_kdf(&pass("hunter2"), KdfParams::argon2id(8, 1, 1))
            .await
            .expect("equal parameters are allowed");

        let session = session_with(SessionConfig {
            kdf: KdfParams::argon2id(16, 2, 1),
            ..fast_config()
        });
        session.create_vault(&pass("hunter2")).await.unwrap();
        let err = session
            .upgrade_kdf(&pass("hunter2"), KdfParams::argon2id(8, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn export_requires_a_vault_but_not_an_unlock() {
        let session = session();
        assert!(matches!(
            session.export_vault_blob().await,
            Err(VaultError::VaultAbsent)
        ));
        session.create_vault(&pass("hunter2")).await.unwrap();
        session.lock();
        let blob = session.export_vault_blob().await.unwrap();
        assert_eq!(&blob[..4], b"SFVT");
    }

    #[tokio::test]
    async fn import_replace_swaps_container_and_locks() {
        let source = created().await;
        source.add_record(NewCredential::new("From backup")).await.unwrap();
        let blob = source.export_vault_blob().await.unwrap();

        let target = session();
        target.create_vault(&pass("other")).await.unwrap();
        let outcome = target
            .import_vault_blob(&blob, ImportMode::Replace)
            .await
            .unwrap();
        assert_eq!(outcome, ImportOutcome::Replaced);
        assert_eq!(target.status(), SessionStatus::Locked);

        target.unlock(&pass("hunter2")).await.unwrap();
        assert_eq!(target.list_records().unwrap()[0].title, "From backup");
    }

    #[tokio::test]
    async fn import_rejects_garbage_without_writing() {
        let session = created().await;
        let before = session.export_vault_blob().await.unwrap();
        let err = session
            .import_vault_blob(b"garbage", ImportMode::Replace)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::CorruptData(_)));
        assert_eq!(session.export_vault_blob().await.unwrap(), before);
        assert!(session.status().is_unlocked());
    }

    #[tokio::test]
    async fn import_merge_adds_only_new_ids() {
        let source = created().await;
        source.add_record(NewCredential::new("Shared")).await.unwrap();
        let blob = source.export_vault_blob().await.unwrap();

        let target = session();
        target.create_vault(&pass("mine")).await.unwrap();
        target.add_record(NewCredential::new("Local")).await.unwrap();

        let outcome = target
            .import_vault_blob(&blob, ImportMode::Merge(&pass("hunter2")))
            .await
            .unwrap();
        assert_eq!(outcome, ImportOutcome::Merged { added: 1, skipped: 0 });
        let again = target
            .import_vault_blob(&blob, ImportMode::Merge(&pass("hunter2")))
            .await
            .unwrap();
        assert_eq!(again, ImportOutcome::Merged { added: 0, skipped: 1 });
        assert_eq!(target.record_count().unwrap(), 2);

        let err = target
            .import_vault_blob(&blob, ImportMode::Merge(&pass("wrong")))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
        assert!(target.status().is_unlocked());
    }

    #[tokio::test]
    async fn merged_records_go_first_in_backup_order() {
        let source = created().await;
        source.add_record(NewCredential::new("Older")).await.unwrap();
        source.add_record(NewCredential::new("Newer")).await.unwrap();
        let blob = source.export_vault_blob().await.unwrap();

        let target = session();
        target.create_vault(&pass("mine")).await.unwrap();
        target.add_record(NewCredential::new("Local")).await.unwrap();
        target
            .import_vault_blob(&blob, ImportMode::Merge(&pass("hunter2")))
            .await
            .unwrap();

        let titles: Vec<String> = target
            .list_records()
            .unwrap()
            .into_iter()
            .map(|r| r.title.clone())
            .collect();
        assert_eq!(titles, ["Newer", "Older", "Local"]);
    }

    #[tokio::test]
    async fn concurrent_mutations_are_all_kept() {
        let session = created().await;
        let mut handles = Vec::new();
        for i in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session
                    .add_record(NewCredential::new(format!("record {i}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(session.record_count().unwrap(), 8);
        session.lock();
        session.unlock(&pass("hunter2")).await.unwrap();
        assert_eq!(session.record_count().unwrap(), 8);
    }

    #[test]
    fn backup_names_use_iso_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(backup_file_name(date), "safevault-backup-2024-03-07.svault");
    }

    #[test]
    fn session_config_follows_vault_config() {
        let config = SessionConfig::from_config(&VaultConfig {
            idle_timeout_secs: 60,
            unlock_timeout_secs: Some(5),
            ..VaultConfig::default()
        });
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.unlock_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.kdf, KdfParams::default());
    }

    #[test]
    fn status_display_names_failure_reason() {
        let status = SessionStatus::LockedWithError(FailureReason::AuthenticationFailed);
        assert_eq!(status.to_string(), "locked (last unlock failed: authentication_failed)");
    }

    #[tokio::test]
    #[traced_test]
    async fn secrets_never_reach_the_logs() {
        let session = created().await;
        let id = session
            .add_record(
                NewCredential::new("Secret Title")
                    .password("p@ss-w0rd-xyz")
                    .notes("recovery-code-42"),
            )
            .await
            .unwrap();
        session.lock();
        let _ = session.unlock(&pass("wrong-guess-9")).await;
        session.unlock(&pass("hunter2")).await.unwrap();

        assert!(logs_contain("vault created"));
        assert!(logs_contain("unlock failed"));
        assert!(logs_contain(&id.to_string()));
        for secret in ["hunter2", "wrong-guess-9", "p@ss-w0rd-xyz", "recovery-code-42", "Secret Title"] {
            assert!(!logs_contain(secret), "log leaked {secret}");
        }
    }
}
