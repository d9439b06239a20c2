//! Merge engine: pure reconciliation plus transactional apply.
//!
//! `diff` is a pure function over two entry sets. Identity is the entry
//! uuid; strict `>` on `lastModified` decides "newer"; equal timestamps with
//! differing content are a conflict, resolved by the configured policy. The
//! tombstone flag is ordinary content for diffing purposes, which is what
//! makes deletions propagate instead of being resurrected by stale copies.
//!
//! `apply` mutates the local vault under a full snapshot: deletes, then
//! updates, then creates. Any failure restores the snapshot wholesale and
//! reports a transaction failure; partial applies never survive.

use crate::error::{SyncError, SyncResult};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use vaultlink_types::{ItemAction, SyncLogItem, VaultEntry};
use vaultlink_vault::Vault;

/// How equal-timestamp conflicts are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Later timestamp wins. Meaningless when timestamps are equal, so it
    /// degrades to `KeepBoth` for ties.
    #[default]
    UseNewer,
    /// Keep the local copy.
    UseLocal,
    /// Take the remote copy.
    UseRemote,
    /// Duplicate the remote copy under a fresh uuid so both survive.
    KeepBoth,
}

/// One scheduled change against a vault.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryChange {
    /// Insert a new record (uuid not present on that side).
    Create(VaultEntry),
    /// Replace an existing record wholesale.
    Update(VaultEntry),
    /// Tombstone an existing live record.
    Delete(VaultEntry),
}

impl EntryChange {
    /// The entry the change carries.
    #[must_use]
    pub fn entry(&self) -> &VaultEntry {
        match self {
            EntryChange::Create(e) | EntryChange::Update(e) | EntryChange::Delete(e) => e,
        }
    }

    fn log_item(&self, source_device: &str) -> SyncLogItem {
        let (action, entry) = match self {
            EntryChange::Create(e) => (ItemAction::Added, e),
            EntryChange::Update(e) => (ItemAction::Modified, e),
            EntryChange::Delete(e) => (ItemAction::Deleted, e),
        };
        SyncLogItem {
            entry_title: entry.title.clone(),
            action,
            source_device: source_device.to_string(),
        }
    }
}

/// Two copies of the same uuid with equal timestamps and differing content.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub local: VaultEntry,
    pub remote: VaultEntry,
}

/// Output of the pure diff: what this side must apply, what the peer is
/// expected to apply when it runs the same diff with the sides swapped, and
/// the conflicts that were resolved by policy.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    /// Changes to apply to the local vault.
    pub local_changes: Vec<EntryChange>,
    /// Changes the peer will apply on its side (informational here).
    pub remote_changes: Vec<EntryChange>,
    /// Conflicts encountered, after policy resolution was scheduled.
    pub conflicts: Vec<Conflict>,
}

impl MergePlan {
    /// Whether the plan leaves the local side untouched.
    #[must_use]
    pub fn is_local_noop(&self) -> bool {
        self.local_changes.is_empty()
    }
}

/// Counts and per-item details of an applied merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub items: Vec<SyncLogItem>,
}

/// The reconciliation engine. Pure `diff`, imperative `apply`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine {
    policy: ConflictPolicy,
}

impl MergeEngine {
    /// Creates an engine with the given conflict policy.
    #[must_use]
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// The configured policy.
    #[must_use]
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Computes the merge plan between the local and remote entry sets.
    /// `peer_name` is used to title conflict duplicates.
    #[must_use]
    pub fn diff(
        &self,
        local: &[VaultEntry],
        remote: &[VaultEntry],
        peer_name: &str,
    ) -> MergePlan {
        // BTreeMaps keyed by uuid give a deterministic traversal order, so
        // the same inputs always produce the same plan structure.
        let local_map: BTreeMap<_, _> = local.iter().map(|e| (e.uuid, e)).collect();
        let remote_map: BTreeMap<_, _> = remote.iter().map(|e| (e.uuid, e)).collect();

        let mut plan = MergePlan::default();

        for (uuid, l) in &local_map {
            match remote_map.get(uuid) {
                None => {
                    // Only we have it: the peer creates it (tombstones too,
                    // so the deletion still propagates).
                    plan.remote_changes.push(EntryChange::Create((*l).clone()));
                }
                Some(r) => self.diff_pair(l, r, peer_name, &mut plan),
            }
        }

        for (uuid, r) in &remote_map {
            if !local_map.contains_key(uuid) {
                plan.local_changes.push(EntryChange::Create((*r).clone()));
            }
        }

        plan
    }

    /// Diffs two copies of the same uuid.
    fn diff_pair(
        &self,
        local: &VaultEntry,
        remote: &VaultEntry,
        peer_name: &str,
        plan: &mut MergePlan,
    ) {
        use std::cmp::Ordering;

        match remote.last_modified.cmp(&local.last_modified) {
            Ordering::Greater => {
                // Remote strictly newer: it overwrites our copy. A newer
                // tombstone lands as a delete, not an update.
                if remote.deleted_flag && !local.deleted_flag {
                    plan.local_changes.push(EntryChange::Delete(remote.clone()));
                } else {
                    plan.local_changes.push(EntryChange::Update(remote.clone()));
                }
            }
            Ordering::Less => {
                if local.deleted_flag && !remote.deleted_flag {
                    plan.remote_changes.push(EntryChange::Delete(local.clone()));
                } else {
                    plan.remote_changes.push(EntryChange::Update(local.clone()));
                }
            }
            Ordering::Equal => {
                if local.same_content(remote) {
                    return;
                }
                debug!(uuid = %local.uuid, "timestamp tie with differing content");
                plan.conflicts.push(Conflict {
                    local: local.clone(),
                    remote: remote.clone(),
                });
                self.resolve_conflict(local, remote, peer_name, plan);
            }
        }
    }

    fn resolve_conflict(
        &self,
        local: &VaultEntry,
        remote: &VaultEntry,
        peer_name: &str,
        plan: &mut MergePlan,
    ) {
        match self.policy {
            // UseNewer cannot break an equal-timestamp tie; fall through to
            // keeping both so nothing is lost.
            ConflictPolicy::UseNewer | ConflictPolicy::KeepBoth => {
                plan.local_changes
                    .push(EntryChange::Create(remote.duplicate_from_peer(peer_name)));
            }
            ConflictPolicy::UseLocal => {
                plan.remote_changes.push(EntryChange::Update(local.clone()));
            }
            ConflictPolicy::UseRemote => {
                plan.local_changes.push(EntryChange::Update(remote.clone()));
            }
        }
    }

    /// Applies the local side of a plan transactionally.
    ///
    /// Captures a snapshot first, applies deletes, then updates, then
    /// creates, then persists. Any failure restores the snapshot in full
    /// and reports `Transaction`; the vault is never left partially merged.
    pub fn apply(
        &self,
        vault: &mut dyn Vault,
        changes: &[EntryChange],
        source_device: &str,
    ) -> SyncResult<AppliedSummary> {
        let snapshot = vault.snapshot()?;

        match Self::apply_inner(vault, changes, source_device) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!("merge apply failed, rolling back: {e}");
                if let Err(restore_err) = vault.restore(snapshot) {
                    // Rollback itself failing leaves the vault collaborator
                    // responsible; report both causes.
                    return Err(SyncError::Transaction(format!(
                        "apply failed ({e}) and rollback failed ({restore_err})"
                    )));
                }
                Err(SyncError::Transaction(e.to_string()))
            }
        }
    }

    fn apply_inner(
        vault: &mut dyn Vault,
        changes: &[EntryChange],
        source_device: &str,
    ) -> Result<AppliedSummary, vaultlink_vault::VaultError> {
        let mut summary = AppliedSummary::default();

        // Fixed order: deletes, then updates, then creates.
        for change in changes.iter().filter(|c| matches!(c, EntryChange::Delete(_))) {
            vault.apply_delete(change.entry())?;
            summary.deleted += 1;
            summary.items.push(change.log_item(source_device));
        }
        for change in changes.iter().filter(|c| matches!(c, EntryChange::Update(_))) {
            vault.apply_update(change.entry())?;
            summary.modified += 1;
            summary.items.push(change.log_item(source_device));
        }
        for change in changes.iter().filter(|c| matches!(c, EntryChange::Create(_))) {
            vault.apply_add(change.entry())?;
            summary.added += 1;
            summary.items.push(change.log_item(source_device));
        }

        vault.save()?;
        Ok(summary)
    }
}
