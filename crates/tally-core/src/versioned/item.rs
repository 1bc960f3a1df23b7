//! Items with per-generation change history.
//!
//! A tracked edit is `push_history` (capture prior values), any number of
//! field mutations, then `check_for_history` (keep only what changed, or
//! drop the snapshot when nothing did). Snapshots hold plaintext; encrypted
//! fields are captured without their ciphertext.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::crypto::CipherSet;
use crate::difference::Difference;
use crate::encrypted::EncryptedField;
use crate::error::Result;
use crate::sorted::ListItem;
use crate::value::{FieldId, FieldValue, ItemId, Value};

use super::history::{FieldSnapshot, History};

#[derive(Debug, Clone)]
pub struct VersionedItem {
    id: ItemId,
    fields: BTreeMap<FieldId, FieldValue>,
    created: u64,
    /// Generation of the logical deletion, if deleted.
    deleted_at: Option<u64>,
    history: History,
}

impl ListItem for VersionedItem {
    fn is_hidden(&self) -> bool {
        self.is_deleted()
    }
}

impl VersionedItem {
    pub fn new(id: ItemId, created: u64) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
            created,
            deleted_at: None,
            history: History::default(),
        }
    }

    /// Builder-style initial field, untracked.
    pub fn with_field(mut self, field: FieldId, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn created_generation(&self) -> u64 {
        self.created
    }

    pub fn deleted_generation(&self) -> Option<u64> {
        self.deleted_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn field(&self, field: FieldId) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Plaintext of `field`, decrypting if needed. `Ok(None)` when absent.
    pub fn value(&self, field: FieldId) -> Result<Option<&Value>> {
        self.fields.get(&field).map(FieldValue::value).transpose()
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &FieldValue)> {
        self.fields.iter().map(|(id, value)| (*id, value))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn has_encrypted_fields(&self) -> bool {
        self.fields.values().any(FieldValue::is_encrypted)
    }

    /// Replace a field, returning the previous value.
    pub fn set_field(&mut self, field: FieldId, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(field, value.into())
    }

    /// Set a value keeping the field's current protection.
    pub fn set_value(&mut self, field: FieldId, value: Value) -> Result<()> {
        match self.fields.get_mut(&field) {
            Some(FieldValue::Encrypted(encrypted)) => encrypted.set(value),
            _ => {
                self.fields.insert(field, FieldValue::Plain(value));
                Ok(())
            }
        }
    }

    /// Store `value` encrypted under `cipher`.
    pub fn set_secret(&mut self, field: FieldId, cipher: &Arc<CipherSet>, value: Value) -> Result<()> {
        let encrypted = EncryptedField::new(cipher, value)?;
        self.fields.insert(field, FieldValue::Encrypted(encrypted));
        Ok(())
    }

    pub fn clear_field(&mut self, field: FieldId) -> Option<FieldValue> {
        self.fields.remove(&field)
    }

    pub fn set_deleted(&mut self, deleted: bool, generation: u64) {
        match (deleted, self.deleted_at) {
            (true, None) => self.deleted_at = Some(generation),
            (false, Some(_)) => self.deleted_at = None,
            _ => {}
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Has recorded changes.
    pub fn is_dirty(&self) -> bool {
        !self.history.is_empty()
    }

    /// Aggregate of every recorded change.
    pub fn difference(&self) -> Difference {
        self.history.difference()
    }

    /// Capture current values for `generation`. A no-op if the top snapshot
    /// already belongs to `generation` and is open; a checked snapshot of the
    /// same generation is reopened so the next check sees the net change.
    pub fn push_history(&mut self, generation: u64) -> Result<()> {
        if let Some(top) = self.history.top_mut() {
            if top.generation() == generation {
                if !top.is_open() {
                    let recorded = top.fields_mut();
                    for (field, value) in &self.fields {
                        if !recorded.contains_key(field) {
                            recorded.insert(*field, Some(value.snapshot()?));
                        }
                    }
                    top.reopen(self.deleted_at);
                }
                return Ok(());
            }
        }

        let mut captured = BTreeMap::new();
        for (field, value) in &self.fields {
            captured.insert(*field, Some(value.snapshot()?));
        }
        self.history
            .push(FieldSnapshot::open(generation, captured, self.deleted_at));
        Ok(())
    }

    /// Compare current values with the open snapshot. Keeps the differing
    /// fields and returns their combined difference, or discards the
    /// snapshot when nothing changed. Without an open snapshot this is a
    /// no-op returning `Identical`.
    pub fn check_for_history(&mut self) -> Result<Difference> {
        let Some(top) = self.history.top() else {
            return Ok(Difference::Identical);
        };
        if !top.is_open() {
            return Ok(Difference::Identical);
        }

        let mut keys: BTreeSet<FieldId> = self.fields.keys().copied().collect();
        keys.extend(top.fields().map(|(field, _)| field));

        let mut changed = BTreeSet::new();
        let mut total = Difference::Identical;
        for field in keys {
            let prior = top.prior(field).flatten();
            let difference = FieldValue::difference(prior, self.fields.get(&field))?;
            if !difference.is_identical() {
                changed.insert(field);
                total = total.combine(difference);
            }
        }
        let prior_deleted = top.deletion().map(|at| at.is_some());
        let deletion_changed = prior_deleted.is_some_and(|was| was != self.is_deleted());
        if deletion_changed {
            total = total.combine(Difference::ValueChanged);
        }

        if total.is_identical() {
            self.history.pop();
            tracing::debug!(item = %self.id, "no net change; snapshot discarded");
            return Ok(total);
        }

        if let Some(top) = self.history.top_mut() {
            let fields = top.fields_mut();
            // Fields first set during this edit were absent before.
            for field in &changed {
                fields.entry(*field).or_insert(None);
            }
            fields.retain(|field, _| changed.contains(field));
            top.close(deletion_changed, total);
        }
        tracing::debug!(item = %self.id, difference = ?total, "change recorded");
        Ok(total)
    }

    /// Undo every recorded change, restoring the oldest captured values.
    pub fn reset_changes(&mut self) -> bool {
        let mut restored = false;
        while self.pop_history() {
            restored = true;
        }
        restored
    }

    /// Undo the most recent snapshot.
    pub fn pop_history(&mut self) -> bool {
        match self.history.pop() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    /// Undo snapshots tagged after `generation`.
    pub fn rewind_to(&mut self, generation: u64) -> usize {
        let mut popped = 0;
        while self
            .history
            .top()
            .is_some_and(|top| top.generation() > generation)
        {
            self.pop_history();
            popped += 1;
        }
        popped
    }

    /// Forget snapshots tagged strictly before `generation`.
    pub fn condense(&mut self, generation: u64) -> usize {
        self.history.condense(generation)
    }

    /// Encrypt every stale encrypted field.
    pub fn materialize(&mut self) -> Result<()> {
        for value in self.fields.values_mut() {
            if let FieldValue::Encrypted(encrypted) = value {
                encrypted.materialize()?;
            }
        }
        Ok(())
    }

    /// Copy of the current state without history.
    pub fn clean_copy(&self) -> Self {
        Self {
            id: self.id,
            fields: self.fields.clone(),
            created: self.created,
            deleted_at: self.deleted_at,
            history: History::default(),
        }
    }

    /// Compare with an earlier version of the same item. Returns the
    /// combined difference and the earlier values of the fields that differ.
    pub(crate) fn compare_with(&self, older: &VersionedItem) -> Result<(Difference, FieldSnapshotParts)> {
        let mut keys: BTreeSet<FieldId> = self.fields.keys().copied().collect();
        keys.extend(older.fields.keys().copied());

        let mut total = Difference::Identical;
        let mut priors = BTreeMap::new();
        for field in keys {
            let prior = older.fields.get(&field);
            let difference = FieldValue::difference(prior, self.fields.get(&field))?;
            if !difference.is_identical() {
                total = total.combine(difference);
                priors.insert(field, prior.map(FieldValue::snapshot).transpose()?);
            }
        }
        let deletion = if older.is_deleted() != self.is_deleted() {
            total = total.combine(Difference::ValueChanged);
            Some(older.deleted_at)
        } else {
            None
        };
        Ok((total, FieldSnapshotParts { fields: priors, deletion }))
    }

    pub(crate) fn record_snapshot(&mut self, snapshot: FieldSnapshot) {
        self.history.push(snapshot);
    }

    /// Treat the item as created at `generation`, without history.
    pub(crate) fn rebase(&mut self, generation: u64) {
        self.created = generation;
        self.history.clear();
    }

    /// Take over another version's fields and deletion state.
    pub(crate) fn adopt(&mut self, other: &VersionedItem, generation: u64) {
        self.fields = other.fields.clone();
        self.set_deleted(other.is_deleted(), generation);
    }

    pub(crate) fn encrypted_fields(&self) -> impl Iterator<Item = (FieldId, &EncryptedField)> {
        self.fields.iter().filter_map(|(id, value)| match value {
            FieldValue::Encrypted(encrypted) => Some((*id, encrypted)),
            FieldValue::Plain(_) => None,
        })
    }

    fn restore(&mut self, snapshot: FieldSnapshot) {
        let (fields, deletion, open) = snapshot.into_parts();
        if open {
            // Open snapshots are complete: anything not captured was absent.
            self.fields = fields
                .into_iter()
                .filter_map(|(field, value)| value.map(|value| (field, value)))
                .collect();
        } else {
            for (field, value) in fields {
                match value {
                    Some(value) => {
                        self.fields.insert(field, value);
                    }
                    None => {
                        self.fields.remove(&field);
                    }
                }
            }
        }
        if let Some(deleted_at) = deletion {
            self.deleted_at = deleted_at;
        }
    }
}

/// Earlier values found by [`VersionedItem::compare_with`].
pub(crate) struct FieldSnapshotParts {
    pub(crate) fields: BTreeMap<FieldId, Option<FieldValue>>,
    pub(crate) deletion: Option<Option<u64>>,
}
