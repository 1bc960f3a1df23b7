use std::collections::BTreeMap;

use crate::difference::Difference;
use crate::value::{FieldId, FieldValue};

/// Prior field values of one item, captured at one generation.
///
/// While *open* (between `push_history` and `check_for_history`) the
/// snapshot holds every field the item had, and a missing key means the
/// field was absent. Once checked it is trimmed to the fields that changed;
/// `None` then records that the field did not exist before.
#[derive(Debug, Clone)]
pub struct FieldSnapshot {
    generation: u64,
    fields: BTreeMap<FieldId, Option<FieldValue>>,
    /// Prior deletion marker, when it is part of the change.
    deletion: Option<Option<u64>>,
    difference: Difference,
    open: bool,
}

impl FieldSnapshot {
    pub(crate) fn open(
        generation: u64,
        fields: BTreeMap<FieldId, Option<FieldValue>>,
        deletion: Option<u64>,
    ) -> Self {
        Self {
            generation,
            fields,
            deletion: Some(deletion),
            difference: Difference::Identical,
            open: true,
        }
    }

    /// A checked snapshot built directly from known differences.
    pub(crate) fn closed(
        generation: u64,
        fields: BTreeMap<FieldId, Option<FieldValue>>,
        deletion: Option<Option<u64>>,
        difference: Difference,
    ) -> Self {
        Self {
            generation,
            fields,
            deletion,
            difference,
            open: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Prior value of `field`: `None` if not recorded, `Some(None)` if the
    /// field was absent.
    pub fn prior(&self, field: FieldId) -> Option<Option<&FieldValue>> {
        self.fields.get(&field).map(Option::as_ref)
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldId, Option<&FieldValue>)> + '_ {
        self.fields.iter().map(|(id, value)| (*id, value.as_ref()))
    }

    /// Prior deleted flag, if the deletion state changed.
    pub fn prior_deleted(&self) -> Option<bool> {
        self.deletion.map(|at| at.is_some())
    }

    pub fn difference(&self) -> Difference {
        self.difference
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn deletion(&self) -> Option<Option<u64>> {
        self.deletion
    }

    pub(crate) fn fields_mut(&mut self) -> &mut BTreeMap<FieldId, Option<FieldValue>> {
        &mut self.fields
    }

    pub(crate) fn reopen(&mut self, deletion: Option<u64>) {
        self.deletion.get_or_insert(deletion);
        self.open = true;
    }

    pub(crate) fn close(&mut self, keep_deletion: bool, difference: Difference) {
        if !keep_deletion {
            self.deletion = None;
        }
        self.difference = difference;
        self.open = false;
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<FieldId, Option<FieldValue>>, Option<Option<u64>>, bool) {
        (self.fields, self.deletion, self.open)
    }
}

/// Snapshot stack, oldest first.
#[derive(Debug, Clone, Default)]
pub struct History {
    snapshots: Vec<FieldSnapshot>,
}

impl History {
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn top(&self) -> Option<&FieldSnapshot> {
        self.snapshots.last()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &FieldSnapshot> {
        self.snapshots.iter()
    }

    /// Combined difference of every checked snapshot.
    pub fn difference(&self) -> Difference {
        self.snapshots.iter().map(FieldSnapshot::difference).collect()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut FieldSnapshot> {
        self.snapshots.last_mut()
    }

    pub(crate) fn push(&mut self, snapshot: FieldSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub(crate) fn pop(&mut self) -> Option<FieldSnapshot> {
        self.snapshots.pop()
    }

    /// Drop snapshots tagged strictly before `generation`.
    pub(crate) fn condense(&mut self, generation: u64) -> usize {
        let before = self.snapshots.len();
        self.snapshots.retain(|snapshot| snapshot.generation >= generation);
        before - self.snapshots.len()
    }

    pub(crate) fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn snapshot(generation: u64) -> FieldSnapshot {
        let mut fields = BTreeMap::new();
        fields.insert(FieldId::new(1), Some(FieldValue::Plain(Value::Integer(1))));
        FieldSnapshot::closed(generation, fields, None, Difference::ValueChanged)
    }

    #[test]
    fn test_condense_drops_strictly_older() {
        let mut history = History::default();
        for generation in [1, 2, 3] {
            history.push(snapshot(generation));
        }
        assert_eq!(history.condense(2), 1);
        let remaining: Vec<_> = history.iter().map(FieldSnapshot::generation).collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[test]
    fn test_difference_combines_snapshots() {
        let mut history = History::default();
        assert_eq!(history.difference(), Difference::Identical);
        history.push(FieldSnapshot::closed(
            1,
            BTreeMap::new(),
            None,
            Difference::SecurityChanged,
        ));
        assert_eq!(history.difference(), Difference::SecurityChanged);
        history.push(snapshot(2));
        assert_eq!(history.difference(), Difference::ValueChanged);
    }

    #[test]
    fn test_prior_lookup() {
        let snap = snapshot(1);
        assert!(snap.prior(FieldId::new(2)).is_none());
        assert_eq!(
            snap.prior(FieldId::new(1)).unwrap().unwrap().value().unwrap(),
            &Value::Integer(1)
        );
        assert_eq!(snap.prior_deleted(), None);
    }
}
