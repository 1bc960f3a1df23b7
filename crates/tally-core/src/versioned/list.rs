//! Versioned item collections.
//!
//! A [`VersionedList`] holds [`VersionedItem`]s in a [`SortedList`] plus an
//! id index. Its generation counter tags every tracked edit; advancing it
//! commits the current batch.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::difference::Difference;
use crate::error::{Result, TallyError};
use crate::sorted::{Comparator, Iter, ListCursor, NodeId, SortedList, View};
use crate::value::{FieldId, FieldValue, ItemId, Value};

use super::item::VersionedItem;

/// Role of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListStyle {
    /// Authoritative, persisted.
    Core,
    /// Working copy for an editing session.
    Edit,
    /// Structural copy, e.g. for export.
    Clone,
    /// Output of differencing; never itself diffed.
    Difference,
}

impl fmt::Display for ListStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListStyle::Core => "core",
            ListStyle::Edit => "edit",
            ListStyle::Clone => "clone",
            ListStyle::Difference => "difference",
        };
        f.write_str(name)
    }
}

pub type ItemComparator = Comparator<VersionedItem>;

/// Order by item id.
pub fn by_id() -> ItemComparator {
    Arc::new(|a: &VersionedItem, b: &VersionedItem| a.id().cmp(&b.id()))
}

/// Order by the plaintext of `field`, then by id.
///
/// Absent values sort first and unreadable ones last. Lists built with
/// [`VersionedList::sorted_by`] refuse unreadable keys on add and edit, so
/// the last bucket only fills when the comparator is used on its own.
pub fn by_field(field: FieldId) -> ItemComparator {
    Arc::new(move |a: &VersionedItem, b: &VersionedItem| {
        field_key(a, field)
            .cmp(&field_key(b, field))
            .then_with(|| a.id().cmp(&b.id()))
    })
}

fn field_key(item: &VersionedItem, field: FieldId) -> (u8, Option<&Value>) {
    match item.value(field) {
        Ok(None) => (0, None),
        Ok(Some(value)) => (1, Some(value)),
        Err(e) => {
            tracing::warn!(item = %item.id(), field = %field, error = %e, "sort key unreadable");
            (2, None)
        }
    }
}

/// Every item compares equal, so inserts append.
pub(crate) fn insertion_order() -> ItemComparator {
    Arc::new(|_: &VersionedItem, _: &VersionedItem| Ordering::Equal)
}

#[derive(Debug, Clone)]
pub struct VersionedList {
    style: ListStyle,
    generation: u64,
    /// Generation at which the list was loaded or derived.
    base_generation: u64,
    items: SortedList<VersionedItem>,
    index: HashMap<ItemId, NodeId>,
    next_id: u32,
    /// Field the comparator reads, when built with `sorted_by`.
    sort_field: Option<FieldId>,
}

impl VersionedList {
    /// Empty list ordered by item id.
    pub fn new(style: ListStyle) -> Self {
        Self::with_comparator(style, by_id())
    }

    pub fn with_comparator(style: ListStyle, comparator: ItemComparator) -> Self {
        Self {
            style,
            generation: 0,
            base_generation: 0,
            items: SortedList::new(comparator),
            index: HashMap::new(),
            next_id: 1,
            sort_field: None,
        }
    }

    /// Empty list ordered by the plaintext of `field`. Items whose value
    /// for `field` cannot be read are rejected with the read error.
    pub fn sorted_by(style: ListStyle, field: FieldId) -> Self {
        let mut list = Self::with_comparator(style, by_field(field));
        list.sort_field = Some(field);
        list
    }

    pub fn sort_field(&self) -> Option<FieldId> {
        self.sort_field
    }

    pub fn style(&self) -> ListStyle {
        self.style
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn base_generation(&self) -> u64 {
        self.base_generation
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn active_len(&self) -> usize {
        self.items.active_len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn find(&self, id: ItemId) -> Option<&VersionedItem> {
        self.index.get(&id).and_then(|node| self.items.get(*node))
    }

    pub fn get(&self, id: ItemId) -> Result<&VersionedItem> {
        self.find(id).ok_or(TallyError::ItemNotFound(id))
    }

    pub fn iter(&self, view: View) -> Iter<'_, VersionedItem> {
        self.items.iter(view)
    }

    /// The underlying list, for cursor walks.
    pub fn items(&self) -> &SortedList<VersionedItem> {
        &self.items
    }

    pub fn cursor(&self, view: View) -> ListCursor {
        self.items.cursor(view)
    }

    /// Position of an item in `view`.
    pub fn position(&self, id: ItemId, view: View) -> Option<usize> {
        self.index
            .get(&id)
            .and_then(|node| self.items.index_of(*node, view))
    }

    /// Create an item with the next free id. Initial fields are untracked.
    pub fn create_item<I>(&mut self, fields: I) -> ItemId
    where
        I: IntoIterator<Item = (FieldId, FieldValue)>,
    {
        let id = ItemId::new(self.next_id);
        let mut item = VersionedItem::new(id, self.generation);
        for (field, value) in fields {
            item.set_field(field, value);
        }
        self.insert_item(item);
        id
    }

    /// Add an existing item. Fails with `Duplicate` on id collision.
    pub fn add_item(&mut self, item: VersionedItem) -> Result<()> {
        if self.index.contains_key(&item.id()) {
            return Err(TallyError::Duplicate(item.id()));
        }
        self.check_sort_key(&item)?;
        self.insert_item(item);
        Ok(())
    }

    /// Physically remove an item. Untracked.
    pub fn remove(&mut self, id: ItemId) -> Result<VersionedItem> {
        let node = self.index.remove(&id).ok_or(TallyError::ItemNotFound(id))?;
        self.items.remove(node)
    }

    /// Remove the item last returned by `cursor`.
    pub fn remove_at(&mut self, cursor: &mut ListCursor) -> Result<VersionedItem> {
        let item = cursor.remove_last(&mut self.items)?;
        self.index.remove(&item.id());
        Ok(item)
    }

    /// Tracked edit: capture history, run `f`, record what changed, and
    /// re-position the item if its visibility or sort key moved.
    pub fn edit<F>(&mut self, id: ItemId, f: F) -> Result<Difference>
    where
        F: FnOnce(&mut VersionedItem) -> Result<()>,
    {
        let node = *self.index.get(&id).ok_or(TallyError::ItemNotFound(id))?;
        let generation = self.generation;
        let item = self
            .items
            .get_mut(node)
            .ok_or_else(|| TallyError::IllegalState(format!("index entry for {} is stale", id)))?;

        item.push_history(generation)?;
        let outcome = f(item);
        let difference = item.check_for_history();
        let readable = match self.items.get(node) {
            Some(item) => self.check_sort_key(item),
            None => Ok(()),
        };
        self.sync_node(id, node)?;
        outcome?;
        readable?;
        difference
    }

    pub fn set_field(&mut self, id: ItemId, field: FieldId, value: impl Into<FieldValue>) -> Result<Difference> {
        let value = value.into();
        self.edit(id, |item| {
            item.set_field(field, value);
            Ok(())
        })
    }

    pub fn clear_field(&mut self, id: ItemId, field: FieldId) -> Result<Difference> {
        self.edit(id, |item| {
            item.clear_field(field);
            Ok(())
        })
    }

    /// Logical delete: the item leaves the active view, tracked.
    pub fn delete(&mut self, id: ItemId) -> Result<Difference> {
        let generation = self.generation;
        self.edit(id, |item| {
            item.set_deleted(true, generation);
            Ok(())
        })
    }

    /// Undo a logical delete, tracked.
    pub fn restore(&mut self, id: ItemId) -> Result<Difference> {
        let generation = self.generation;
        self.edit(id, |item| {
            item.set_deleted(false, generation);
            Ok(())
        })
    }

    /// Commit the current batch; later edits get fresh snapshots.
    pub fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        tracing::debug!(style = %self.style, generation = self.generation, "generation advanced");
        self.generation
    }

    /// Forget history older than the current generation.
    pub fn condense_history(&mut self) -> usize {
        let generation = self.generation;
        let mut dropped = 0;
        for node in self.nodes() {
            if let Some(item) = self.items.get_mut(node) {
                dropped += item.condense(generation);
            }
        }
        dropped
    }

    /// Drop items created after `generation` and undo later edits on the
    /// rest. The generation counter keeps counting forward.
    pub fn rewind_to_generation(&mut self, generation: u64) -> Result<()> {
        let mut removed = 0;
        for node in self.nodes() {
            let Some(item) = self.items.get_mut(node) else {
                continue;
            };
            let id = item.id();
            if item.created_generation() > generation {
                self.index.remove(&id);
                self.items.remove(node)?;
                removed += 1;
            } else if item.rewind_to(generation) > 0 {
                self.sync_node(id, node)?;
            }
        }
        tracing::debug!(generation, removed, "list rewound");
        Ok(())
    }

    /// Undo everything since the list was loaded or derived.
    pub fn reset_changes(&mut self) -> Result<()> {
        self.rewind_to_generation(self.base_generation)?;
        for node in self.nodes() {
            let Some(item) = self.items.get_mut(node) else {
                continue;
            };
            let id = item.id();
            if item.reset_changes() {
                self.sync_node(id, node)?;
            }
        }
        Ok(())
    }

    /// Any recorded change or item created since the base generation.
    pub fn has_changes(&self) -> bool {
        self.items
            .iter(View::All)
            .any(|item| item.is_dirty() || item.created_generation() > self.base_generation)
    }

    /// Working copy for an editing session, one generation ahead of this
    /// list. Items are copied without history.
    pub fn derive_edit_list(&self) -> VersionedList {
        let mut edit = self.copy_as(ListStyle::Edit);
        edit.base_generation = self.generation;
        edit.generation = self.generation + 1;
        edit
    }

    /// Structural copy without history.
    pub fn clone_list(&self) -> VersionedList {
        let mut copy = self.copy_as(ListStyle::Clone);
        copy.base_generation = self.generation;
        copy
    }

    pub(crate) fn comparator(&self) -> &ItemComparator {
        self.items.comparator()
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
        self.base_generation = generation;
    }

    /// All-view node ids, in order.
    pub(crate) fn nodes(&self) -> Vec<NodeId> {
        self.items.entries(View::All).map(|(node, _)| node).collect()
    }

    pub(crate) fn item_mut(&mut self, node: NodeId) -> Option<&mut VersionedItem> {
        self.items.get_mut(node)
    }

    fn copy_as(&self, style: ListStyle) -> VersionedList {
        let mut copy = VersionedList::with_comparator(style, Arc::clone(self.comparator()));
        copy.generation = self.generation;
        copy.next_id = self.next_id;
        copy.sort_field = self.sort_field;
        for item in self.items.iter(View::All) {
            copy.insert_item(item.clean_copy());
        }
        copy
    }

    fn check_sort_key(&self, item: &VersionedItem) -> Result<()> {
        match self.sort_field {
            Some(field) => item.value(field).map(|_| ()),
            None => Ok(()),
        }
    }

    fn insert_item(&mut self, item: VersionedItem) {
        let id = item.id();
        self.next_id = self.next_id.max(id.get().saturating_add(1));
        let node = self.items.insert(item);
        self.index.insert(id, node);
    }

    /// Bring a node's visibility and position in line with its item.
    pub(crate) fn sync_node(&mut self, id: ItemId, node: NodeId) -> Result<()> {
        let hidden = self
            .items
            .get(node)
            .map(VersionedItem::is_deleted)
            .ok_or_else(|| TallyError::IllegalState(format!("index entry for {} is stale", id)))?;
        self.items.set_hidden(node, hidden)?;
        if !self.items.in_order(node) {
            let moved = self.items.resort(node)?;
            self.index.insert(id, moved);
        }
        Ok(())
    }
}
