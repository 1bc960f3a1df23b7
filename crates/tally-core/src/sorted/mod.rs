//! Sorted, dual-view linked list.
//!
//! Every record collection is held in a [`SortedList`]: a doubly linked list
//! kept in comparator order, threaded twice through the same nodes:
//!
//! - the **all** view links every node;
//! - the **active** view links only nodes that are not hidden.
//!
//! Nodes live in an arena and are addressed by generational [`NodeId`]s, so
//! a handle to a removed node is detected rather than aliasing a new one.
//! Position indexes are cached per view and rebuilt lazily after mutation.

mod cursor;
mod iter;

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TallyError};

pub use cursor::ListCursor;
pub use iter::{Entries, Iter};

/// Which linkage of the list to traverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    /// Every item, hidden or not.
    All,
    /// Only items that are not hidden.
    Active,
}

/// Handle to a node in a [`SortedList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Items that know whether they belong in the active view.
pub trait ListItem {
    fn is_hidden(&self) -> bool {
        false
    }
}

/// Total order over list items. Ties keep insertion order.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
struct Links {
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Ends {
    first: Option<u32>,
    last: Option<u32>,
    len: usize,
}

#[derive(Clone)]
struct Node<T> {
    item: T,
    all: Links,
    /// Meaningful only while not hidden.
    active: Links,
    hidden: bool,
    all_index: Cell<usize>,
    active_index: Cell<usize>,
}

#[derive(Clone)]
struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

#[derive(Clone)]
pub struct SortedList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    all: Ends,
    active: Ends,
    comparator: Comparator<T>,
    indexes_valid: Cell<bool>,
}

impl<T> SortedList<T> {
    pub fn new(comparator: Comparator<T>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            all: Ends::default(),
            active: Ends::default(),
            comparator,
            indexes_valid: Cell::new(true),
        }
    }

    /// List ordered by `T: Ord`.
    pub fn ordered() -> Self
    where
        T: Ord,
    {
        Self::new(Arc::new(|a: &T, b: &T| a.cmp(b)))
    }

    pub fn comparator(&self) -> &Comparator<T> {
        &self.comparator
    }

    /// Number of items in the all view.
    pub fn len(&self) -> usize {
        self.all.len
    }

    /// Number of items in the active view.
    pub fn active_len(&self) -> usize {
        self.active.len
    }

    pub fn view_len(&self, view: View) -> usize {
        self.ends(view).len
    }

    pub fn is_empty(&self) -> bool {
        self.all.len == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.resolve(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.resolve(id).map(|index| &self.node(index).item)
    }

    /// Mutable access. Call [`resort`](Self::resort) afterwards if the
    /// change can affect ordering.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        let index = self.resolve(id)?;
        Some(&mut self.node_mut(index).item)
    }

    pub fn is_hidden(&self, id: NodeId) -> Option<bool> {
        self.resolve(id).map(|index| self.node(index).hidden)
    }

    pub fn first(&self, view: View) -> Option<NodeId> {
        self.ends(view).first.map(|index| self.node_id(index))
    }

    pub fn last(&self, view: View) -> Option<NodeId> {
        self.ends(view).last.map(|index| self.node_id(index))
    }

    /// Successor of `id` in `view`. `None` at the end, for stale ids, and
    /// for hidden nodes in the active view.
    pub fn next(&self, id: NodeId, view: View) -> Option<NodeId> {
        let index = self.resolve_in(id, view)?;
        self.links(index, view).next.map(|next| self.node_id(next))
    }

    /// Predecessor of `id` in `view`.
    pub fn previous(&self, id: NodeId, view: View) -> Option<NodeId> {
        let index = self.resolve_in(id, view)?;
        self.links(index, view).prev.map(|prev| self.node_id(prev))
    }

    /// Insert in sorted position, visible unless the item reports hidden.
    pub fn insert(&mut self, item: T) -> NodeId
    where
        T: ListItem,
    {
        let hidden = item.is_hidden();
        self.insert_with(item, hidden)
    }

    /// Insert in sorted position with explicit visibility. Equal items are
    /// placed after the existing ones.
    pub fn insert_with(&mut self, item: T, hidden: bool) -> NodeId {
        let after = self.insert_point(&item);
        let index = self.allocate(Node {
            item,
            all: Links::default(),
            active: Links::default(),
            hidden,
            all_index: Cell::new(0),
            active_index: Cell::new(0),
        });
        self.link_after(View::All, index, after);
        if !hidden {
            self.link_active(index);
        }
        self.invalidate();
        self.node_id(index)
    }

    /// Unlink and return the item.
    pub fn remove(&mut self, id: NodeId) -> Result<T> {
        let index = self.resolve(id).ok_or_else(|| stale(id))?;
        if !self.node(index).hidden {
            self.unlink(View::Active, index);
        }
        self.unlink(View::All, index);

        let slot = &mut self.slots[index as usize];
        let node = slot.node.take().ok_or_else(|| stale(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.invalidate();
        Ok(node.item)
    }

    /// Move the node into or out of the active view.
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) -> Result<()> {
        let index = self.resolve(id).ok_or_else(|| stale(id))?;
        if self.node(index).hidden == hidden {
            return Ok(());
        }
        if hidden {
            self.unlink(View::Active, index);
        } else {
            self.link_active(index);
        }
        self.node_mut(index).hidden = hidden;
        self.invalidate();
        Ok(())
    }

    /// Re-position a node after a sort-key mutation. Returns its new id.
    pub fn resort(&mut self, id: NodeId) -> Result<NodeId> {
        let hidden = self.is_hidden(id).ok_or_else(|| stale(id))?;
        let item = self.remove(id)?;
        Ok(self.insert_with(item, hidden))
    }

    /// Whether `id` still sorts between its all-view neighbours.
    pub fn in_order(&self, id: NodeId) -> bool {
        let Some(index) = self.resolve(id) else {
            return false;
        };
        let node = self.node(index);
        let after_prev = node.all.prev.map_or(true, |prev| {
            (self.comparator)(&self.node(prev).item, &node.item) != Ordering::Greater
        });
        let before_next = node.all.next.map_or(true, |next| {
            (self.comparator)(&node.item, &self.node(next).item) != Ordering::Greater
        });
        after_prev && before_next
    }

    /// 0-based position of `id` in `view`.
    pub fn index_of(&self, id: NodeId, view: View) -> Option<usize> {
        let index = self.resolve_in(id, view)?;
        self.ensure_indexes();
        let node = self.node(index);
        Some(match view {
            View::All => node.all_index.get(),
            View::Active => node.active_index.get(),
        })
    }

    /// Node at a 0-based position in `view`.
    pub fn at(&self, position: usize, view: View) -> Option<NodeId> {
        if position >= self.view_len(view) {
            return None;
        }
        // Walk from the nearer end.
        if position <= self.view_len(view) / 2 {
            self.entries(view).nth(position).map(|(id, _)| id)
        } else {
            let from_back = self.view_len(view) - 1 - position;
            self.entries(view).rev().nth(from_back).map(|(id, _)| id)
        }
    }

    pub fn iter(&self, view: View) -> Iter<'_, T> {
        Iter::new(self.entries(view))
    }

    pub fn entries(&self, view: View) -> Entries<'_, T> {
        Entries::new(self, view)
    }

    /// A cursor positioned before the first node of `view`.
    pub fn cursor(&self, view: View) -> ListCursor {
        ListCursor::new(view)
    }

    /// Remove everything, keeping the comparator.
    ///
    /// Slots are vacated rather than dropped so ids taken before the clear
    /// stay stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free.push(index as u32);
        }
        self.all = Ends::default();
        self.active = Ends::default();
        self.invalidate();
    }

    // --- internals ---

    fn node_id(&self, index: u32) -> NodeId {
        NodeId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn resolve(&self, id: NodeId) -> Option<u32> {
        let slot = self.slots.get(id.index as usize)?;
        (slot.generation == id.generation && slot.node.is_some()).then_some(id.index)
    }

    fn resolve_in(&self, id: NodeId, view: View) -> Option<u32> {
        let index = self.resolve(id)?;
        match view {
            View::Active if self.node(index).hidden => None,
            _ => Some(index),
        }
    }

    fn node(&self, index: u32) -> &Node<T> {
        match &self.slots[index as usize].node {
            Some(node) => node,
            None => unreachable!("linked slot {} is vacant", index),
        }
    }

    fn node_mut(&mut self, index: u32) -> &mut Node<T> {
        match &mut self.slots[index as usize].node {
            Some(node) => node,
            None => unreachable!("linked slot {} is vacant", index),
        }
    }

    fn links(&self, index: u32, view: View) -> Links {
        let node = self.node(index);
        match view {
            View::All => node.all,
            View::Active => node.active,
        }
    }

    fn links_mut(&mut self, index: u32, view: View) -> &mut Links {
        let node = self.node_mut(index);
        match view {
            View::All => &mut node.all,
            View::Active => &mut node.active,
        }
    }

    fn ends(&self, view: View) -> &Ends {
        match view {
            View::All => &self.all,
            View::Active => &self.active,
        }
    }

    fn ends_mut(&mut self, view: View) -> &mut Ends {
        match view {
            View::All => &mut self.all,
            View::Active => &mut self.active,
        }
    }

    fn allocate(&mut self, node: Node<T>) -> u32 {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].node = Some(node);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                (self.slots.len() - 1) as u32
            }
        }
    }

    /// The all-view node to insert after; `None` means at the front.
    fn insert_point(&self, item: &T) -> Option<u32> {
        let first = self.all.first?;
        if (self.comparator)(item, &self.node(first).item) == Ordering::Less {
            return None;
        }
        // Scan back from the tail: in-order loads stay O(1).
        let mut cursor = self.all.last;
        while let Some(index) = cursor {
            if (self.comparator)(&self.node(index).item, item) != Ordering::Greater {
                return Some(index);
            }
            cursor = self.node(index).all.prev;
        }
        None
    }

    fn link_after(&mut self, view: View, index: u32, after: Option<u32>) {
        let next = match after {
            Some(prev) => self.links(prev, view).next,
            None => self.ends(view).first,
        };
        *self.links_mut(index, view) = Links { prev: after, next };
        match after {
            Some(prev) => self.links_mut(prev, view).next = Some(index),
            None => self.ends_mut(view).first = Some(index),
        }
        match next {
            Some(next) => self.links_mut(next, view).prev = Some(index),
            None => self.ends_mut(view).last = Some(index),
        }
        self.ends_mut(view).len += 1;
    }

    /// Link into the active view after the nearest visible all-view predecessor.
    fn link_active(&mut self, index: u32) {
        let mut cursor = self.node(index).all.prev;
        while let Some(candidate) = cursor {
            if !self.node(candidate).hidden {
                break;
            }
            cursor = self.node(candidate).all.prev;
        }
        self.link_after(View::Active, index, cursor);
    }

    fn unlink(&mut self, view: View, index: u32) {
        let Links { prev, next } = self.links(index, view);
        match prev {
            Some(prev) => self.links_mut(prev, view).next = next,
            None => self.ends_mut(view).first = next,
        }
        match next {
            Some(next) => self.links_mut(next, view).prev = prev,
            None => self.ends_mut(view).last = prev,
        }
        *self.links_mut(index, view) = Links::default();
        self.ends_mut(view).len -= 1;
    }

    fn invalidate(&self) {
        self.indexes_valid.set(false);
    }

    fn ensure_indexes(&self) {
        if self.indexes_valid.get() {
            return;
        }
        for view in [View::All, View::Active] {
            let mut cursor = self.ends(view).first;
            let mut position = 0;
            while let Some(index) = cursor {
                let node = self.node(index);
                match view {
                    View::All => node.all_index.set(position),
                    View::Active => node.active_index.set(position),
                }
                position += 1;
                cursor = self.links(index, view).next;
            }
        }
        self.indexes_valid.set(true);
    }
}

fn stale(id: NodeId) -> TallyError {
    TallyError::ConcurrentModification(format!(
        "node {}:{} is no longer in the list",
        id.index, id.generation
    ))
}

impl<T: fmt::Debug> fmt::Debug for SortedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter(View::All)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
    struct Entry {
        key: i32,
        tag: &'static str,
    }

    impl ListItem for Entry {}

    fn by_key() -> Comparator<Entry> {
        Arc::new(|a: &Entry, b: &Entry| a.key.cmp(&b.key))
    }

    fn entry(key: i32, tag: &'static str) -> Entry {
        Entry { key, tag }
    }

    fn tags(list: &SortedList<Entry>, view: View) -> Vec<&'static str> {
        list.iter(view).map(|e| e.tag).collect()
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut list = SortedList::new(by_key());
        for (key, tag) in [(5, "e"), (1, "a"), (3, "c"), (2, "b"), (4, "d")] {
            list.insert(entry(key, tag));
        }
        assert_eq!(tags(&list, View::All), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(list.len(), 5);
        assert_eq!(list.active_len(), 5);
    }

    #[test]
    fn test_equal_keys_keep_insertion_order() {
        let mut list = SortedList::new(by_key());
        list.insert(entry(1, "first"));
        list.insert(entry(0, "zero"));
        list.insert(entry(1, "second"));
        list.insert(entry(1, "third"));
        assert_eq!(
            tags(&list, View::All),
            vec!["zero", "first", "second", "third"]
        );
    }

    #[test]
    fn test_hidden_items_skip_active_view() {
        let mut list = SortedList::new(by_key());
        list.insert_with(entry(1, "a"), false);
        let b = list.insert_with(entry(2, "b"), true);
        list.insert_with(entry(3, "c"), false);

        assert_eq!(tags(&list, View::All), vec!["a", "b", "c"]);
        assert_eq!(tags(&list, View::Active), vec!["a", "c"]);

        list.set_hidden(b, false).unwrap();
        assert_eq!(tags(&list, View::Active), vec!["a", "b", "c"]);
        list.set_hidden(b, true).unwrap();
        assert_eq!(tags(&list, View::Active), vec!["a", "c"]);
        assert_eq!(tags(&list, View::All), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unhide_links_after_nearest_visible() {
        let mut list = SortedList::new(by_key());
        let ids: Vec<_> = (0..5)
            .map(|key| list.insert_with(entry(key, ["a", "b", "c", "d", "e"][key as usize]), true))
            .collect();
        list.set_hidden(ids[3], false).unwrap();
        list.set_hidden(ids[1], false).unwrap();
        list.set_hidden(ids[4], false).unwrap();
        assert_eq!(tags(&list, View::Active), vec!["b", "d", "e"]);
    }

    #[test]
    fn test_remove_and_stale_handle() {
        let mut list = SortedList::new(by_key());
        let a = list.insert(entry(1, "a"));
        list.insert(entry(2, "b"));

        assert_eq!(list.remove(a).unwrap().tag, "a");
        assert!(!list.contains(a));
        assert!(list.get(a).is_none());
        assert!(matches!(
            list.remove(a),
            Err(TallyError::ConcurrentModification(_))
        ));

        // Slot reuse must not resurrect the old handle.
        let c = list.insert(entry(3, "c"));
        assert!(list.get(a).is_none());
        assert_eq!(list.get(c).unwrap().tag, "c");
    }

    #[test]
    fn test_index_of_tracks_mutations() {
        let mut list = SortedList::new(by_key());
        let c = list.insert(entry(3, "c"));
        let a = list.insert(entry(1, "a"));
        assert_eq!(list.index_of(c, View::All), Some(1));

        let b = list.insert_with(entry(2, "b"), true);
        assert_eq!(list.index_of(c, View::All), Some(2));
        assert_eq!(list.index_of(c, View::Active), Some(1));
        assert_eq!(list.index_of(b, View::Active), None);

        list.remove(a).unwrap();
        assert_eq!(list.index_of(b, View::All), Some(0));
        assert_eq!(list.index_of(c, View::Active), Some(0));
    }

    #[test]
    fn test_resort_after_key_change() {
        let mut list = SortedList::new(by_key());
        let a = list.insert(entry(1, "a"));
        list.insert(entry(2, "b"));
        list.insert(entry(3, "c"));

        list.get_mut(a).unwrap().key = 10;
        assert!(!list.in_order(a));
        let a = list.resort(a).unwrap();
        assert!(list.in_order(a));
        assert_eq!(tags(&list, View::All), vec!["b", "c", "a"]);
        assert_eq!(list.index_of(a, View::All), Some(2));
    }

    #[test]
    fn test_navigation_and_at() {
        let mut list = SortedList::new(by_key());
        for key in 0..6 {
            list.insert_with(entry(key, "x"), key % 2 == 1);
        }
        let first = list.first(View::Active).unwrap();
        let second = list.next(first, View::Active).unwrap();
        assert_eq!(list.get(second).unwrap().key, 2);
        assert_eq!(list.previous(second, View::Active), Some(first));
        assert_eq!(list.get(list.at(4, View::All).unwrap()).unwrap().key, 4);
        assert_eq!(list.get(list.at(2, View::Active).unwrap()).unwrap().key, 4);
        assert!(list.at(3, View::Active).is_none());
    }

    #[test]
    fn test_reverse_iteration() {
        let list = {
            let mut list = SortedList::ordered();
            for key in [3, 1, 2] {
                list.insert_with(entry(key, "x"), false);
            }
            list
        };
        let keys: Vec<_> = list.iter(View::All).rev().map(|e| e.key).collect();
        assert_eq!(keys, vec![3, 2, 1]);
    }

    #[test]
    fn test_clear() {
        let mut list = SortedList::new(by_key());
        let a = list.insert(entry(1, "a"));
        list.clear();
        assert!(list.is_empty());
        assert!(!list.contains(a));
        assert!(list.first(View::All).is_none());
    }

    #[test]
    fn test_ids_stay_stale_after_clear() {
        let mut list = SortedList::new(by_key());
        let a = list.insert(entry(1, "a"));
        let b = list.insert(entry(2, "b"));
        list.clear();
        let c = list.insert(entry(99, "c"));
        let d = list.insert(entry(98, "d"));

        assert!(list.get(a).is_none());
        assert!(list.get(b).is_none());
        assert!(list.remove(a).is_err());
        assert!(list.set_hidden(b, true).is_err());
        assert!(list.resort(a).is_err());
        assert_eq!(tags(&list, View::All), vec!["d", "c"]);
        assert_eq!(list.get(c).unwrap().key, 99);
        assert_eq!(list.get(d).unwrap().key, 98);
    }
}
