use super::{NodeId, SortedList, View};

/// Double-ended walk over `(NodeId, &T)` in one view.
pub struct Entries<'a, T> {
    list: &'a SortedList<T>,
    view: View,
    front: Option<u32>,
    back: Option<u32>,
    remaining: usize,
}

impl<'a, T> Entries<'a, T> {
    pub(super) fn new(list: &'a SortedList<T>, view: View) -> Self {
        let ends = list.ends(view);
        Self {
            list,
            view,
            front: ends.first,
            back: ends.last,
            remaining: ends.len,
        }
    }
}

impl<'a, T> Iterator for Entries<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.front?;
        self.remaining -= 1;
        self.front = self.list.links(index, self.view).next;
        Some((self.list.node_id(index), &self.list.node(index).item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Entries<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.back?;
        self.remaining -= 1;
        self.back = self.list.links(index, self.view).prev;
        Some((self.list.node_id(index), &self.list.node(index).item))
    }
}

impl<T> ExactSizeIterator for Entries<'_, T> {}

/// Items only.
pub struct Iter<'a, T> {
    inner: Entries<'a, T>,
}

impl<'a, T> Iter<'a, T> {
    pub(super) fn new(inner: Entries<'a, T>) -> Self {
        Self { inner }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, item)| item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, item)| item)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
