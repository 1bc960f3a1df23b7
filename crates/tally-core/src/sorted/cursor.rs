//! Bidirectional cursor over one view of a [`SortedList`].
//!
//! The cursor holds no borrow: each call takes the list, so the owner can
//! mutate the list between steps. The position is anchored on the node just
//! before the cursor; if that node is removed behind the cursor's back the
//! next step fails with `ConcurrentModification`.

use super::{NodeId, SortedList, View};
use crate::error::{Result, TallyError};

#[derive(Debug, Clone)]
pub struct ListCursor {
    view: View,
    /// Node before the cursor; `None` at the start.
    before: Option<NodeId>,
    /// Node returned by the last `next`/`previous`.
    last: Option<NodeId>,
}

impl ListCursor {
    pub fn new(view: View) -> Self {
        Self {
            view,
            before: None,
            last: None,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Advance and return the node passed over.
    pub fn next<T>(&mut self, list: &SortedList<T>) -> Result<Option<NodeId>> {
        let next = match self.before {
            Some(before) => {
                self.check(list, before)?;
                list.next(before, self.view)
            }
            None => list.first(self.view),
        };
        if let Some(id) = next {
            self.before = Some(id);
            self.last = Some(id);
        }
        Ok(next)
    }

    /// Step back and return the node passed over.
    pub fn previous<T>(&mut self, list: &SortedList<T>) -> Result<Option<NodeId>> {
        let Some(before) = self.before else {
            return Ok(None);
        };
        self.check(list, before)?;
        self.before = list.previous(before, self.view);
        self.last = Some(before);
        Ok(Some(before))
    }

    /// The node `next` would return, without moving.
    pub fn peek_next<T>(&self, list: &SortedList<T>) -> Result<Option<NodeId>> {
        match self.before {
            Some(before) => {
                self.check(list, before)?;
                Ok(list.next(before, self.view))
            }
            None => Ok(list.first(self.view)),
        }
    }

    /// The node `previous` would return, without moving.
    pub fn peek_previous<T>(&self, list: &SortedList<T>) -> Result<Option<NodeId>> {
        match self.before {
            Some(before) => {
                self.check(list, before)?;
                Ok(Some(before))
            }
            None => Ok(None),
        }
    }

    pub fn peek_first<T>(&self, list: &SortedList<T>) -> Option<NodeId> {
        list.first(self.view)
    }

    pub fn peek_last<T>(&self, list: &SortedList<T>) -> Option<NodeId> {
        list.last(self.view)
    }

    /// Remove the node last returned by `next` or `previous`.
    pub fn remove_last<T>(&mut self, list: &mut SortedList<T>) -> Result<T> {
        let last = self.take_last(list)?;
        list.remove(last)
    }

    /// Re-position the node last returned after its sort key changed.
    /// Returns the node's new id; it may be visited again if it moved ahead
    /// of the cursor.
    pub fn resort_last<T>(&mut self, list: &mut SortedList<T>) -> Result<NodeId> {
        let last = self.take_last(list)?;
        list.resort(last)
    }

    fn take_last<T>(&mut self, list: &SortedList<T>) -> Result<NodeId> {
        let last = self.last.take().ok_or_else(|| {
            TallyError::IllegalState("no current node; call next or previous first".to_string())
        })?;
        self.check(list, last)?;
        if self.before == Some(last) {
            self.before = list.previous(last, self.view);
        }
        Ok(last)
    }

    fn check<T>(&self, list: &SortedList<T>, id: NodeId) -> Result<()> {
        let visible = match self.view {
            View::All => list.contains(id),
            View::Active => list.is_hidden(id) == Some(false),
        };
        if visible {
            Ok(())
        } else {
            Err(TallyError::ConcurrentModification(
                "list changed underneath the cursor".to_string(),
            ))
        }
    }
}
