//! List-to-list differencing.
//!
//! `new.derive_differences(old)` indexes `old` by id and walks both lists
//! once. Changed entries carry the new values with the old ones recorded as
//! a single history snapshot; Added entries carry new values; Deleted
//! entries carry old values and follow in `old`'s order.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::bulk::BulkReport;
use crate::cancel::{Cancellation, NeverCancel};
use crate::error::{Result, TallyError};
use crate::sorted::View;
use crate::value::ItemId;

use super::history::FieldSnapshot;
use super::item::VersionedItem;
use super::list::{insertion_order, ListStyle, VersionedList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffTag {
    Added,
    Changed,
    Deleted,
}

impl fmt::Display for DiffTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffTag::Added => "added",
            DiffTag::Changed => "changed",
            DiffTag::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Result of [`VersionedList::derive_differences`].
#[derive(Debug)]
pub struct Differences {
    list: VersionedList,
    tags: HashMap<ItemId, DiffTag>,
    report: BulkReport,
}

impl Differences {
    /// Difference-style list of the entries, Added/Changed first.
    pub fn list(&self) -> &VersionedList {
        &self.list
    }

    pub fn tag(&self, id: ItemId) -> Option<DiffTag> {
        self.tags.get(&id).copied()
    }

    /// Entries in result order.
    pub fn iter(&self) -> impl Iterator<Item = (DiffTag, &VersionedItem)> {
        self.list
            .iter(View::All)
            .filter_map(|item| self.tag(item.id()).map(|tag| (tag, item)))
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn report(&self) -> &BulkReport {
        &self.report
    }

    pub fn into_report(self) -> BulkReport {
        self.report
    }

    fn push(&mut self, tag: DiffTag, item: VersionedItem) -> Result<()> {
        self.tags.insert(item.id(), tag);
        self.list.add_item(item)
    }
}

impl VersionedList {
    /// Differences from `old` to `self`. Per-item comparison failures are
    /// collected in the report; cancellation stops the walk and tags the
    /// report cancelled.
    pub fn derive_differences(&self, old: &VersionedList, cancel: &dyn Cancellation) -> Result<Differences> {
        if self.style() == ListStyle::Difference || old.style() == ListStyle::Difference {
            return Err(TallyError::IllegalState(
                "difference lists cannot be diffed".to_string(),
            ));
        }

        let mut list = VersionedList::with_comparator(ListStyle::Difference, insertion_order());
        list.set_generation(self.generation());
        let mut result = Differences {
            list,
            tags: HashMap::new(),
            report: BulkReport::default(),
        };

        for item in self.iter(View::All) {
            if cancel.is_cancelled() {
                result.report.mark_cancelled();
                return Ok(result);
            }
            // Deleted items are reported from the old side.
            if item.is_deleted() {
                continue;
            }
            result.report.processed += 1;

            let Some(previous) = old.find(item.id()) else {
                result.push(DiffTag::Added, item.clean_copy())?;
                result.report.added += 1;
                continue;
            };

            match item.compare_with(previous) {
                Ok((difference, _)) if difference.is_identical() => {}
                Ok((difference, priors)) => {
                    let mut entry = item.clean_copy();
                    entry.record_snapshot(FieldSnapshot::closed(
                        self.generation(),
                        priors.fields,
                        priors.deletion,
                        difference,
                    ));
                    result.push(DiffTag::Changed, entry)?;
                    result.report.changed += 1;
                }
                Err(e) => result.report.record_error(Some(item.id()), e),
            }
        }

        for previous in old.iter(View::All) {
            if previous.is_deleted() {
                continue;
            }
            let gone = self.find(previous.id()).map_or(true, VersionedItem::is_deleted);
            if !gone {
                continue;
            }
            if cancel.is_cancelled() {
                result.report.mark_cancelled();
                return Ok(result);
            }
            result.report.processed += 1;
            result.push(DiffTag::Deleted, previous.clean_copy())?;
            result.report.deleted += 1;
        }

        tracing::info!(
            added = result.report.added,
            changed = result.report.changed,
            deleted = result.report.deleted,
            errors = result.report.errors.len(),
            "derived differences"
        );
        Ok(result)
    }

    /// Fold an edit list back into this core list as a new generation.
    /// Every touched item goes through tracked history, so the batch can be
    /// rolled back with [`rewind_to_generation`](Self::rewind_to_generation).
    pub fn apply_changes(&mut self, edit: &VersionedList) -> Result<BulkReport> {
        if self.style() != ListStyle::Core || edit.style() != ListStyle::Edit {
            return Err(TallyError::IllegalState(format!(
                "cannot apply a {} list to a {} list",
                edit.style(),
                self.style()
            )));
        }

        let Differences {
            list,
            tags,
            report: found,
        } = edit.derive_differences(self, &NeverCancel)?;
        let generation = self.advance_generation();
        let mut report = BulkReport {
            processed: found.processed,
            errors: found.errors,
            ..Default::default()
        };

        for entry in list.iter(View::All) {
            let id = entry.id();
            let Some(tag) = tags.get(&id).copied() else {
                continue;
            };
            let outcome = match tag {
                DiffTag::Added => {
                    let mut added = entry.clean_copy();
                    added.rebase(generation);
                    self.add_item(added)
                }
                DiffTag::Changed => self
                    .edit(id, |target| {
                        target.adopt(entry, generation);
                        Ok(())
                    })
                    .map(|_| ()),
                DiffTag::Deleted => self.delete(id).map(|_| ()),
            };
            match outcome {
                Ok(()) => match tag {
                    DiffTag::Added => report.added += 1,
                    DiffTag::Changed => report.changed += 1,
                    DiffTag::Deleted => report.deleted += 1,
                },
                Err(e) => report.record_error(Some(id), e),
            }
        }

        tracing::info!(
            generation,
            added = report.added,
            changed = report.changed,
            deleted = report.deleted,
            "applied edit list"
        );
        Ok(report)
    }
}
