//! Tri-state comparison outcome shared by history tracking and diffing.

use serde::{Deserialize, Serialize};

/// Result of comparing two values.
///
/// `SecurityChanged` means the values are equal but the protection around
/// them differs (e.g. the field was re-encrypted under new keys). A value
/// change always dominates a security-only change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difference {
    #[default]
    Identical,
    ValueChanged,
    SecurityChanged,
}

impl Difference {
    /// Compare two plain values.
    pub fn of<T: PartialEq + ?Sized>(left: &T, right: &T) -> Self {
        if left == right {
            Difference::Identical
        } else {
            Difference::ValueChanged
        }
    }

    /// Combine with another result, keeping the more significant one.
    pub fn combine(self, other: Difference) -> Difference {
        match (self, other) {
            (Difference::Identical, other) => other,
            (Difference::ValueChanged, _) => Difference::ValueChanged,
            (Difference::SecurityChanged, Difference::ValueChanged) => Difference::ValueChanged,
            (Difference::SecurityChanged, _) => Difference::SecurityChanged,
        }
    }

    pub fn is_identical(self) -> bool {
        self == Difference::Identical
    }

    pub fn is_value_change(self) -> bool {
        self == Difference::ValueChanged
    }
}

impl FromIterator<Difference> for Difference {
    fn from_iter<I: IntoIterator<Item = Difference>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Difference::Identical, Difference::combine)
    }
}
