//! Key resolution - attach surrogate keys to fact-bearing rows
//!
//! Resolution is left-style: every input row comes back, with the surrogate id it
//! matched or None. Rows without a match are also recorded in an unmatched report so
//! the caller decides, explicitly, whether to exclude them.

use crate::warehouse::dimension::Dimension;
use crate::warehouse::types::UnmatchedReport;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::hash::Hash;

/// Anything that maps a natural key to an identifier
pub trait KeyLookup<K: ?Sized> {
    type Id: Copy;

    fn lookup(&self, key: &K) -> Option<Self::Id>;
}

impl<K> KeyLookup<K> for Dimension<K>
where
    K: Ord + Hash + Clone,
{
    type Id = i32;

    fn lookup(&self, key: &K) -> Option<i32> {
        self.id_of(key)
    }
}

/// Listings are keyed by their source id; membership is the lookup
impl<V> KeyLookup<i64> for BTreeMap<i64, V> {
    type Id = i64;

    fn lookup(&self, key: &i64) -> Option<i64> {
        self.contains_key(key).then_some(*key)
    }
}

/// One input row with the surrogate id it resolved to, if any
#[derive(Debug, Clone)]
pub struct Resolved<R, Id> {
    pub row: R,
    pub id: Option<Id>,
}

/// Outcome of resolving a batch of rows against one dimension
#[derive(Debug)]
pub struct Resolution<R, Id> {
    pub rows: Vec<Resolved<R, Id>>,
    pub unmatched: UnmatchedReport,
}

impl<R, Id> Resolution<R, Id> {
    /// Keep only rows whose key resolved; the report says what was dropped
    pub fn into_required(self) -> (Vec<(R, Id)>, UnmatchedReport) {
        let matched = self
            .rows
            .into_iter()
            .filter_map(|r| r.id.map(|id| (r.row, id)))
            .collect();
        (matched, self.unmatched)
    }
}

/// Resolve rows against a dimension by the natural key `key_of` extracts.
///
/// A row whose key is missing entirely is recorded as `<missing>` in the report.
pub fn resolve<R, K, D, F>(rows: Vec<R>, dimension: &D, key_of: F) -> Resolution<R, D::Id>
where
    D: KeyLookup<K>,
    K: Display,
    F: Fn(&R) -> Option<K>,
{
    let mut unmatched = UnmatchedReport::default();
    let rows = rows
        .into_iter()
        .map(|row| {
            let id = match key_of(&row) {
                Some(key) => {
                    let id = dimension.lookup(&key);
                    if id.is_none() {
                        unmatched.record(&key);
                    }
                    id
                }
                None => {
                    unmatched.record("<missing>");
                    None
                }
            };
            Resolved { row, id }
        })
        .collect();

    Resolution { rows, unmatched }
}
