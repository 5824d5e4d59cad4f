// Ordered secondary index
// Maps column values to the ids of the rows holding them, kept sorted so
// both equality and range predicates resolve without a full scan

use super::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Index over one column, backed by `BTreeMap`
#[derive(Debug, Clone, Default)]
pub struct BTreeIndex {
    tree: BTreeMap<IndexKey, Vec<usize>>,
}

/// `Value` wrapper with the total order `BTreeMap` needs
#[derive(Debug, Clone)]
pub struct IndexKey(pub Value);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.sort_cmp(&other.0)
    }
}

impl BTreeIndex {
    /// Record that `row_id` holds `value` in the indexed column
    pub fn insert(&mut self, value: Value, row_id: usize) {
        self.tree.entry(IndexKey(value)).or_default().push(row_id);
    }

    /// Row ids whose value equals `value`
    pub fn lookup(&self, value: &Value) -> Option<&Vec<usize>> {
        self.tree.get(&IndexKey(value.clone()))
    }

    /// Row ids whose value falls within the given bounds.
    ///
    /// NULL keys are never returned: a range predicate on NULL is unknown.
    pub fn range(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> Vec<usize> {
        let lower = match lower {
            Bound::Included(v) => Bound::Included(IndexKey(v.clone())),
            Bound::Excluded(v) => Bound::Excluded(IndexKey(v.clone())),
            Bound::Unbounded => Bound::Unbounded,
        };
        let upper = match upper {
            Bound::Included(v) => Bound::Included(IndexKey(v.clone())),
            Bound::Excluded(v) => Bound::Excluded(IndexKey(v.clone())),
            Bound::Unbounded => Bound::Unbounded,
        };

        // BTreeMap::range panics on inverted bounds; an empty range has no rows
        if let (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) =
            (&lower, &upper)
        {
            let touching = matches!(lower, Bound::Excluded(_)) || matches!(upper, Bound::Excluded(_));
            if lo > hi || (lo == hi && touching) {
                return Vec::new();
            }
        }

        self.tree
            .range((lower, upper))
            .filter(|(key, _)| !key.0.is_null())
            .flat_map(|(_, row_ids)| row_ids.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_btree_insert_and_lookup() {
        let mut index = BTreeIndex::default();

        index.insert(text("USC00519281"), 0);
        index.insert(text("USC00519397"), 1);
        index.insert(text("USC00519281"), 2);

        assert_eq!(index.lookup(&text("USC00519281")), Some(&vec![0, 2]));
        assert_eq!(index.lookup(&text("USC00000000")), None);
    }

    #[test]
    fn test_btree_date_range() {
        let mut index = BTreeIndex::default();

        index.insert(text("2016-08-22"), 0);
        index.insert(text("2016-08-23"), 1);
        index.insert(text("2017-01-01"), 2);
        index.insert(text("2017-08-23"), 3);
        index.insert(Value::Null, 4);

        let cutoff = text("2016-08-23");
        let mut from_cutoff = index.range(Bound::Included(&cutoff), Bound::Unbounded);
        from_cutoff.sort_unstable();
        assert_eq!(from_cutoff, vec![1, 2, 3]);

        let end = text("2017-01-01");
        let bounded = index.range(Bound::Excluded(&cutoff), Bound::Included(&end));
        assert_eq!(bounded, vec![2]);

        let upto = index.range(Bound::Unbounded, Bound::Excluded(&cutoff));
        assert_eq!(upto, vec![0]);
    }

    #[test]
    fn test_btree_inverted_range_is_empty() {
        let mut index = BTreeIndex::default();
        index.insert(text("2017-01-01"), 0);

        let lo = text("2017-12-31");
        let hi = text("2017-01-01");
        assert!(index
            .range(Bound::Included(&lo), Bound::Included(&hi))
            .is_empty());
        assert!(index
            .range(Bound::Excluded(&hi), Bound::Excluded(&hi))
            .is_empty());
    }
}
