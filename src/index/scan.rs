//! Range scan cursor over the leaf chain

use std::cmp::Ordering;

use crate::record::RecordId;

use super::error::{IndexError, IndexResult};
use super::key::IndexKey;
use super::persistent_btree::{PersistentBPlusTree, Position};

/// One end of a scan range
#[derive(Debug, Clone, PartialEq)]
pub struct ScanBound {
    pub key: IndexKey,
    pub inclusive: bool,
}

impl ScanBound {
    pub fn inclusive(key: impl Into<IndexKey>) -> Self {
        Self {
            key: key.into(),
            inclusive: true,
        }
    }

    pub fn exclusive(key: impl Into<IndexKey>) -> Self {
        Self {
            key: key.into(),
            inclusive: false,
        }
    }

    fn admits_from_below(&self, key: &IndexKey) -> bool {
        match key.compare(&self.key) {
            Ordering::Greater => true,
            Ordering::Equal => self.inclusive,
            Ordering::Less => false,
        }
    }

    fn admits_from_above(&self, key: &IndexKey) -> bool {
        match key.compare(&self.key) {
            Ordering::Less => true,
            Ordering::Equal => self.inclusive,
            Ordering::Greater => false,
        }
    }
}

/// Forward-only cursor yielding `(key, rid)` pairs in ascending key order
///
/// Both ends are resolved to leaf positions when the scan is opened. The
/// cursor holds the index handle mutably, so the tree cannot change under it.
pub struct IxScanIterator<'a> {
    tree: PersistentBPlusTree<'a>,
    current: Option<Position>,
    end: Option<Position>,
}

impl<'a> IxScanIterator<'a> {
    pub(crate) fn open(
        mut tree: PersistentBPlusTree<'a>,
        low: Option<&ScanBound>,
        high: Option<&ScanBound>,
    ) -> IndexResult<Self> {
        let start = tree.first_position(low.map(|b| &b.key), |k| {
            low.is_none_or(|b| b.admits_from_below(k))
        })?;
        let end = tree.last_position(high.map(|b| &b.key), |k| {
            high.is_none_or(|b| b.admits_from_above(k))
        })?;

        let (current, end) = match (start, end) {
            (Some((first, first_key)), Some((last, last_key)))
                if first_key.compare(&last_key) != Ordering::Greater =>
            {
                (Some(first), Some(last))
            }
            _ => (None, None),
        };

        Ok(Self { tree, current, end })
    }

    /// Next entry in the range, or `Err(EndOfScan)` once it is exhausted
    pub fn get_next_entry(&mut self) -> IndexResult<(IndexKey, RecordId)> {
        let pos = self.current.ok_or(IndexError::EndOfScan)?;

        let node = match self.tree.read_node(pos.page) {
            Ok(node) => node,
            Err(e) => {
                self.current = None;
                return Err(e);
            }
        };
        let Some(entry) = node.entry(pos.slot) else {
            self.current = None;
            return Err(IndexError::corrupted(pos.page, "scan slot beyond entry count"));
        };
        let item = (entry.key.clone(), entry.rid);

        self.current = if Some(pos) == self.end {
            None
        } else if pos.slot + 1 < node.len() {
            Some(Position {
                page: pos.page,
                slot: pos.slot + 1,
            })
        } else {
            match self.tree.next_position(pos) {
                Ok(next) => next,
                Err(e) => {
                    self.current = None;
                    return Err(e);
                }
            }
        };

        Ok(item)
    }

    /// End the scan and release the index handle
    pub fn close(self) {}
}

impl Iterator for IxScanIterator<'_> {
    type Item = IndexResult<(IndexKey, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.get_next_entry() {
            Ok(item) => Some(Ok(item)),
            Err(IndexError::EndOfScan) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_admit() {
        let low = ScanBound::exclusive(3);
        assert!(!low.admits_from_below(&IndexKey::Int(3)));
        assert!(low.admits_from_below(&IndexKey::Int(4)));

        let high = ScanBound::inclusive(7);
        assert!(high.admits_from_above(&IndexKey::Int(7)));
        assert!(!high.admits_from_above(&IndexKey::Int(8)));
        assert!(high.admits_from_above(&IndexKey::Int(-1)));
    }
}
