use std::fmt;

use serde::{Deserialize, Serialize};

use crate::file::PageNum;

/// Slot identifier within a page
pub type SlotNum = u32;

/// Physical identifier for a record (page + slot)
///
/// Opaque to the index: stored verbatim in leaf entries and handed back by scans.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_num: PageNum,
    pub slot_num: SlotNum,
}

impl RecordId {
    pub fn new(page_num: PageNum, slot_num: SlotNum) -> Self {
        Self { page_num, slot_num }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.page_num, self.slot_num)
    }
}
