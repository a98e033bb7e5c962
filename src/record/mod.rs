//! Record-manager types consumed by the index layer

mod record;
mod schema;

pub use record::{RecordId, SlotNum};
pub use schema::{AttrType, Attribute};
