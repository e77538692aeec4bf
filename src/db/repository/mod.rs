//! Key-scoped database operations.
//!
//! `storage` is the raw key/value surface (one text value per key);
//! `preference` maps owner settings onto individual scalar keys.

mod preference;
mod storage;

pub use preference::*;
pub use storage::*;
