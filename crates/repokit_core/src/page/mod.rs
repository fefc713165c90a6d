//! Paging and slicing value types.
//!
//! # Responsibility
//! - Describe a requested window (`PageRequest` + `Sort`).
//! - Carry a window of results plus navigation metadata (`Page`, `Slice`).
//!
//! Execution lives in the repository layer; these types never touch storage.

mod content;
mod request;

pub use content::{Page, Slice};
pub use request::{Direction, Order, PageRequest, PageRequestError, Sort};
