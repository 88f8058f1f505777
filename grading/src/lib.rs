//! Test helpers.
//!
//! `#[validate_alloc]` wraps a test so that it fails if any physical page
//! allocated while it ran is still allocated when it returns.

pub use grading_derive::*;
#[doc(hidden)]
pub use kern;
