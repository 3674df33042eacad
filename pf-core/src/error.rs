//! Error types re-exported from the pf-error crate

pub use pf_error::{PentafanError, Result};
