//! Case-file input.

pub mod case;

pub use case::{Case, CaseFile, load_case, parse_case};
