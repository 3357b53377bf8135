//! Training data helpers
//!
//! Label text for frames captured at lock time. Writing images and label
//! files to disk is up to the caller.

pub mod labels;

pub use labels::{label_file, LabelLine, LabelParseError};
