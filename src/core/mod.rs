//! Core types shared by every other module: errors and values

pub mod error;
pub mod error_code;
pub mod interval;
pub mod value;

pub use error::*;
pub use interval::Interval;
pub use value::{Tvl, Value, ValueMap, format_double};
