//! Re-exports all traits.

pub use crate::datatype::traits::*;
pub use crate::raw::traits::*;
