//! Repository contracts the storage crate implements.

mod traits;

pub use traits::*;
