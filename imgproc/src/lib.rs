pub mod color;
pub mod edges;
pub mod morph;

pub use color::*;
pub use edges::*;
pub use morph::*;

pub use depth_core::{Error, Result};
