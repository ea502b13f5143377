//! Core types shared by the depth post-processing crates.

pub mod disparity;
pub mod error;
pub mod runtime;
pub mod storage;

pub use disparity::*;
pub use error::{check_buffer_len, Error, Result};
pub use runtime::{current_cpu_threads, init_global_thread_pool, ProcessingPath};
pub use storage::{try_alloc, try_clone_slice};

pub use image::{GrayImage, RgbImage};
