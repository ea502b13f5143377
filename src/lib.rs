pub use depth_core as core;
pub use depth_imgproc as imgproc;
pub use depth_stereo as stereo;

/// Initialize a single global Rayon thread pool for all row-parallel passes.
///
/// Call this once at application startup before processing the first frame.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `DEPTH_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    depth_core::init_global_thread_pool(num_threads)
}
