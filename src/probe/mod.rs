//! One-shot media examination and the shared probe cache.

pub mod cache;
pub mod scanner;

pub use cache::{probe_cache, ProbeCache, ProbeCacheStats};
pub use scanner::scan;
