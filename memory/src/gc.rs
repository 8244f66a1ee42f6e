/// Optional reclaim capability of the host process.
///
/// Not every build has one, so callers hold an `Option<Box<dyn GcHook>>` and
/// check it at call time.
pub trait GcHook {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Runs the collection. Must not block for long.
    fn collect(&self);
}

/// Returns freed glibc heap pages to the kernel via `malloc_trim(0)`.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[derive(Debug, Default)]
pub struct HeapTrim;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
impl GcHook for HeapTrim {
    fn name(&self) -> &'static str {
        "malloc_trim"
    }

    fn collect(&self) {
        // SAFETY: malloc_trim only walks allocator-internal state.
        let released = unsafe { libc::malloc_trim(0) } != 0;
        tracing::debug!(released, "heap trimmed");
    }
}

/// The reclaim hook available on this platform, if any.
pub fn platform_gc_hook() -> Option<Box<dyn GcHook>> {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        Some(Box::new(HeapTrim))
    }
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn glibc_builds_have_heap_trim() {
        let hook = platform_gc_hook().unwrap();
        assert_eq!(hook.name(), "malloc_trim");
        hook.collect();
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    #[test]
    fn other_builds_have_no_hook() {
        assert!(platform_gc_hook().is_none());
    }
}
