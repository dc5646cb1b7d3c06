// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession owns a reference to the arena every IR name is interned into, so blocks,
// functions, globals and allocas can carry plain &'arena str names without lifetime juggling
// in the builder. The session also accumulates SessionStats: how many functions were
// compiled, how many blocks were created, how many cleanups were emitted on the normal exit
// path, how many unwind blocks and landing pads were materialized, how many incomplete catch
// selectors were created and later completed, and how many cache invalidation walks ran.
// The counters make the lazy construction observable, which the tests rely on to show that
// cached unwind blocks are reused instead of rebuilt.

//! Arena-based compilation session management.
//!
//! All names produced during a compilation are interned in the session arena
//! and share its lifetime.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// String interning for efficient storage.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Current function being compiled.
    current_function: RefCell<Option<&'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_function: RefCell::new(None),
        }
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Set current function being compiled.
    pub fn set_current_function(&self, name: Option<&str>) {
        let name = name.map(|n| self.intern_str(n));
        *self.current_function.borrow_mut() = name;
    }

    /// Function currently being compiled, if any.
    pub fn current_function(&self) -> Option<&'arena str> {
        *self.current_function.borrow()
    }

    /// Record that a function body was finished.
    pub fn record_function_compiled(&self, name: &str, block_count: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;
        if stats.largest_function_blocks < block_count {
            stats.largest_function_blocks = block_count;
            stats.largest_function_name = name.to_string();
        }
    }

    pub fn record_block_created(&self) {
        self.stats.borrow_mut().blocks_created += 1;
    }

    /// Record a cleanup emitted inline on a normal scope exit.
    pub fn record_cleanup_emitted(&self) {
        self.stats.borrow_mut().cleanups_emitted += 1;
    }

    pub fn record_unwind_block(&self) {
        self.stats.borrow_mut().unwind_blocks_built += 1;
    }

    pub fn record_landing_pad(&self) {
        self.stats.borrow_mut().landing_pads_built += 1;
    }

    pub fn record_selector_created(&self) {
        self.stats.borrow_mut().selectors_created += 1;
    }

    pub fn record_selector_completed(&self) {
        self.stats.borrow_mut().selectors_completed += 1;
    }

    pub fn record_cache_clear(&self) {
        self.stats.borrow_mut().cache_clears += 1;
    }

    /// Get a snapshot of the current statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }

    /// Get arena memory usage in bytes.
    pub fn arena_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }
}

/// Compilation statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub functions_compiled: usize,
    pub blocks_created: usize,
    pub cleanups_emitted: usize,
    pub unwind_blocks_built: usize,
    pub landing_pads_built: usize,
    pub selectors_created: usize,
    pub selectors_completed: usize,
    pub cache_clears: usize,
    pub largest_function_blocks: usize,
    pub largest_function_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Blocks created: {}", self.blocks_created)?;
        writeln!(f, "  Cleanups emitted: {}", self.cleanups_emitted)?;
        writeln!(f, "  Unwind blocks built: {}", self.unwind_blocks_built)?;
        writeln!(f, "  Landing pads built: {}", self.landing_pads_built)?;
        writeln!(
            f,
            "  Catch selectors: {} created, {} completed",
            self.selectors_created, self.selectors_completed
        )?;
        writeln!(f, "  Cache invalidations: {}", self.cache_clears)?;
        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} blocks)",
                self.largest_function_name, self.largest_function_blocks
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let s1 = session.intern_str("cleanup");
        let s2 = session.intern_str("cleanup");
        let s3 = session.intern_str("lp");

        assert!(std::ptr::eq(s1, s2));
        assert!(!std::ptr::eq(s1, s3));
    }

    #[test]
    fn test_stats_tracking() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_landing_pad();
        session.record_unwind_block();
        session.record_unwind_block();
        session.record_function_compiled("main", 4);
        session.record_function_compiled("small", 1);

        let stats = session.stats();
        assert_eq!(stats.landing_pads_built, 1);
        assert_eq!(stats.unwind_blocks_built, 2);
        assert_eq!(stats.functions_compiled, 2);
        assert_eq!(stats.largest_function_name, "main");
    }

    #[test]
    fn test_current_function_and_arena_usage() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        assert_eq!(session.current_function(), None);

        session.set_current_function(Some("guarded"));
        assert_eq!(session.current_function(), Some("guarded"));
        assert!(session.arena_bytes() > 0);

        session.set_current_function(None);
        assert_eq!(session.current_function(), None);
    }
}
