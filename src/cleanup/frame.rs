// This module implements the cleanup frame, the per-scope record of cleanup obligations,
// together with its normal-exit and unwind-exit emission. A frame keeps its entries most
// recently registered first, so walking the list forward on a normal exit destroys in
// reverse construction order, while the unwind walk goes from the back: it builds the
// oldest entry's block first, chains it to the caller supplied target, and hands back the
// newest entry's block as the chain entry. Unwind blocks are built lazily and cached per
// entry until clear_cached_cleanups runs. The per-entry emitting flag stops the unwind walk
// at a cleanup whose own normal-path code is being compiled, so that cleanup is never asked
// to clean up after itself.

//! Cleanup frames: normal close, unwind chain construction and cache invalidation.

use super::action::CleanupAction;
use super::FrameId;
use crate::context::Context;
use crate::core::{CompileError, CompileResult};
use crate::ir::BlockId;
use log::{debug, trace};
use std::collections::VecDeque;
use std::rc::Rc;

/// One registered cleanup plus its lazily built unwind machinery.
pub struct CleanupEntry {
    action: Rc<dyn CleanupAction>,
    unwind_block: Option<BlockId>,
    landing_pad: Option<BlockId>,
    /// True only while the action is being emitted on the normal path.
    emitting: bool,
}

impl CleanupEntry {
    fn new(action: Rc<dyn CleanupAction>) -> Self {
        Self {
            action,
            unwind_block: None,
            landing_pad: None,
            emitting: false,
        }
    }

    pub fn unwind_block(&self) -> Option<BlockId> {
        self.unwind_block
    }

    pub fn landing_pad(&self) -> Option<BlockId> {
        self.landing_pad
    }

    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    pub fn describe(&self) -> String {
        self.action.describe()
    }
}

impl std::fmt::Debug for CleanupEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupEntry")
            .field("action", &self.action.describe())
            .field("unwind_block", &self.unwind_block)
            .field("landing_pad", &self.landing_pad)
            .field("emitting", &self.emitting)
            .finish()
    }
}

/// Cleanups of one lexical scope.
#[derive(Debug)]
pub struct CleanupFrame {
    /// Most recently registered first.
    entries: VecDeque<CleanupEntry>,
    /// Enclosing frame. Not owned.
    parent: Option<FrameId>,
    /// Landing pad of a frame without entries.
    landing_pad: Option<BlockId>,
}

impl CleanupFrame {
    pub(crate) fn new(parent: Option<FrameId>) -> Self {
        Self {
            entries: VecDeque::new(),
            parent,
            landing_pad: None,
        }
    }

    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    pub fn entries(&self) -> impl Iterator<Item = &CleanupEntry> + '_ {
        self.entries.iter()
    }

    pub fn entry(&self, idx: usize) -> Option<&CleanupEntry> {
        self.entries.get(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Landing pad stored on the frame itself (used while it has no entries).
    pub fn landing_pad(&self) -> Option<BlockId> {
        self.landing_pad
    }

    /// Landing pad that applies to the frame in its current state.
    pub fn cached_landing_pad(&self) -> Option<BlockId> {
        match self.entries.front() {
            Some(entry) => entry.landing_pad,
            None => self.landing_pad,
        }
    }

    pub(crate) fn set_landing_pad(&mut self, block: BlockId) {
        match self.entries.front_mut() {
            Some(entry) => entry.landing_pad = Some(block),
            None => self.landing_pad = Some(block),
        }
    }

    pub fn is_emitting(&self) -> bool {
        self.entries.iter().any(|e| e.emitting)
    }

    /// Whether the unwind walk would still run something in this frame.
    pub(crate) fn has_pending_cleanups(&self) -> bool {
        self.entries.back().is_some_and(|e| !e.emitting)
    }

    pub(crate) fn register(&mut self, action: Rc<dyn CleanupAction>) {
        self.entries.push_front(CleanupEntry::new(action));
    }

    fn clear_caches(&mut self) {
        for entry in &mut self.entries {
            entry.unwind_block = None;
            entry.landing_pad = None;
        }
        self.landing_pad = None;
    }
}

impl Context<'_, '_> {
    /// Register a cleanup on the current frame.
    pub fn add_cleanup(&mut self, action: Rc<dyn CleanupAction>) -> CompileResult<()> {
        let frame = self.require_frame()?;
        if self.emitting_cleanups {
            return Err(CompileError::frame_stack(
                "cannot register a cleanup while cleanups are being emitted",
            ));
        }
        trace!("Registering cleanup {} on frame {}", action.describe(), frame.0);
        self.frames[frame.0 as usize].register(action);
        Ok(())
    }

    /// Emit every cleanup of `frame` inline at the insertion point, most
    /// recently registered first.
    pub fn close(&mut self, frame: FrameId) -> CompileResult<()> {
        if self.builder.suppress_cleanups() {
            trace!("Cleanups suppressed, not closing frame {}", frame.0);
            return Ok(());
        }

        let saved_guard = std::mem::replace(&mut self.emitting_cleanups, true);
        let saved_closing = self.closing_frame.replace(frame);

        let count = self.frame(frame).len();
        let mut result = Ok(());
        for idx in 0..count {
            let action = {
                let entry = &mut self.frames[frame.0 as usize].entries[idx];
                entry.emitting = true;
                Rc::clone(&entry.action)
            };
            trace!("Emitting cleanup {} of frame {}", action.describe(), frame.0);
            result = action.emit(self);
            self.frames[frame.0 as usize].entries[idx].emitting = false;
            if result.is_err() {
                break;
            }
            self.session.record_cleanup_emitted();
        }

        self.closing_frame = saved_closing;
        self.emitting_cleanups = saved_guard;
        result
    }

    /// Return the entry block of `frame`'s unwind chain ending in `next`,
    /// building missing cleanup blocks. The insertion point is left untouched.
    pub fn emit_unwind_cleanups(&mut self, frame: FrameId, next: BlockId) -> CompileResult<BlockId> {
        let saved_guard = std::mem::replace(&mut self.emitting_cleanups, true);
        let saved_next = self.data.next_cleanup_block.replace(next);
        let saved_block = self.builder.insert_block();

        let result = self.build_unwind_chain(frame, next);

        self.data.next_cleanup_block = saved_next;
        self.emitting_cleanups = saved_guard;
        self.builder.set_insert_block(saved_block);
        result
    }

    fn build_unwind_chain(&mut self, frame: FrameId, mut next: BlockId) -> CompileResult<BlockId> {
        let count = self.frame(frame).len();

        for idx in (0..count).rev() {
            let Some(entry) = self.frame(frame).entry(idx) else {
                break;
            };
            if entry.emitting {
                trace!(
                    "Cleanup {} of frame {} is being emitted, stopping unwind walk",
                    entry.action.describe(),
                    frame.0
                );
                break;
            }

            let cached = entry.unwind_block;
            let action = Rc::clone(&entry.action);

            let block = match cached {
                Some(block) => block,
                None => {
                    let block = self.builder.create_block("cleanup")?;
                    self.builder.set_insert_block(Some(block));

                    // The action ends the block with its transfer to the next
                    // cleanup; no branch is appended here.
                    action.emit(self)?;
                    if !self.builder.is_terminated(block) {
                        return Err(CompileError::UnterminatedCleanup {
                            block: format!("cleanup {} ({})", block.0, action.describe()),
                        });
                    }

                    self.frames[frame.0 as usize].entries[idx].unwind_block = Some(block);
                    self.session.record_unwind_block();
                    trace!("Built unwind block {} for {}", block.0, action.describe());
                    block
                }
            };

            self.data.next_cleanup_block = Some(block);
            next = block;
        }

        Ok(next)
    }

    /// Forget every unwind block and landing pad of `frame` and its ancestors.
    pub fn clear_cached_cleanups(&mut self, frame: FrameId) {
        debug!("Clearing cached cleanups from frame {}", frame.0);
        let mut cursor = Some(frame);
        while let Some(id) = cursor {
            let frame = &mut self.frames[id.0 as usize];
            frame.clear_caches();
            cursor = frame.parent;
        }
        self.session.record_cache_clear();
    }
}
