//! The latching facade: per-page shared/exclusive latches, modeled as an
//! explicit begin/end call pair rather than a RAII guard.
//!
//! A `Node` session wraps a `begin*`/`end*` pair around every operation,
//! mirroring the pin/unpin pairing a `PageCache` layer above would use —
//! the latch itself is owned by whatever cache layer hands a page to the
//! node, so `PageLatch` is defined independently of the raw buffer a
//! `Node` reads and writes.

use lock_api::RawRwLock as _;
use parking_lot::RawRwLock;

use crate::errors::NodeError;

/// A page's latch, decoupled from its byte buffer so a cache layer can
/// own the latch while handing the buffer to a `Node` by reference.
pub trait PageLatch {
    fn page_index(&self) -> u64;

    fn acquire_shared(&self);
    fn release_shared(&self);
    fn acquire_exclusive(&self);
    fn release_exclusive(&self);
}

/// A session kind, tracked so `end_*` can catch a mismatched `begin_*`
/// call (spec.md §7's `LatchProtocolMisuse`). Shared with `Node`, which
/// tracks the same tag across its own `begin_*`/`end_*` pair instead of
/// going through a `LatchSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionKind {
    Read,
    Write,
    Create,
}

/// An in-memory `PageLatch` backed by `parking_lot`'s raw lock, acquired
/// and released manually through `lock_api::RawRwLock` instead of through
/// `RwLock`'s scope-guard API — the begin/end pairing is a session
/// protocol enforced by `LatchSession`, not by Rust's borrow checker.
pub struct MemLatch {
    page_index: u64,
    raw: RawRwLock,
}

impl MemLatch {
    pub fn new(page_index: u64) -> Self {
        Self {
            page_index,
            raw: RawRwLock::INIT,
        }
    }
}

impl PageLatch for MemLatch {
    fn page_index(&self) -> u64 {
        self.page_index
    }

    fn acquire_shared(&self) {
        self.raw.lock_shared();
    }

    fn release_shared(&self) {
        unsafe { self.raw.unlock_shared() };
    }

    fn acquire_exclusive(&self) {
        self.raw.lock_exclusive();
    }

    fn release_exclusive(&self) {
        unsafe { self.raw.unlock_exclusive() };
    }
}

/// Tracks one open `begin_*`/`end_*` session against a `PageLatch`,
/// rejecting an `end_*` call that doesn't match the session that is
/// currently open.
pub struct LatchSession<'a, L: PageLatch> {
    latch: &'a L,
    kind: Option<SessionKind>,
}

impl<'a, L: PageLatch> LatchSession<'a, L> {
    pub fn new(latch: &'a L) -> Self {
        Self { latch, kind: None }
    }

    fn begin(&mut self, kind: SessionKind) -> Result<(), NodeError> {
        if self.kind.is_some() {
            return Err(NodeError::latch_misuse(
                "begin called while a session is already open".to_string(),
            ));
        }
        match kind {
            SessionKind::Read => self.latch.acquire_shared(),
            SessionKind::Write | SessionKind::Create => self.latch.acquire_exclusive(),
        }
        self.kind = Some(kind);
        Ok(())
    }

    fn end(&mut self, kind: SessionKind) -> Result<(), NodeError> {
        match self.kind {
            Some(k) if k == kind => {}
            Some(_) => {
                return Err(NodeError::latch_misuse(
                    "end called with a session kind that does not match begin".to_string(),
                ))
            }
            None => {
                return Err(NodeError::latch_misuse(
                    "end called with no open session".to_string(),
                ))
            }
        }
        match kind {
            SessionKind::Read => self.latch.release_shared(),
            SessionKind::Write | SessionKind::Create => self.latch.release_exclusive(),
        }
        self.kind = None;
        Ok(())
    }

    pub fn begin_read(&mut self) -> Result<(), NodeError> {
        self.begin(SessionKind::Read)
    }

    pub fn end_read(&mut self) -> Result<(), NodeError> {
        self.end(SessionKind::Read)
    }

    pub fn begin_write(&mut self) -> Result<(), NodeError> {
        self.begin(SessionKind::Write)
    }

    pub fn end_write(&mut self) -> Result<(), NodeError> {
        self.end(SessionKind::Write)
    }

    pub fn begin_create(&mut self) -> Result<(), NodeError> {
        self.begin(SessionKind::Create)
    }

    pub fn end_create(&mut self) -> Result<(), NodeError> {
        self.end(SessionKind::Create)
    }
}
