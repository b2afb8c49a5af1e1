//! Distribution of task indices over workers.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;

use super::config::SchedulingPolicy;

/// Split `0..len` into at most `parts` contiguous, non-empty blocks.
///
/// Block sizes differ by at most one; the first `len % parts` blocks get the
/// extra index.
pub fn static_blocks(
    len: usize,
    parts: usize,
) -> Vec<Range<usize>> {
    if len == 0 || parts == 0 {
        return Vec::new();
    }
    let parts = parts.min(len);
    let base = len / parts;
    let extra = len % parts;

    let mut blocks = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        blocks.push(start..start + size);
        start += size;
    }
    debug_assert_eq!(start, len);
    blocks
}

/// Shared claim counter for dynamic scheduling.
#[derive(Debug)]
pub struct Cursor {
    next: CachePadded<AtomicUsize>,
    len: usize,
}

impl Cursor {
    /// Cursor over `0..len`.
    pub fn new(len: usize) -> Self {
        Self {
            next: CachePadded::new(AtomicUsize::new(0)),
            len,
        }
    }

    /// Claim the next unclaimed index.
    #[inline]
    pub fn claim(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.len).then_some(index)
    }

    /// Indices not yet claimed.
    pub fn remaining(&self) -> usize {
        self.len.saturating_sub(self.next.load(Ordering::Relaxed))
    }
}

/// The indices one worker will execute.
#[derive(Debug)]
pub enum Assignment<'a> {
    /// A fixed block (static-chunked).
    Block(Range<usize>),
    /// Claims from a shared cursor (dynamic).
    Shared(&'a Cursor),
}

impl Iterator for Assignment<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        match self {
            Assignment::Block(range) => range.next(),
            Assignment::Shared(cursor) => cursor.claim(),
        }
    }
}

/// Work plan for one run: one assignment per worker to spawn.
#[derive(Debug)]
pub struct Plan {
    blocks: Option<Vec<Range<usize>>>,
    cursor: Cursor,
    workers: usize,
}

impl Plan {
    /// Plan `len` tasks over at most `parallelism` workers.
    pub fn new(
        len: usize,
        parallelism: usize,
        policy: SchedulingPolicy,
    ) -> Self {
        match policy {
            SchedulingPolicy::StaticChunked => {
                let blocks = static_blocks(len, parallelism);
                Self {
                    workers: blocks.len(),
                    blocks: Some(blocks),
                    cursor: Cursor::new(0),
                }
            },
            SchedulingPolicy::Dynamic => Self {
                workers: parallelism.min(len),
                blocks: None,
                cursor: Cursor::new(len),
            },
        }
    }

    /// Number of workers worth spawning.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Assignment for worker `worker`.
    pub fn assignment(
        &self,
        worker: usize,
    ) -> Assignment<'_> {
        match &self.blocks {
            Some(blocks) => Assignment::Block(blocks.get(worker).cloned().unwrap_or(0..0)),
            None => Assignment::Shared(&self.cursor),
        }
    }
}
