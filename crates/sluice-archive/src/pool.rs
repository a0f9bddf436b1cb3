//! Size-classed buffer reuse.
//!
//! Buffers live in a per-class arena; a [`BufferHandle`] names a slot by
//! `(class, slot)`. Handles are move-only, so a handle can be released once
//! and never touched afterwards; slot state is still checked in debug builds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::memory::MemoryLedger;

/// Free buffers kept per class before releases start dropping storage.
pub const DEFAULT_FREE_CAP: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferClass {
    /// 4 KiB, for metadata and small files.
    Small,
    /// 64 KiB, the typical chunk.
    Medium,
    /// 1 MiB, for large-file chunks.
    Large,
}

impl BufferClass {
    pub const ALL: [BufferClass; 3] = [Self::Small, Self::Medium, Self::Large];

    pub const fn size(self) -> usize {
        match self {
            Self::Small => 4 * 1024,
            Self::Medium => 64 * 1024,
            Self::Large => 1024 * 1024,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Small => 0,
            Self::Medium => 1,
            Self::Large => 2,
        }
    }

    /// The smallest class that holds `len` bytes, or `Large` past 1 MiB.
    pub fn for_len(len: u64) -> Self {
        Self::ALL
            .into_iter()
            .find(|class| len <= class.size() as u64)
            .unwrap_or(Self::Large)
    }

    pub fn smaller(self) -> Option<Self> {
        match self {
            Self::Small => None,
            Self::Medium => Some(Self::Small),
            Self::Large => Some(Self::Medium),
        }
    }
}

/// A checked-out buffer. Return it with [`BufferPool::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a checked-out buffer must be released back to its pool"]
pub struct BufferHandle {
    class: BufferClass,
    slot: usize,
}

impl BufferHandle {
    pub fn class(&self) -> BufferClass {
        self.class
    }

    pub fn capacity(&self) -> usize {
        self.class.size()
    }
}

#[derive(Default)]
struct Slot {
    data: Option<Box<[u8]>>,
    in_use: bool,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    vacant: Vec<usize>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Acquisitions served from a free list.
    pub hits: u64,
    /// Acquisitions that allocated fresh storage.
    pub allocations: u64,
    /// Releases that dropped storage because the free list was full.
    pub drops: u64,
    pub outstanding: usize,
    pub pooled_bytes: u64,
}

pub struct BufferPool {
    arenas: [Arena; 3],
    free_cap: usize,
    ledger: Option<Arc<MemoryLedger>>,
    stats: PoolStats,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            arenas: Default::default(),
            free_cap: DEFAULT_FREE_CAP,
            ledger: None,
            stats: PoolStats::default(),
        }
    }

    pub fn free_cap(mut self, cap: usize) -> Self {
        self.free_cap = cap;
        self
    }

    /// Report checked-out and pooled bytes to `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<MemoryLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub(crate) fn attach_ledger(&mut self, ledger: Arc<MemoryLedger>) {
        self.ledger = Some(ledger);
    }

    /// Check out a buffer of `class`. Never blocks.
    pub fn acquire(&mut self, class: BufferClass) -> BufferHandle {
        let size = class.size();
        let arena = &mut self.arenas[class.index()];

        let slot = if let Some(slot) = arena.free.pop() {
            self.stats.hits += 1;
            self.stats.pooled_bytes -= size as u64;
            if let Some(ledger) = &self.ledger {
                ledger.sub_pooled(size as u64);
            }
            slot
        } else {
            self.stats.allocations += 1;
            let data = Some(vec![0u8; size].into_boxed_slice());
            match arena.vacant.pop() {
                Some(slot) => {
                    arena.slots[slot].data = data;
                    slot
                }
                None => {
                    arena.slots.push(Slot { data, in_use: false });
                    arena.slots.len() - 1
                }
            }
        };

        let entry = &mut arena.slots[slot];
        debug_assert!(!entry.in_use, "slot {slot} of {class:?} handed out twice");
        entry.in_use = true;
        self.stats.outstanding += 1;
        if let Some(ledger) = &self.ledger {
            ledger.add_in_use(size as u64);
        }
        BufferHandle { class, slot }
    }

    /// Return a buffer. Storage is kept for reuse while the class free list
    /// is under its cap, dropped otherwise.
    pub fn release(&mut self, handle: BufferHandle) {
        let size = handle.class.size() as u64;
        let arena = &mut self.arenas[handle.class.index()];
        let Some(entry) = arena.slots.get_mut(handle.slot) else {
            debug_assert!(false, "handle {handle:?} does not belong to this pool");
            return;
        };
        debug_assert!(entry.in_use, "double release of {handle:?}");
        if !entry.in_use {
            return;
        }
        entry.in_use = false;
        self.stats.outstanding -= 1;
        if let Some(ledger) = &self.ledger {
            ledger.sub_in_use(size);
        }

        if arena.free.len() < self.free_cap {
            arena.free.push(handle.slot);
            self.stats.pooled_bytes += size;
            if let Some(ledger) = &self.ledger {
                ledger.add_pooled(size);
            }
        } else {
            entry.data = None;
            arena.vacant.push(handle.slot);
            self.stats.drops += 1;
        }
    }

    pub fn buf(&self, handle: &BufferHandle) -> &[u8] {
        self.slot_data(handle)
    }

    pub fn buf_mut(&mut self, handle: &BufferHandle) -> &mut [u8] {
        let entry = &mut self.arenas[handle.class.index()].slots[handle.slot];
        debug_assert!(entry.in_use, "write through released handle {handle:?}");
        entry.data.as_deref_mut().unwrap_or(&mut [])
    }

    fn slot_data(&self, handle: &BufferHandle) -> &[u8] {
        let entry = &self.arenas[handle.class.index()].slots[handle.slot];
        debug_assert!(entry.in_use, "read through released handle {handle:?}");
        entry.data.as_deref().unwrap_or(&[])
    }

    /// Drop every pooled (free) buffer.
    pub fn shrink(&mut self) -> u64 {
        let mut freed = 0u64;
        for class in BufferClass::ALL {
            let arena = &mut self.arenas[class.index()];
            while let Some(slot) = arena.free.pop() {
                arena.slots[slot].data = None;
                arena.vacant.push(slot);
                freed += class.size() as u64;
            }
        }
        self.stats.pooled_bytes -= freed;
        if let Some(ledger) = &self.ledger {
            ledger.sub_pooled(freed);
        }
        freed
    }

    pub fn free_count(&self, class: BufferClass) -> usize {
        self.arenas[class.index()].free.len()
    }

    /// Bytes held by checked-out buffers.
    pub fn bytes_in_use(&self) -> u64 {
        BufferClass::ALL
            .into_iter()
            .map(|class| {
                let arena = &self.arenas[class.index()];
                arena.slots.iter().filter(|s| s.in_use).count() as u64 * class.size() as u64
            })
            .sum()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}
