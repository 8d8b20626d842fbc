//! Live Buffer Registry: the capacity-2, insertion-ordered cache of
//! decrypted-then-mutated render buffers, with wipe-on-eviction and a
//! deferred-wipe timer as a last-resort bound on buffer lifetime.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Hard cap on concurrently live decrypted render buffers.
pub const MAX_DECRYPTED_FRAGMENTS: usize = 2;
/// Last-resort wipe bound for a buffer nobody explicitly released.
pub const DEFERRED_WIPE: Duration = Duration::from_secs(5);

struct Inner {
    order: VecDeque<u32>,
    buffers: HashMap<u32, Vec<u8>>,
    cancel_flags: HashMap<u32, Arc<AtomicBool>>,
}

impl Inner {
    fn evict(&mut self, page_index: u32) {
        if let Some(mut buf) = self.buffers.remove(&page_index) {
            crate::memory::wipe_vec(&mut buf);
        }
        self.order.retain(|&p| p != page_index);
        if let Some(flag) = self.cancel_flags.remove(&page_index) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Shared handle to the registry; cheap to clone, safe to hand to a
/// spawned deferred-wipe task.
#[derive(Clone)]
pub struct LiveBufferRegistry {
    capacity: usize,
    inner: Arc<Mutex<Inner>>,
}

impl LiveBufferRegistry {
    /// Create a registry with the given capacity (spec value: 2).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Arc::new(Mutex::new(Inner {
                order: VecDeque::new(),
                buffers: HashMap::new(),
                cancel_flags: HashMap::new(),
            })),
        }
    }

    /// Number of buffers currently tracked.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.buffers.len()
    }

    /// Insert or replace the buffer for `page_index`, evicting the oldest
    /// tracked buffer (wipe-and-release) if this insertion would exceed
    /// capacity. Also arms a 5-second deferred-wipe timer for the page.
    pub async fn insert(&self, page_index: u32, data: Vec<u8>) {
        {
            let mut inner = self.inner.lock().await;
            if let Some(old) = inner.buffers.insert(page_index, data) {
                let mut old = old;
                crate::memory::wipe_vec(&mut old);
            } else {
                inner.order.push_back(page_index);
            }

            while inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    if oldest != page_index {
                        if let Some(mut buf) = inner.buffers.remove(&oldest) {
                            crate::memory::wipe_vec(&mut buf);
                        }
                        if let Some(flag) = inner.cancel_flags.remove(&oldest) {
                            flag.store(true, Ordering::SeqCst);
                        }
                    } else {
                        // Re-insert: we must not evict the page we just added.
                        inner.order.push_back(oldest);
                        break;
                    }
                }
            }

            let flag = Arc::new(AtomicBool::new(false));
            inner.cancel_flags.insert(page_index, flag.clone());
            self.spawn_deferred_wipe(page_index, flag);
        }
    }

    fn spawn_deferred_wipe(&self, page_index: u32, cancel_flag: Arc<AtomicBool>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEFERRED_WIPE).await;
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let mut inner = inner.lock().await;
            if !cancel_flag.load(Ordering::SeqCst) {
                inner.evict(page_index);
            }
        });
    }

    /// Explicitly release a page: wipes and removes it, and cancels its
    /// deferred-wipe timer so the timer's later wipe is a no-op.
    pub async fn release(&self, page_index: u32) {
        let mut inner = self.inner.lock().await;
        inner.evict(page_index);
    }

    /// Wipe and remove every tracked buffer. Used on backgrounding and by
    /// the security violation handler.
    pub async fn evict_all(&self) {
        let mut inner = self.inner.lock().await;
        let pages: Vec<u32> = inner.order.iter().copied().collect();
        for page in pages {
            inner.evict(page);
        }
    }

    /// Read a snapshot of the currently tracked buffer for `page_index`, if any.
    pub async fn get(&self, page_index: u32) -> Option<Vec<u8>> {
        self.inner.lock().await.buffers.get(&page_index).cloned()
    }
}
