// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accounted heap regions modelling the device's two-tier memory.
//!
//! The device carries a small on-die fast SRAM (the only region DMA engines
//! can reach) and a large off-die PSRAM. Every bulk buffer in the core is
//! drawn from one of these pools so that allocation locality is explicit and
//! release is observable: a [`PoolBuf`] returns its bytes to the pool when
//! dropped.
//!
//! Once the Wi-Fi driver starts it permanently fragments fast SRAM; after
//! [`Pools::note_wifi_started`] the internal pool refuses requests above a
//! contiguity threshold. The boot sequence reserves its large internal
//! regions before that point.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

/// Largest contiguous internal allocation that still succeeds after the
/// Wi-Fi driver has carved up fast SRAM.
pub const WIFI_FRAG_CONTIG: usize = 16 * 1024;

/// Which heap a buffer is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// On-die fast SRAM, DMA-capable, scarce.
    Internal,
    /// Off-die PSRAM, bulk storage, never handed to DMA.
    Psram,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Psram => "psram",
        }
    }
}

struct PoolInner {
    capacity: usize,
    in_use: usize,
    max_contig: usize,
}

struct Pool {
    region: Region,
    inner: Mutex<PoolInner>,
}

impl Pool {
    fn new(region: Region, capacity: usize) -> Self {
        Self { region, inner: Mutex::new(PoolInner { capacity, in_use: 0, max_contig: capacity }) }
    }

    fn take(&self, len: usize) -> bool {
        let mut inner = self.inner.lock();
        if len > inner.max_contig || inner.in_use + len > inner.capacity {
            return false;
        }
        inner.in_use += len;
        true
    }

    fn give(&self, len: usize) {
        let mut inner = self.inner.lock();
        inner.in_use = inner.in_use.saturating_sub(len);
    }

    fn free(&self) -> usize {
        let inner = self.inner.lock();
        inner.capacity - inner.in_use
    }
}

/// The pair of accounted heaps.
pub struct Pools {
    internal: Pool,
    psram: Pool,
}

impl Pools {
    pub fn new(internal_capacity: usize, psram_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            internal: Pool::new(Region::Internal, internal_capacity),
            psram: Pool::new(Region::Psram, psram_capacity),
        })
    }

    /// Allocate `len` zeroed bytes from `region`.
    ///
    /// Returns `None` when the region cannot satisfy the request; the caller
    /// degrades per its own contract. `tag` names the buffer in logs.
    pub fn alloc(self: &Arc<Self>, region: Region, len: usize, tag: &str) -> Option<PoolBuf> {
        let pool = self.pool(region);
        if !pool.take(len) {
            tracing::warn!(
                region = region.as_str(),
                len,
                tag,
                free = pool.free(),
                "allocation refused"
            );
            return None;
        }
        Some(PoolBuf { data: vec![0u8; len], region, pools: Arc::clone(self) })
    }

    /// Record that the Wi-Fi driver has started. Fast SRAM is fragmented from
    /// here on: large contiguous internal requests fail.
    pub fn note_wifi_started(&self) {
        let mut inner = self.internal.inner.lock();
        inner.max_contig = inner.max_contig.min(WIFI_FRAG_CONTIG);
        tracing::debug!(max_contig = inner.max_contig, "internal heap fragmented by wifi start");
    }

    /// Free bytes remaining in the internal region.
    pub fn free_internal(&self) -> usize {
        self.internal.free()
    }

    /// Free bytes remaining across both regions.
    pub fn free_total(&self) -> usize {
        self.internal.free() + self.psram.free()
    }

    /// Bytes currently allocated from `region`. Used by leak assertions.
    pub fn in_use(&self, region: Region) -> usize {
        self.pool(region).inner.lock().in_use
    }

    fn pool(&self, region: Region) -> &Pool {
        match region {
            Region::Internal => &self.internal,
            Region::Psram => &self.psram,
        }
    }
}

/// An owned allocation from a [`Pools`] region.
///
/// Dereferences to its byte slice. Dropping the buffer returns the bytes to
/// the pool, so release happens exactly once, enforced by ownership.
pub struct PoolBuf {
    data: Vec<u8>,
    region: Region,
    pools: Arc<Pools>,
}

impl PoolBuf {
    pub fn region(&self) -> Region {
        self.region
    }
}

impl Deref for PoolBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PoolBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PoolBuf {
    fn drop(&mut self) {
        self.pools.pool(self.region).give(self.data.len());
    }
}

impl std::fmt::Debug for PoolBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuf")
            .field("region", &self.region)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
