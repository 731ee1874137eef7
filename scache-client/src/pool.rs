//! # Channel Pool
//!
//! Purpose: Spread data-plane calls across a fixed set of transport channels
//! so no single HTTP/2 connection becomes the bottleneck.
//!
//! ## Design Principles
//! 1. **Fixed Size**: The channel count is set at construction and is never zero.
//! 2. **Lock-Free Selection**: One relaxed atomic increment per call; the
//!    counter wraps and is reduced modulo the pool length.
//! 3. **No Health Tracking**: A failing channel surfaces as per-call errors.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use scache_common::{CacheError, CacheResult, ErrorKind};

use crate::config::ClientConfig;
use crate::stub::{CacheStub, GrpcStub};

/// One pooled transport channel and its stub.
pub struct DataChannel<S> {
    index: usize,
    stub: S,
}

impl<S> DataChannel<S> {
    /// Position of this channel in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn stub(&self) -> &S {
        &self.stub
    }
}

/// Round-robin pool of data-plane channels.
pub struct ChannelPool<S> {
    channels: Box<[DataChannel<S>]>,
    next: AtomicUsize,
}

impl<S: CacheStub> ChannelPool<S> {
    /// Creates a pool over `stubs`, in order.
    pub fn new(stubs: Vec<S>) -> CacheResult<Self> {
        if stubs.is_empty() {
            return Err(CacheError::new(
                ErrorKind::InvalidArgument,
                "channel pool requires at least one channel",
            ));
        }
        let channels = stubs
            .into_iter()
            .enumerate()
            .map(|(index, stub)| DataChannel { index, stub })
            .collect();
        Ok(ChannelPool {
            channels,
            next: AtomicUsize::new(0),
        })
    }

    /// Returns the next channel in rotation.
    ///
    /// Concurrent callers each observe a distinct counter value, so over `k`
    /// selections every channel is picked either `k / n` or `k / n + 1` times.
    #[inline]
    pub fn select(&self) -> &DataChannel<S> {
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        &self.channels[ticket % self.channels.len()]
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always false; construction rejects an empty pool.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> impl Iterator<Item = &DataChannel<S>> {
        self.channels.iter()
    }

    /// Closes every channel's stub once.
    pub(crate) fn shutdown(&self) {
        for channel in self.channels.iter() {
            channel.stub.close();
        }
        info!(channels = self.channels.len(), "channel pool closed");
    }
}

impl ChannelPool<GrpcStub> {
    /// Creates `config.channel_count` lazily connected gRPC channels.
    pub fn connect(config: &ClientConfig) -> CacheResult<Self> {
        config.validate()?;
        let stubs = (0..config.channel_count)
            .map(|_| GrpcStub::connect_lazy(config))
            .collect::<CacheResult<Vec<_>>>()?;
        info!(
            endpoint = %config.endpoint,
            channels = stubs.len(),
            "channel pool created"
        );
        ChannelPool::new(stubs)
    }
}
