//! Emission requests and the bounded queues that carry them.
//!
//! Direct emission goes through an [`EmitQueue`] drained once per frame.
//! Indirect emission reads an [`EmitBuffer`] filled by another pass (terrain
//! carving on the host, any compute pass on the device) whose count is taken
//! from a [`CounterArgs`](crate::pool::CounterArgs) snapshot.
//!
//! Both queues saturate: requests beyond capacity are dropped for that frame.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

use crate::pool::CounterArgs;

/// One particle to spawn.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct EmitRecord {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Packed RGBA8.
    pub color: u32,
    /// Lifetime in seconds. Zero means the configured default.
    pub lifetime: f32,
}

impl EmitRecord {
    pub fn new(position: Vec2, velocity: Vec2, color: u32) -> Self {
        Self {
            position,
            velocity,
            color,
            lifetime: 0.0,
        }
    }

    pub fn with_lifetime(mut self, seconds: f32) -> Self {
        self.lifetime = seconds;
        self
    }
}

/// An explosion request in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Explosion {
    pub position: Vec2,
    pub radius: f32,
}

impl Explosion {
    pub fn new(position: Vec2, radius: f32) -> Self {
        Self { position, radius }
    }

    /// Device encoding `(x, y, r², r)`.
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(
            self.position.x,
            self.position.y,
            self.radius * self.radius,
            self.radius,
        )
    }
}

/// Bounded FIFO of requests that silently drops overflow.
#[derive(Debug, Clone)]
pub struct EmitQueue<T> {
    items: Vec<T>,
    capacity: usize,
    dropped: usize,
}

impl<T> EmitQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Queue `item`. Returns `false` if the queue was full and the item dropped.
    pub fn push(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.items.push(item);
        true
    }

    /// Take every queued item, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<T> {
        if self.dropped > 0 {
            log::debug!(
                "Emission queue saturated, dropped {} request(s) this frame",
                self.dropped
            );
            self.dropped = 0;
        }
        std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Fixed-capacity record buffer with its own counter.
///
/// Host counterpart of a device emission buffer: a producer fills records and
/// bumps the counter, a consumer reads `count` records through a snapshot.
#[derive(Debug, Clone)]
pub struct EmitBuffer {
    records: Vec<EmitRecord>,
    count: u32,
}

impl EmitBuffer {
    pub fn new(capacity: u32) -> Self {
        Self {
            records: vec![EmitRecord::default(); capacity as usize],
            count: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append a record. Returns `false` when the buffer is full.
    pub fn push(&mut self, record: EmitRecord) -> bool {
        if self.count >= self.capacity() {
            return false;
        }
        self.records[self.count as usize] = record;
        self.count += 1;
        true
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// Snapshot of the counter, as copied for an indirect emission.
    pub fn counter_args(&self) -> CounterArgs {
        CounterArgs::new(self.count)
    }

    /// Records covered by the counter.
    pub fn records(&self) -> &[EmitRecord] {
        &self.records[..self.count as usize]
    }

    /// Reserve `n` slots and return them for a parallel fill.
    ///
    /// The counter is advanced by at most the free space, the returned slice
    /// covers exactly the reserved slots.
    pub(crate) fn reserve(&mut self, n: u32) -> &mut [EmitRecord] {
        let start = self.count;
        let end = start.saturating_add(n).min(self.capacity());
        self.count = end;
        &mut self.records[start as usize..end as usize]
    }
}
