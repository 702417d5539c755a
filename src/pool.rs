//! Pooled particle buffers and the dead/alive lifecycle.
//!
//! Every slot `0..capacity` owns one [`Body`] (double-buffered), one predicted
//! position (double-buffered) and one [`SlotMeta`]. Free slots live on the dead
//! pool, an append/consume stack driven by an atomic counter. The alive list is
//! rebuilt from scratch by every finalize.
//!
//! The host types here mirror the device buffers byte for byte: `Body` and
//! `SlotMeta` are uploaded and read back unchanged by the `gpu` module.

use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use rayon::prelude::*;

use crate::dispatch::PARTICLE_GROUP_SIZE;
use crate::emission::EmitRecord;
use crate::error::ConfigError;

/// Lifetime total marking a slot that holds no particle.
pub const UNUSED_LIFETIME: f32 = -1.0;

/// Position and velocity of one slot.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Body {
    pub position: Vec2,
    pub velocity: Vec2,
}

impl Body {
    pub fn new(position: Vec2, velocity: Vec2) -> Self {
        Self { position, velocity }
    }
}

/// Lifetime, rest accumulator and color of one slot.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SlotMeta {
    /// Seconds since emission.
    pub elapsed: f32,
    /// Lifetime in seconds, or [`UNUSED_LIFETIME`].
    pub total: f32,
    /// Seconds spent below the settle rest speed.
    pub rest: f32,
    /// Packed RGBA8.
    pub color: u32,
}

impl SlotMeta {
    pub const UNUSED: SlotMeta = SlotMeta {
        elapsed: 0.0,
        total: UNUSED_LIFETIME,
        rest: 0.0,
        color: 0,
    };

    pub fn spawned(lifetime: f32, color: u32) -> Self {
        Self {
            elapsed: 0.0,
            total: lifetime,
            rest: 0.0,
            color,
        }
    }

    #[inline]
    pub fn is_unused(&self) -> bool {
        self.total < 0.0
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.elapsed < self.total
    }
}

impl Default for SlotMeta {
    fn default() -> Self {
        SlotMeta::UNUSED
    }
}

/// Two copies of an array with alternating read/write roles.
///
/// A pass reads [`read`](Self::read) and writes [`split`](Self::split)'s second
/// half; [`swap`](Self::swap) then flips the roles.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<T> {
    buffers: [Vec<T>; 2],
    read: usize,
}

impl<T: Clone> DoubleBuffer<T> {
    pub fn new(len: usize, fill: T) -> Self {
        Self {
            buffers: [vec![fill.clone(); len], vec![fill; len]],
            read: 0,
        }
    }

    pub fn from_vec(values: Vec<T>) -> Self {
        Self {
            buffers: [values.clone(), values],
            read: 0,
        }
    }
}

impl<T> DoubleBuffer<T> {
    #[inline]
    pub fn read(&self) -> &[T] {
        &self.buffers[self.read]
    }

    /// The current buffer, for passes that patch individual slots in place.
    #[inline]
    pub fn read_mut(&mut self) -> &mut [T] {
        &mut self.buffers[self.read]
    }

    /// `(read, write)` pair for one pass.
    pub fn split(&mut self) -> (&[T], &mut [T]) {
        let (a, b) = self.buffers.split_at_mut(1);
        if self.read == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        }
    }

    #[inline]
    pub fn swap(&mut self) {
        self.read ^= 1;
    }

    /// Which of the two buffers is currently read (0 or 1).
    #[inline]
    pub fn read_index(&self) -> usize {
        self.read
    }

    pub fn len(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers[0].is_empty()
    }
}

/// Fixed-capacity list with an atomic counter.
///
/// `append` is increment-and-place: the counter is bumped first and the value
/// lands in the slot it returned. `consume` pops from the top. Appends and
/// consumes are never mixed within one pass.
#[derive(Debug)]
pub struct AppendList {
    items: Vec<AtomicU32>,
    count: AtomicU32,
}

impl AppendList {
    pub fn new(capacity: u32) -> Self {
        Self {
            items: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            count: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.items.len() as u32
    }

    /// Number of valid entries.
    #[inline]
    pub fn len(&self) -> u32 {
        self.count.load(Ordering::Acquire).min(self.capacity())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `value`, returning its position, or `None` when full.
    pub fn append(&self, value: u32) -> Option<u32> {
        let slot = self.count.fetch_add(1, Ordering::AcqRel);
        if slot >= self.capacity() {
            self.count.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        self.items[slot as usize].store(value, Ordering::Release);
        Some(slot)
    }

    /// Pop the most recently appended value, or `None` when empty.
    pub fn consume(&self) -> Option<u32> {
        let top = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .ok()?;
        Some(self.items[(top - 1) as usize].load(Ordering::Acquire))
    }

    pub fn get(&self, index: u32) -> Option<u32> {
        (index < self.len()).then(|| self.items[index as usize].load(Ordering::Acquire))
    }

    /// Reset the counter to zero. Entries are left in place.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    /// Copy the live count into a counter-argument snapshot.
    pub fn snapshot(&self) -> CounterArgs {
        CounterArgs::new(self.len())
    }

    pub fn to_vec(&self) -> Vec<u32> {
        (0..self.len())
            .map(|i| self.items[i as usize].load(Ordering::Acquire))
            .collect()
    }
}

/// Four-word counter snapshot `[count, 1, 0, 0]`.
///
/// A pass that needs a count produced by an earlier pass reads it from one of
/// these, filled by copying the counter, never from the live counter itself.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct CounterArgs {
    pub words: [u32; 4],
}

impl CounterArgs {
    pub fn new(count: u32) -> Self {
        Self {
            words: [count, 1, 0, 0],
        }
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.words[0]
    }
}

impl Default for CounterArgs {
    fn default() -> Self {
        CounterArgs::new(0)
    }
}

/// Dead/alive/settled counts at a synchronization point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCounts {
    pub dead: u32,
    pub alive: u32,
    pub settled: u32,
}

/// Particle buffers plus the dead pool, alive list and settle list.
#[derive(Debug)]
pub struct ParticlePool {
    capacity: u32,
    pub(crate) bodies: DoubleBuffer<Body>,
    pub(crate) predicted: DoubleBuffer<Vec2>,
    pub(crate) meta: Vec<SlotMeta>,
    pub(crate) dead: AppendList,
    pub(crate) alive: AppendList,
    pub(crate) settled: AppendList,
}

impl ParticlePool {
    /// Allocate `capacity` slots and push them all onto the dead pool.
    pub fn new(capacity: u32) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let len = capacity as usize;
        let mut pool = Self {
            capacity,
            bodies: DoubleBuffer::new(len, Body::default()),
            predicted: DoubleBuffer::new(len, Vec2::ZERO),
            meta: vec![SlotMeta::UNUSED; len],
            dead: AppendList::new(capacity),
            alive: AppendList::new(capacity),
            settled: AppendList::new(capacity),
        };
        pool.initialize();
        Ok(pool)
    }

    /// Seed a pool from explicit buffers.
    ///
    /// Slots whose meta is alive go on the alive list, every other slot is
    /// marked unused and goes on the dead pool.
    pub fn from_state(
        capacity: u32,
        bodies: Vec<Body>,
        meta: Vec<SlotMeta>,
    ) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let expected = capacity as usize;
        if bodies.len() != expected {
            return Err(ConfigError::BufferSize {
                name: "bodies",
                expected,
                actual: bodies.len(),
            });
        }
        if meta.len() != expected {
            return Err(ConfigError::BufferSize {
                name: "meta",
                expected,
                actual: meta.len(),
            });
        }

        let predicted = bodies.iter().map(|b| b.position).collect();
        let mut pool = Self {
            capacity,
            bodies: DoubleBuffer::from_vec(bodies),
            predicted: DoubleBuffer::from_vec(predicted),
            meta,
            dead: AppendList::new(capacity),
            alive: AppendList::new(capacity),
            settled: AppendList::new(capacity),
        };
        for (i, m) in pool.meta.iter_mut().enumerate() {
            if m.is_unused() || !m.is_alive() {
                *m = SlotMeta::UNUSED;
                pool.dead.append(i as u32);
            } else {
                pool.alive.append(i as u32);
            }
        }
        Ok(pool)
    }

    /// Mark every slot unused and refill the dead pool with all indices.
    pub fn initialize(&mut self) {
        self.dead.reset();
        self.alive.reset();
        self.settled.reset();

        let dead = &self.dead;
        self.meta
            .par_chunks_mut(PARTICLE_GROUP_SIZE as usize)
            .enumerate()
            .for_each(|(group, slots)| {
                let base = group * PARTICLE_GROUP_SIZE as usize;
                for (local, m) in slots.iter_mut().enumerate() {
                    *m = SlotMeta::UNUSED;
                    dead.append((base + local) as u32);
                }
            });
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Pop up to `n` free indices. Requests beyond the free count are dropped.
    pub fn claim(&self, n: u32) -> Vec<u32> {
        let available = self.dead.snapshot().count();
        let take = n.min(available);
        (0..take)
            .into_par_iter()
            .filter_map(|_| self.dead.consume())
            .collect()
    }

    /// Return a slot to the dead pool and mark it unused.
    pub fn release(&mut self, index: u32) {
        if let Some(m) = self.meta.get_mut(index as usize) {
            if !m.is_unused() {
                *m = SlotMeta::UNUSED;
                self.dead.append(index);
            }
        }
    }

    /// Claim one slot per record and write the record into it.
    ///
    /// Returns how many records became particles. Records with a
    /// non-positive lifetime use `default_lifetime`.
    pub fn spawn(&mut self, records: &[EmitRecord], default_lifetime: f32) -> u32 {
        let slots = self.claim(records.len() as u32);
        let bodies = self.bodies.read_mut();
        let predicted = self.predicted.read_mut();
        for (&slot, record) in slots.iter().zip(records) {
            let i = slot as usize;
            let lifetime = if record.lifetime > 0.0 {
                record.lifetime
            } else {
                default_lifetime
            };
            bodies[i] = Body::new(record.position, record.velocity);
            predicted[i] = record.position;
            self.meta[i] = SlotMeta::spawned(lifetime, record.color);
        }
        slots.len() as u32
    }

    pub fn counts(&self) -> PoolCounts {
        PoolCounts {
            dead: self.dead.len(),
            alive: self.alive.len(),
            settled: self.settled.len(),
        }
    }

    /// Current committed state of every slot.
    pub fn bodies(&self) -> &[Body] {
        self.bodies.read()
    }

    pub fn meta(&self) -> &[SlotMeta] {
        &self.meta
    }

    pub fn alive_list(&self) -> &AppendList {
        &self.alive
    }

    pub fn dead_pool(&self) -> &AppendList {
        &self.dead
    }

    pub fn settle_list(&self) -> &AppendList {
        &self.settled
    }

    /// Slots currently holding a particle.
    pub fn in_use(&self) -> u32 {
        self.meta.iter().filter(|m| !m.is_unused()).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_gpu_struct_sizes() {
        assert_eq!(std::mem::size_of::<Body>(), 16);
        assert_eq!(std::mem::size_of::<SlotMeta>(), 16);
        assert_eq!(std::mem::size_of::<CounterArgs>(), 16);
    }

    #[test]
    fn test_initialize_fills_dead_pool() {
        let pool = ParticlePool::new(1000).unwrap();
        assert_eq!(pool.counts().dead, 1000);
        assert_eq!(pool.counts().alive, 0);
        let unique: HashSet<u32> = pool.dead_pool().to_vec().into_iter().collect();
        assert_eq!(unique.len(), 1000);
        assert!(pool.meta().iter().all(SlotMeta::is_unused));
    }

    #[test]
    fn test_claim_is_unique_and_saturates() {
        let pool = ParticlePool::new(300).unwrap();
        let first = pool.claim(200);
        let second = pool.claim(200);
        assert_eq!(first.len(), 200);
        assert_eq!(second.len(), 100);

        let all: HashSet<u32> = first.iter().chain(second.iter()).copied().collect();
        assert_eq!(all.len(), 300);
        assert_eq!(pool.counts().dead, 0);
        assert!(pool.claim(1).is_empty());
    }

    #[test]
    fn test_release_returns_slot_once() {
        let mut pool = ParticlePool::new(4).unwrap();
        let record = EmitRecord::new(Vec2::ZERO, Vec2::ZERO, 0);
        assert_eq!(pool.spawn(&[record], 1.0), 1);
        assert_eq!(pool.counts().dead, 3);

        let slot = (0..4).find(|&i| !pool.meta()[i].is_unused()).unwrap() as u32;
        pool.release(slot);
        pool.release(slot);
        assert_eq!(pool.counts().dead, 4);
    }

    #[test]
    fn test_append_list_overflow_is_dropped() {
        let list = AppendList::new(2);
        assert_eq!(list.append(7), Some(0));
        assert_eq!(list.append(8), Some(1));
        assert_eq!(list.append(9), None);
        assert_eq!(list.len(), 2);
        assert_eq!(list.consume(), Some(8));
        assert_eq!(list.snapshot(), CounterArgs::new(1));
    }

    #[test]
    fn test_from_state_rejects_mismatch() {
        let err = ParticlePool::from_state(8, vec![Body::default(); 4], vec![SlotMeta::UNUSED; 8])
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::BufferSize {
                name: "bodies",
                expected: 8,
                actual: 4
            }
        );
    }

    #[test]
    fn test_from_state_sorts_slots() {
        let mut meta = vec![SlotMeta::UNUSED; 4];
        meta[2] = SlotMeta::spawned(5.0, 0);
        let pool = ParticlePool::from_state(4, vec![Body::default(); 4], meta).unwrap();
        assert_eq!(pool.counts().alive, 1);
        assert_eq!(pool.counts().dead, 3);
        assert_eq!(pool.alive_list().get(0), Some(2));
    }

    #[test]
    fn test_double_buffer_swap() {
        let mut buffer = DoubleBuffer::new(2, 0u32);
        {
            let (read, write) = buffer.split();
            write[0] = read[0] + 5;
        }
        buffer.swap();
        assert_eq!(buffer.read()[0], 5);
        assert_eq!(buffer.read_index(), 1);
    }
}
