use crate::runtime::Error;

///////////////////////////////
/// Fixed-capacity circular store of reusable slots, driven by pure index
/// arithmetic: `next` points at the oldest ready slot (-1 when empty) and
/// `vacant` at the next writable slot (-1 when full). Producers write into
/// the vacant slot in place and call `increment`; consumers read the next
/// slot and call `decrement`. No slot is ever moved on the hot path.
///
/// Capacity is always a multiple of the configured resolution, the
/// granularity at which the owning feed swaps its buffers.
#[derive(Clone, Debug)]
pub struct CyclicBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    resolution: usize,
    next: isize,
    vacant: isize,
}

impl<T: Default + Clone> CyclicBuffer<T> {
    ///////////////////////////////
    /// Zero capacity and resolutions exceeding capacity are configuration
    /// errors; they are rejected here, never at runtime. Capacity is
    /// aligned up to a multiple of the resolution.
    pub fn new(capacity: usize, resolution: usize) -> Result<CyclicBuffer<T>, Error> {
        if capacity == 0 {
            return Err(Error::config("cyclic buffer capacity must be positive"));
        }
        if resolution == 0 {
            return Err(Error::config("cyclic buffer resolution must be positive"));
        }
        if resolution > capacity {
            return Err(Error::config(format!(
                "cyclic buffer resolution {} exceeds capacity {}",
                resolution, capacity
            )));
        }
        let capacity = align_to(capacity, resolution);
        Ok(CyclicBuffer {
            slots: vec![T::default(); capacity],
            capacity,
            resolution,
            next: -1,
            vacant: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.next < 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.vacant < 0
    }

    /// Number of occupied slots.
    #[inline]
    pub fn size(&self) -> usize {
        if self.next < 0 {
            0
        } else if self.vacant < 0 {
            self.capacity
        } else {
            (self.vacant - self.next).rem_euclid(self.capacity as isize) as usize
        }
    }

    /// Number of vacant slots.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity - self.size()
    }

    /// The slot a producer writes into next. Must not be called when full.
    #[inline]
    pub fn vacant_slot(&mut self) -> &mut T {
        debug_assert!(!self.is_full());
        &mut self.slots[self.vacant as usize]
    }

    /// The oldest occupied slot. Must not be called when empty.
    #[inline]
    pub fn next_slot(&self) -> &T {
        debug_assert!(!self.is_empty());
        &self.slots[self.next as usize]
    }

    ///////////////////////////////
    /// Advance the vacant cursor after a successful fill.
    #[inline]
    pub fn increment(&mut self) {
        debug_assert!(!self.is_full());
        if self.next < 0 {
            self.next = self.vacant;
        }
        self.vacant = (self.vacant + 1).rem_euclid(self.capacity as isize);
        if self.vacant == self.next {
            self.vacant = -1;
        }
    }

    ///////////////////////////////
    /// Advance the next cursor after a successful drain.
    #[inline]
    pub fn decrement(&mut self) {
        debug_assert!(!self.is_empty());
        if self.vacant < 0 {
            self.vacant = self.next;
        }
        self.next = (self.next + 1).rem_euclid(self.capacity as isize);
        if self.next == self.vacant {
            self.next = -1;
        }
    }

    ///////////////////////////////
    /// Bounded random peek at an offset from the next slot, without
    /// consuming. `None` beyond the current occupancy.
    pub fn at(&self, position: usize) -> Option<&T> {
        if position >= self.size() {
            return None;
        }
        let index = (self.next as usize + position) % self.capacity;
        Some(&self.slots[index])
    }

    ///////////////////////////////
    /// Grow to at least `capacity` slots, preserving the queued content in
    /// order. Shrinking is not supported; a smaller request is a no-op.
    pub fn calibrate_capacity(&mut self, capacity: usize) {
        let capacity = align_to(capacity, self.resolution);
        if capacity <= self.capacity {
            return;
        }
        let size = self.size();
        let mut slots = vec![T::default(); capacity];
        for (i, slot) in slots.iter_mut().enumerate().take(size) {
            slot.clone_from(self.at(i).expect("occupied slot within size"));
        }
        self.slots = slots;
        self.capacity = capacity;
        self.next = if size == 0 { -1 } else { 0 };
        self.vacant = if size == capacity { -1 } else { size as isize };
    }

    ///////////////////////////////
    /// Re-align capacity to a multiple of the new resolution, growing if
    /// the new resolution exceeds the current capacity.
    pub fn calibrate_resolution(&mut self, resolution: usize) -> Result<(), Error> {
        if resolution == 0 {
            return Err(Error::config("cyclic buffer resolution must be positive"));
        }
        self.resolution = resolution;
        let target = align_to(self.capacity.max(resolution), resolution);
        if target > self.capacity {
            self.calibrate_capacity(target);
        }
        Ok(())
    }

    ///////////////////////////////
    /// Move single slots into `other` until this buffer's occupancy is a
    /// multiple of its resolution. Used when the resolution changes while
    /// records are queued; the records keep their relative order in the
    /// receiving buffer.
    pub fn sync(&mut self, other: &mut CyclicBuffer<T>) {
        while self.size() % self.resolution != 0 {
            debug_assert!(!other.is_full());
            other.vacant_slot().clone_from(self.next_slot());
            other.increment();
            self.decrement();
        }
    }
}

#[inline]
fn align_to(value: usize, resolution: usize) -> usize {
    value.div_ceil(resolution) * resolution
}
