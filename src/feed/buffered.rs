use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use log::{debug, warn};

use crate::model::{DecodeOutcome, RecordCodec};
use crate::runtime::Error;

use super::cyclic::CyclicBuffer;

/// Element type a feed can carry: reusable, cheap to clear.
pub trait Slot: Default + Clone + Send {
    fn reset(&mut self);
}

impl Slot for crate::model::Segment {
    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
impl Slot for u64 {
    fn reset(&mut self) {
        *self = 0;
    }
}

/// Which side of the pipeline a feed serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// What to do with a record the codec could not decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorruptPolicy {
    Abort,
    Skip,
}

struct QueueState<T> {
    queue: CyclicBuffer<T>,
    /// no further swaps will bring data; blocked pullers must give up
    exhausted: bool,
}

struct BufferState<T, C> {
    buffer: CyclicBuffer<T>,
    codec: C,
    end_of_stream: bool,
}

///////////////////////////////
/// A double-buffered record feed.
///
/// Two cyclic buffers: the queue, visible to pull/push through scoped lock
/// permits, and the background buffer, touched only by the feed's background
/// thread performing device I/O through the format codec. When the queue is
/// drained (IN) or filled (OUT) the two swap roles under both locks.
///
/// Lock order is always buffer then queue; pull/push take only the queue
/// lock, so device I/O never blocks the record path. The background thread
/// is the single suspension point for I/O.
pub struct BufferedFeed<T: Slot, C: RecordCodec<T>> {
    name: String,
    direction: Direction,
    /// position in the process-wide fixed lock order
    global_index: usize,
    corrupt_policy: CorruptPolicy,
    corrupt_count: AtomicU64,

    queue: Mutex<QueueState<T>>,
    buffer: Mutex<BufferState<T, C>>,
    /// pullers wait here for a non-empty-or-exhausted queue
    not_empty: Condvar,
    /// pushers wait here for a non-full queue
    not_full: Condvar,
    /// the background thread waits here for the queue to become swappable
    swappable: Condvar,

    thread: Mutex<Option<JoinHandle<Result<(), Error>>>>,
}

impl<T: Slot + 'static, C: RecordCodec<T> + 'static> BufferedFeed<T, C> {
    pub fn new(
        name: &str,
        direction: Direction,
        global_index: usize,
        capacity: usize,
        resolution: usize,
        codec: C,
        corrupt_policy: CorruptPolicy,
    ) -> Result<Arc<BufferedFeed<T, C>>, Error> {
        let queue = CyclicBuffer::new(capacity, resolution)?;
        let buffer = CyclicBuffer::new(capacity, resolution)?;
        Ok(Arc::new(BufferedFeed {
            name: name.to_string(),
            direction,
            global_index,
            corrupt_policy,
            corrupt_count: AtomicU64::new(0),
            queue: Mutex::new(QueueState {
                queue,
                exhausted: false,
            }),
            buffer: Mutex::new(BufferState {
                buffer,
                codec,
                end_of_stream: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            swappable: Condvar::new(),
            thread: Mutex::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn global_index(&self) -> usize {
        self.global_index
    }

    pub fn corrupt_count(&self) -> u64 {
        self.corrupt_count.load(Ordering::Relaxed)
    }

    ///////////////////////////////
    /// Start the background thread. IN feeds replenish until the source is
    /// exhausted; OUT feeds flush until stopped, then close the codec.
    /// A feed is opened once, before first use.
    pub fn open(self: &Arc<Self>) {
        let mut thread = self.thread.lock().expect("feed thread slot poisoned");
        assert!(thread.is_none(), "feed {} opened twice", self.name);
        let feed = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("feed-{}", self.name))
            .spawn(move || {
                let outcome = match feed.direction {
                    Direction::In => feed.run_in(),
                    Direction::Out => feed.run_out(),
                };
                if let Err(e) = &outcome {
                    warn!("feed {} background thread failed: {}", feed.name, e);
                    // unblock everyone; the failure surfaces on join
                    let mut q = feed.queue.lock().expect("feed queue poisoned");
                    q.exhausted = true;
                    drop(q);
                    feed.not_empty.notify_all();
                    feed.not_full.notify_all();
                    feed.swappable.notify_all();
                }
                outcome
            })
            .expect("failed to spawn feed thread");
        *thread = Some(handle);
    }

    fn run_in(&self) -> Result<(), Error> {
        while self.replenish()? {}
        debug!("feed {} source exhausted", self.name);
        let mut buf = self.buffer.lock().expect("feed buffer poisoned");
        buf.codec.close()
    }

    fn run_out(&self) -> Result<(), Error> {
        while self.flush()? {}
        debug!("feed {} output drained", self.name);
        let mut buf = self.buffer.lock().expect("feed buffer poisoned");
        buf.codec.close()
    }

    ///////////////////////////////
    /// IN protocol: fill the background buffer from the source, wait for
    /// the queue to drain, swap, signal pullers. Returns false once the
    /// source is exhausted and no further swap can produce records.
    ///
    /// The wait happens without the buffer lock held: only this thread can
    /// refill the queue, so "queue drained" cannot revert while the locks
    /// are reacquired in buffer-then-queue order for the swap.
    pub fn replenish(&self) -> Result<bool, Error> {
        {
            let mut buf = self.buffer.lock().expect("feed buffer poisoned");
            if !buf.end_of_stream {
                let BufferState {
                    buffer,
                    codec,
                    end_of_stream,
                } = &mut *buf;
                while !buffer.is_full() {
                    match codec.decode(buffer.vacant_slot()) {
                        Ok(DecodeOutcome::Record) => buffer.increment(),
                        Ok(DecodeOutcome::EndOfStream) => {
                            *end_of_stream = true;
                            break;
                        }
                        Err(e @ Error::CorruptRecord { .. })
                            if self.corrupt_policy == CorruptPolicy::Skip =>
                        {
                            warn!("feed {} skipping corrupt record: {}", self.name, e);
                            self.corrupt_count.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        loop {
            {
                let mut q = self.queue.lock().expect("feed queue poisoned");
                while !q.queue.is_empty() && !q.exhausted {
                    q = self.swappable.wait(q).expect("feed queue poisoned");
                }
            }

            let mut buf = self.buffer.lock().expect("feed buffer poisoned");
            let mut q = self.queue.lock().expect("feed queue poisoned");
            if q.exhausted {
                // stop() was requested; whatever sits in the buffer is dropped
                self.not_empty.notify_all();
                return Ok(false);
            }
            if q.queue.is_empty() {
                std::mem::swap(&mut q.queue, &mut buf.buffer);
                let more = !buf.end_of_stream;
                if !more {
                    q.exhausted = true;
                }
                self.not_empty.notify_all();
                return Ok(more);
            }
            // a recalibration raced the wakeup; re-wait
        }
    }

    ///////////////////////////////
    /// OUT protocol: encode whatever the last swap left in the background
    /// buffer, wait for the queue to become full or the feed to be stopped,
    /// swap, signal pushers. Returns false once stopped and fully drained.
    pub fn flush(&self) -> Result<bool, Error> {
        {
            let mut buf = self.buffer.lock().expect("feed buffer poisoned");
            let BufferState { buffer, codec, .. } = &mut *buf;
            while !buffer.is_empty() {
                codec.encode(buffer.next_slot())?;
                buffer.decrement();
            }
        }

        loop {
            {
                let mut q = self.queue.lock().expect("feed queue poisoned");
                while !q.queue.is_full() && !q.exhausted {
                    q = self.swappable.wait(q).expect("feed queue poisoned");
                }
            }

            let mut buf = self.buffer.lock().expect("feed buffer poisoned");
            let mut q = self.queue.lock().expect("feed queue poisoned");
            if q.queue.is_full() || q.exhausted {
                std::mem::swap(&mut q.queue, &mut buf.buffer);
                let done = q.exhausted && q.queue.is_empty() && buf.buffer.is_empty();
                self.not_full.notify_all();
                return Ok(!done);
            }
            // a recalibration drained the queue below full; re-wait
        }
    }

    ///////////////////////////////
    /// Block until the queue is non-empty or exhausted, then return a
    /// scoped permit for pulling. The permit must be dropped before the
    /// next pull cycle; holding it blocks the swap.
    pub fn acquire_pull_lock(&self) -> PullLock<'_, T> {
        let mut q = self.queue.lock().expect("feed queue poisoned");
        while q.queue.is_empty() && !q.exhausted {
            q = self.not_empty.wait(q).expect("feed queue poisoned");
        }
        PullLock {
            guard: q,
            swappable: &self.swappable,
        }
    }

    ///////////////////////////////
    /// Block until the queue is non-full, then return a scoped push permit.
    /// An exhausted feed stops blocking so a failing run cannot hang its
    /// producers.
    pub fn acquire_push_lock(&self) -> PushLock<'_, T> {
        let mut q = self.queue.lock().expect("feed queue poisoned");
        while q.queue.is_full() && !q.exhausted {
            q = self.not_full.wait(q).expect("feed queue poisoned");
        }
        PushLock {
            guard: q,
            swappable: &self.swappable,
        }
    }

    ///////////////////////////////
    /// Re-align both cyclic buffers to a new resolution, migrating any
    /// partially filled remainder from the queue into the background buffer
    /// via `sync`. Taking the buffer lock first and the queue lock second
    /// makes this race-free against concurrent pull/push and swaps.
    pub fn calibrate_resolution(&self, resolution: usize) -> Result<(), Error> {
        let mut buf = self.buffer.lock().expect("feed buffer poisoned");
        let mut q = self.queue.lock().expect("feed queue poisoned");
        q.queue.calibrate_resolution(resolution)?;
        buf.buffer.calibrate_resolution(resolution)?;
        if buf.buffer.available() < q.queue.size() % resolution {
            let grow = buf.buffer.capacity() + resolution;
            buf.buffer.calibrate_capacity(grow);
        }
        q.queue.sync(&mut buf.buffer);
        self.swappable.notify_all();
        self.not_full.notify_all();
        Ok(())
    }

    ///////////////////////////////
    /// Mark the feed exhausted and wake every waiter. Waiters re-check the
    /// flag rather than assuming data is available.
    pub fn stop(&self) {
        let mut q = self.queue.lock().expect("feed queue poisoned");
        q.exhausted = true;
        drop(q);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.swappable.notify_all();
    }

    ///////////////////////////////
    /// Join the background thread. A panicked or failed thread is a run
    /// failure; records must never be silently lost.
    pub fn join(&self) -> Result<(), Error> {
        let handle = self
            .thread
            .lock()
            .expect("feed thread slot poisoned")
            .take();
        match handle {
            None => Ok(()),
            Some(handle) => match handle.join() {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::dead_feed(&self.name, "background thread panicked")),
            },
        }
    }
}

///////////////////////////////
/// Scoped pull permit over a feed's queue.
pub struct PullLock<'a, T: Slot> {
    guard: MutexGuard<'a, QueueState<T>>,
    swappable: &'a Condvar,
}

impl<T: Slot> PullLock<'_, T> {
    ///////////////////////////////
    /// Copy the oldest queued slot into the caller-owned record and advance
    /// the queue. False only after exhaustion. Draining the queue to empty
    /// wakes the background thread.
    pub fn pull(&mut self, record: &mut T) -> bool {
        if self.guard.queue.is_empty() {
            return false;
        }
        record.clone_from(self.guard.queue.next_slot());
        self.guard.queue.decrement();
        if self.guard.queue.is_empty() {
            self.swappable.notify_all();
        }
        true
    }

    ///////////////////////////////
    /// Non-consuming bounded read at an offset from the next slot. Clears
    /// the record and returns false beyond the queued size.
    pub fn peek(&self, record: &mut T, position: usize) -> bool {
        match self.guard.queue.at(position) {
            Some(slot) => {
                record.clone_from(slot);
                true
            }
            None => {
                record.reset();
                false
            }
        }
    }

    pub fn queued(&self) -> usize {
        self.guard.queue.size()
    }

    pub fn is_exhausted(&self) -> bool {
        self.guard.exhausted
    }
}

///////////////////////////////
/// Scoped push permit over a feed's queue.
pub struct PushLock<'a, T: Slot> {
    guard: MutexGuard<'a, QueueState<T>>,
    swappable: &'a Condvar,
}

impl<T: Slot> PushLock<'_, T> {
    ///////////////////////////////
    /// Write the record into the vacant slot and advance. Filling the queue
    /// (or pushing on an exhausted feed) wakes the background thread.
    /// False if no slot is vacant, which can only happen once the feed is
    /// exhausted by stop or background failure.
    pub fn push(&mut self, record: &T) -> bool {
        if self.guard.queue.is_full() {
            return false;
        }
        self.guard.queue.vacant_slot().clone_from(record);
        self.guard.queue.increment();
        if self.guard.queue.is_full() || self.guard.exhausted {
            self.swappable.notify_all();
        }
        true
    }

    pub fn available(&self) -> usize {
        self.guard.queue.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Source codec handing out `count` sequential records.
    struct CountingSource {
        produced: u64,
        count: u64,
        closed: Arc<AtomicBool>,
    }

    impl RecordCodec<u64> for CountingSource {
        fn decode(&mut self, slot: &mut u64) -> Result<DecodeOutcome, Error> {
            if self.produced >= self.count {
                return Ok(DecodeOutcome::EndOfStream);
            }
            *slot = self.produced;
            self.produced += 1;
            Ok(DecodeOutcome::Record)
        }

        fn encode(&mut self, _slot: &u64) -> Result<(), Error> {
            unreachable!("source codec never encodes")
        }

        fn close(&mut self) -> Result<(), Error> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Sink codec recording everything it is handed.
    struct CollectingSink {
        received: Arc<Mutex<Vec<u64>>>,
    }

    impl RecordCodec<u64> for CollectingSink {
        fn decode(&mut self, _slot: &mut u64) -> Result<DecodeOutcome, Error> {
            unreachable!("sink codec never decodes")
        }

        fn encode(&mut self, slot: &u64) -> Result<(), Error> {
            self.received.lock().unwrap().push(*slot);
            Ok(())
        }

        fn close(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    /// Source failing with an I/O error after `good` records.
    struct FailingSource {
        produced: u64,
        good: u64,
    }

    impl RecordCodec<u64> for FailingSource {
        fn decode(&mut self, slot: &mut u64) -> Result<DecodeOutcome, Error> {
            if self.produced >= self.good {
                return Err(Error::io_error(
                    "reading record",
                    std::io::Error::new(std::io::ErrorKind::Other, "device gone"),
                ));
            }
            *slot = self.produced;
            self.produced += 1;
            Ok(DecodeOutcome::Record)
        }

        fn encode(&mut self, _slot: &u64) -> Result<(), Error> {
            unreachable!()
        }

        fn close(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    fn in_feed(
        count: u64,
        capacity: usize,
        resolution: usize,
    ) -> (Arc<BufferedFeed<u64, CountingSource>>, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let feed = BufferedFeed::new(
            "test-in",
            Direction::In,
            0,
            capacity,
            resolution,
            CountingSource {
                produced: 0,
                count,
                closed: Arc::clone(&closed),
            },
            CorruptPolicy::Abort,
        )
        .unwrap();
        (feed, closed)
    }

    #[test]
    fn in_feed_delivers_exactly_the_source_records() {
        // capacity 60, resolution 60, 137 records: two full swaps plus a
        // partial tail
        let (feed, closed) = in_feed(137, 60, 60);
        feed.open();

        let mut record = 0u64;
        let mut pulled = Vec::new();
        loop {
            let mut lock = feed.acquire_pull_lock();
            if !lock.pull(&mut record) {
                break;
            }
            pulled.push(record);
        }
        feed.join().unwrap();

        let expected: Vec<u64> = (0..137).collect();
        assert_eq!(pulled, expected);
        assert!(closed.load(Ordering::SeqCst));

        // a further pull still reports exhaustion
        let mut lock = feed.acquire_pull_lock();
        assert!(!lock.pull(&mut record));
    }

    #[test]
    fn in_feed_exact_multiple_of_capacity() {
        let (feed, _closed) = in_feed(120, 60, 60);
        feed.open();
        let mut record = 0u64;
        let mut n = 0u64;
        loop {
            let mut lock = feed.acquire_pull_lock();
            if !lock.pull(&mut record) {
                break;
            }
            n += 1;
        }
        feed.join().unwrap();
        assert_eq!(n, 120);
    }

    #[test]
    fn peek_is_bounded_and_non_consuming() {
        let (feed, _closed) = in_feed(10, 4, 4);
        feed.open();
        let mut record = 99u64;
        {
            let lock = feed.acquire_pull_lock();
            assert!(lock.peek(&mut record, 0));
            assert_eq!(record, 0);
            assert!(lock.peek(&mut record, 3));
            assert_eq!(record, 3);
            assert!(!lock.peek(&mut record, 4));
            assert_eq!(record, 0); // cleared by the failed peek
        }
        let mut lock = feed.acquire_pull_lock();
        assert!(lock.pull(&mut record));
        assert_eq!(record, 0);
        drop(lock);
        feed.stop();
        feed.join().unwrap();
    }

    #[test]
    fn out_feed_writes_all_pushed_records() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let feed = BufferedFeed::new(
            "test-out",
            Direction::Out,
            0,
            8,
            8,
            CollectingSink {
                received: Arc::clone(&received),
            },
            CorruptPolicy::Abort,
        )
        .unwrap();
        feed.open();

        for i in 0..37u64 {
            let mut lock = feed.acquire_push_lock();
            assert!(lock.push(&i));
        }
        feed.stop();
        feed.join().unwrap();

        let got = received.lock().unwrap();
        let expected: Vec<u64> = (0..37).collect();
        assert_eq!(*got, expected);
    }

    #[test]
    fn stop_wakes_blocked_puller() {
        let (feed, _closed) = in_feed(0, 4, 4);
        // never opened: queue stays empty until stop
        let waiter = {
            let feed = Arc::clone(&feed);
            std::thread::spawn(move || {
                let mut record = 0u64;
                let mut lock = feed.acquire_pull_lock();
                lock.pull(&mut record)
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        feed.stop();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn io_error_surfaces_on_join() {
        let feed = BufferedFeed::new(
            "failing-in",
            Direction::In,
            0,
            4,
            4,
            FailingSource {
                produced: 0,
                good: 2,
            },
            CorruptPolicy::Abort,
        )
        .unwrap();
        feed.open();

        // drain whatever arrives until the feed dies
        let mut record = 0u64;
        loop {
            let mut lock = feed.acquire_pull_lock();
            if !lock.pull(&mut record) {
                break;
            }
        }
        let outcome = feed.join();
        assert!(matches!(outcome, Err(Error::Io { .. })));
    }

    #[test]
    fn resolution_recalibration_keeps_queued_multiset() {
        let (feed, _closed) = in_feed(10, 10, 10);
        feed.open();
        // wait until the first swap fills the queue
        {
            let lock = feed.acquire_pull_lock();
            assert_eq!(lock.queued(), 10);
        }
        // consume three so the occupancy is no longer aligned to 7
        let mut record = 0u64;
        for expected in 0..3u64 {
            let mut lock = feed.acquire_pull_lock();
            assert!(lock.pull(&mut record));
            assert_eq!(record, expected);
        }
        feed.calibrate_resolution(7).unwrap();

        let mut rest = Vec::new();
        loop {
            let mut lock = feed.acquire_pull_lock();
            if !lock.pull(&mut record) {
                break;
            }
            rest.push(record);
        }
        feed.join().unwrap();
        rest.sort_unstable();
        assert_eq!(rest, vec![3, 4, 5, 6, 7, 8, 9]);
    }
}
