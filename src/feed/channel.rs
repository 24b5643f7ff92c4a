use std::sync::{Arc, Mutex};

use crate::model::{Record, RecordCodec, Segment};
use crate::runtime::Error;
use crate::stats::SegmentQc;

use super::buffered::{BufferedFeed, PushLock};

///////////////////////////////
/// Push-side view of a feed carrying record segments. Object-safe so a
/// channel can bind feeds regardless of their concrete codec type.
pub trait SegmentFeed: Send + Sync {
    /// Position in the process-wide fixed lock order, assigned once at
    /// configuration time.
    fn global_index(&self) -> usize;
    fn name(&self) -> &str;
    fn acquire_push_lock(&self) -> PushLock<'_, Segment>;
    fn stop(&self);
    fn join(&self) -> Result<(), Error>;
}

impl<C: RecordCodec<Segment> + 'static> SegmentFeed for BufferedFeed<Segment, C> {
    fn global_index(&self) -> usize {
        BufferedFeed::global_index(self)
    }

    fn name(&self) -> &str {
        BufferedFeed::name(self)
    }

    fn acquire_push_lock(&self) -> PushLock<'_, Segment> {
        BufferedFeed::acquire_push_lock(self)
    }

    fn stop(&self) {
        BufferedFeed::stop(self)
    }

    fn join(&self) -> Result<(), Error> {
        BufferedFeed::join(self)
    }
}

///////////////////////////////
/// Binds one classification outcome to its per-segment output feeds and QC
/// accumulators. The binding is fixed at configuration time; only the QC
/// accumulators mutate during a run.
///
/// Distinct channels may share underlying feeds (interleaved output), so
/// `push` acquires every involved feed lock in the single process-wide
/// order given by `global_index`, never in a channel-local order. That one
/// total order is the deadlock-freedom argument.
pub struct OutputChannel {
    label: String,
    include_qc_failed: bool,
    /// one entry per record segment, in segment order
    feeds: Vec<Arc<dyn SegmentFeed>>,
    /// unique feeds in ascending global_index: the lock acquisition plan
    unique: Vec<Arc<dyn SegmentFeed>>,
    /// segment index -> position in `unique`
    segment_slot: Vec<usize>,
    qc: Mutex<Vec<SegmentQc>>,
}

impl OutputChannel {
    pub fn new(
        label: &str,
        feeds: Vec<Arc<dyn SegmentFeed>>,
        include_qc_failed: bool,
    ) -> OutputChannel {
        let mut order: Vec<usize> = (0..feeds.len()).collect();
        order.sort_by_key(|&i| feeds[i].global_index());

        let mut unique: Vec<Arc<dyn SegmentFeed>> = Vec::new();
        let mut segment_slot = vec![0usize; feeds.len()];
        for i in order {
            match unique
                .iter()
                .position(|f| f.global_index() == feeds[i].global_index())
            {
                Some(slot) => segment_slot[i] = slot,
                None => {
                    unique.push(Arc::clone(&feeds[i]));
                    segment_slot[i] = unique.len() - 1;
                }
            }
        }

        let qc = vec![SegmentQc::new(); feeds.len()];
        OutputChannel {
            label: label.to_string(),
            include_qc_failed,
            feeds,
            unique,
            segment_slot,
            qc: Mutex::new(qc),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn segment_count(&self) -> usize {
        self.feeds.len()
    }

    ///////////////////////////////
    /// Push all segments of one record atomically: every involved feed lock
    /// is held before the first segment lands and released, in reverse
    /// acquisition order, only after the last one has. Returns false if any
    /// feed refused the record (possible only after a failed or stopped
    /// run).
    pub fn push(&self, record: &Record) -> bool {
        assert_eq!(
            record.segments.len(),
            self.feeds.len(),
            "record shape must match channel binding"
        );

        let mut delivered = true;
        {
            // acquire in the fixed global order
            let mut locks: Vec<PushLock<'_, Segment>> =
                self.unique.iter().map(|f| f.acquire_push_lock()).collect();
            for (segment, &slot) in record.segments.iter().zip(self.segment_slot.iter()) {
                delivered &= locks[slot].push(segment);
            }
            // release in reverse order
            while let Some(lock) = locks.pop() {
                drop(lock);
            }
        }

        // QC accumulation stays outside the feed locks
        if delivered && (self.include_qc_failed || !record.qc_fail()) {
            let mut qc = self.qc.lock().expect("channel qc poisoned");
            for (accumulator, segment) in qc.iter_mut().zip(record.segments.iter()) {
                accumulator.record(segment.fragment.code(), segment.fragment.quality());
            }
        }
        delivered
    }

    /// Snapshot of the per-segment QC accumulators.
    pub fn qc(&self) -> Vec<SegmentQc> {
        self.qc.lock().expect("channel qc poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{CorruptPolicy, Direction};
    use crate::model::DecodeOutcome;
    use crate::sequence::Fragment;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Sink that only counts what it is handed.
    struct CountingSink {
        received: Arc<AtomicU64>,
    }

    impl RecordCodec<Segment> for CountingSink {
        fn decode(&mut self, _slot: &mut Segment) -> Result<DecodeOutcome, Error> {
            unreachable!()
        }

        fn encode(&mut self, _slot: &Segment) -> Result<(), Error> {
            self.received.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn close(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    fn sink_feed(
        name: &str,
        index: usize,
        received: &Arc<AtomicU64>,
    ) -> Arc<BufferedFeed<Segment, CountingSink>> {
        let feed = BufferedFeed::new(
            name,
            Direction::Out,
            index,
            16,
            16,
            CountingSink {
                received: Arc::clone(received),
            },
            CorruptPolicy::Abort,
        )
        .unwrap();
        feed.open();
        feed
    }

    fn one_segment_record(seq: &[u8]) -> Record {
        let mut record = Record::with_segments(1);
        record.segments[0].name = b"read".to_vec();
        record.segments[0].fragment = Fragment::from_ascii(seq, 40);
        record
    }

    #[test]
    fn shared_feed_receives_all_pushes_without_deadlock() {
        let received = Arc::new(AtomicU64::new(0));
        let shared = sink_feed("shared", 0, &received);

        let a = Arc::new(OutputChannel::new(
            "sample-a",
            vec![Arc::clone(&shared) as Arc<dyn SegmentFeed>],
            false,
        ));
        let b = Arc::new(OutputChannel::new(
            "sample-b",
            vec![Arc::clone(&shared) as Arc<dyn SegmentFeed>],
            false,
        ));

        let pushers: Vec<_> = [a, b]
            .into_iter()
            .map(|channel| {
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        assert!(channel.push(&one_segment_record(b"ACGT")));
                    }
                })
            })
            .collect();
        for p in pushers {
            p.join().unwrap();
        }

        shared.stop();
        SegmentFeed::join(shared.as_ref()).unwrap();
        assert_eq!(received.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn opposite_segment_orders_cannot_deadlock() {
        let received = Arc::new(AtomicU64::new(0));
        let first = sink_feed("first", 0, &received);
        let second = sink_feed("second", 1, &received);

        // both channels bind both feeds, with segment order reversed; the
        // lock plan still acquires in global-index order for both
        let forward = Arc::new(OutputChannel::new(
            "forward",
            vec![
                Arc::clone(&first) as Arc<dyn SegmentFeed>,
                Arc::clone(&second) as Arc<dyn SegmentFeed>,
            ],
            false,
        ));
        let reverse = Arc::new(OutputChannel::new(
            "reverse",
            vec![
                Arc::clone(&second) as Arc<dyn SegmentFeed>,
                Arc::clone(&first) as Arc<dyn SegmentFeed>,
            ],
            false,
        ));

        let mut record = Record::with_segments(2);
        record.segments[0].fragment = Fragment::from_ascii(b"AC", 40);
        record.segments[1].fragment = Fragment::from_ascii(b"GT", 40);

        let pushers: Vec<_> = [forward, reverse]
            .into_iter()
            .map(|channel| {
                let record = record.clone();
                std::thread::spawn(move || {
                    for _ in 0..300 {
                        assert!(channel.push(&record));
                    }
                })
            })
            .collect();
        for p in pushers {
            p.join().unwrap();
        }

        first.stop();
        second.stop();
        SegmentFeed::join(first.as_ref()).unwrap();
        SegmentFeed::join(second.as_ref()).unwrap();
        // 600 records, two segments each
        assert_eq!(received.load(Ordering::Relaxed), 1200);
    }

    #[test]
    fn qc_accumulates_after_push_and_skips_failed_reads() {
        let received = Arc::new(AtomicU64::new(0));
        let feed = sink_feed("qc", 0, &received);
        let channel = OutputChannel::new(
            "qc-channel",
            vec![Arc::clone(&feed) as Arc<dyn SegmentFeed>],
            false,
        );

        let good = one_segment_record(b"ACGT");
        let mut failed = one_segment_record(b"ACGT");
        failed.segments[0].qc_fail = true;

        assert!(channel.push(&good));
        assert!(channel.push(&failed));

        let qc = channel.qc();
        // only the passing record is accumulated
        assert_eq!(qc[0].record_count, 1);
        assert_eq!(qc[0].total_bases, 4);

        feed.stop();
        SegmentFeed::join(feed.as_ref()).unwrap();
        // but both records were routed to the feed
        assert_eq!(received.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn include_qc_failed_channel_counts_everything() {
        let received = Arc::new(AtomicU64::new(0));
        let feed = sink_feed("qc-all", 0, &received);
        let channel = OutputChannel::new(
            "qc-all-channel",
            vec![Arc::clone(&feed) as Arc<dyn SegmentFeed>],
            true,
        );
        let mut failed = one_segment_record(b"ACGT");
        failed.segments[0].qc_fail = true;
        assert!(channel.push(&failed));
        assert_eq!(channel.qc()[0].record_count, 1);
        feed.stop();
        SegmentFeed::join(feed.as_ref()).unwrap();
    }
}
