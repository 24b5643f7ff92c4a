use crate::runtime::Error;
use crate::sequence::Fragment;

///////////////////////////////
/// One segment of a sequencing read: the fragment view the classifier
/// consumes plus pass-through fields the core never interprets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Segment {
    pub name: Vec<u8>,
    pub fragment: Fragment,
    /// set when the platform flagged the read as failing quality control
    pub qc_fail: bool,
}

impl Segment {
    pub fn new() -> Segment {
        Segment::default()
    }

    pub fn clear(&mut self) {
        self.name.clear();
        self.fragment.clear();
        self.qc_fail = false;
    }
}

///////////////////////////////
/// A full record: one segment per input endpoint, assembled by pulling one
/// segment from each IN feed in configuration order.
#[derive(Clone, Debug, Default)]
pub struct Record {
    pub segments: Vec<Segment>,
}

impl Record {
    pub fn with_segments(count: usize) -> Record {
        Record {
            segments: vec![Segment::new(); count],
        }
    }

    pub fn qc_fail(&self) -> bool {
        self.segments.iter().any(|s| s.qc_fail)
    }

    pub fn clear(&mut self) {
        for s in self.segments.iter_mut() {
            s.clear();
        }
    }
}

/// What a decode call produced: a record in the slot, or a clean end of the
/// underlying stream. Errors travel separately through `Result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    Record,
    EndOfStream,
}

///////////////////////////////
/// The record-format collaborator: the only place the concrete on-disk
/// encoding is known. A feed's background thread calls `decode`/`encode`
/// while holding no queue lock; `close` must unblock any pending device
/// read so shutdown cannot hang.
pub trait RecordCodec<T>: Send {
    fn decode(&mut self, slot: &mut T) -> Result<DecodeOutcome, Error>;
    fn encode(&mut self, slot: &T) -> Result<(), Error>;
    fn close(&mut self) -> Result<(), Error>;
}
