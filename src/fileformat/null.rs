use crate::model::{DecodeOutcome, RecordCodec};
use crate::runtime::Error;

///////////////////////////////
/// Discards everything. Used for outcomes whose output nobody asked for,
/// typically the unclassified bucket.
#[derive(Default)]
pub struct NullSink;

impl<T> RecordCodec<T> for NullSink {
    fn decode(&mut self, _slot: &mut T) -> Result<DecodeOutcome, Error> {
        Ok(DecodeOutcome::EndOfStream)
    }

    fn encode(&mut self, _slot: &T) -> Result<(), Error> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
