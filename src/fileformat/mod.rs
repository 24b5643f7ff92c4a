pub mod fastq;
pub mod null;

pub use fastq::open_fastq;
pub use fastq::FastqSink;
pub use fastq::FastqSource;
pub use null::NullSink;
