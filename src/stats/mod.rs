pub mod accumulator;
pub mod qc;

pub use accumulator::OptionStats;
pub use accumulator::SelectorStats;
pub use qc::SegmentQc;
