pub mod demux;

pub use demux::DemuxCMD;
