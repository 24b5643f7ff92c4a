pub mod fragment;
pub mod phred;

pub use fragment::Fragment;
pub use fragment::ANY_CODE;
pub use phred::PhredTable;
