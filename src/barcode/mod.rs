pub mod barcode;
pub mod decoder;
pub mod distance;

pub use barcode::Barcode;
pub use barcode::LikelihoodModel;
pub use decoder::Decoded;
pub use decoder::Decoder;
pub use decoder::MinDistanceDecoder;
pub use decoder::ProbabilisticDecoder;
pub use distance::DistanceMatrix;
