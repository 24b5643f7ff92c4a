pub mod buffered;
pub mod channel;
pub mod cyclic;

pub use buffered::BufferedFeed;
pub use buffered::CorruptPolicy;
pub use buffered::Direction;
pub use buffered::PullLock;
pub use buffered::PushLock;
pub use buffered::Slot;
pub use channel::OutputChannel;
pub use channel::SegmentFeed;
pub use cyclic::CyclicBuffer;
