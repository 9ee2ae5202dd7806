pub mod access;
pub mod archive;
pub mod codec;
pub mod container;
pub mod error;
pub mod member;

pub use archive::{AppendOptions, Archive, OpenFlags};
pub use container::Entry;
pub use error::{Result, VarkError};
pub use member::DEFAULT_SHARD_SIZE;
