mod codec;
mod config;
mod encoding;
mod errors;
mod header;
mod heap;
mod latch;
mod marker;
mod node;
mod slot;
mod util;

pub use crate::codec::{move_data, PageCursor};
pub use crate::config::NodeConfig;
pub use crate::encoding::{
    BytesEncoder, Encoder, EncoderRegistry, FixedU32Encoder, FixedU64Encoder, UNBOUNDED_MAX_SIZE,
};
pub use crate::errors::NodeError;
pub use crate::latch::{LatchSession, MemLatch, PageLatch};
pub use crate::marker::{Marker, MARKER_SIZE};
pub use crate::node::Node;
pub use crate::util::{is_insertion_point, to_index, to_insertion_point, to_minus_one_based_index};
