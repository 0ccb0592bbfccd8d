//! Experience storage
//!
//! - [`path`]: one rollout's per-step records
//! - [`tensor`]: concatenation, stacking and padding of per-step data
//! - [`replay`]: fixed-capacity circular transition store for off-policy
//!   and model-learning updates

pub mod path;
pub mod replay;
pub mod tensor;

pub use path::Path;
pub use replay::{BufferStats, ReplayBuffer, TransitionBatch};
pub use tensor::{InfoDict, TensorDict};
