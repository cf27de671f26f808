//! Wire formats shared by all three binaries: stream messages, snapshot and
//! delta state, the id-shortening table, the action table, and the model
//! payload format (`spec.md` §6).

pub mod action;
pub mod ids;
pub mod message;
pub mod model_payload;
pub mod snapshot;

pub use action::{ACTION_SIZE, ACTION_TABLE};
pub use ids::IdTable;
pub use message::StreamMessage;
pub use snapshot::{build_delta, Snapshot};
