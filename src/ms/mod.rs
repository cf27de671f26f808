//! Model Store (MS): the allocation and persistence service sitting between
//! the GBE/AIB processes and the on-disk model table (`spec.md` §4.4).

pub mod server;
pub mod store;

pub use server::Server;
pub use store::Store;
