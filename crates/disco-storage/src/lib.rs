pub mod fjall;
pub mod mem;
pub mod traits;
pub mod ttl;

pub use crate::fjall::{FjallStore, PersistentStore};
pub use mem::InMemoryStore;
pub use traits::LocalStore;
pub use ttl::ExpirySweep;
