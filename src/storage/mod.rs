pub mod engine;
pub mod locks;
pub mod memory;
pub mod query;
pub mod table;

pub use engine::{Store, TxView};
pub use locks::RowLockManager;
pub use memory::MemoryStore;
pub use query::{RawQuery, StoreQuery, Visibility};
pub use table::Table;
