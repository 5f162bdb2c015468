pub mod engine;
pub mod page;

pub use engine::{Aggregate, QueryEngine};
pub use page::{Page, PageRequest};
