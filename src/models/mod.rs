pub mod dataset;
pub mod enums;
pub mod item;

pub use dataset::{Dataset, DatasetStats};
pub use enums::{DatasetStatus, ReviewStatus};
pub use item::Item;
