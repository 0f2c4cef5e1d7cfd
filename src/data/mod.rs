pub mod batch;
pub mod feature;
pub mod reading;

pub use batch::Batch;
pub use feature::FeatureRow;
pub use reading::{Channel, Reading, CHANNEL_COUNT};
