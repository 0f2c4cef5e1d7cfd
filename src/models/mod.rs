pub mod base_model;
pub mod iforest;
pub mod model_detector;
pub mod threshold;
