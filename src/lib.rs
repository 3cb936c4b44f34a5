pub mod build_info;
pub mod compare;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod metrics;
pub mod report;
pub mod template;
pub mod value;
