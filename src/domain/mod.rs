pub mod collector;
pub mod manifest;
pub mod pattern;
pub mod report;

pub use collector::{CollectObserver, Collector};
pub use report::{MetricValue, Outcome, Report};
