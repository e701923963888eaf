pub mod driver;
pub mod normalizer;
pub mod reconciler;
pub mod throttle;
