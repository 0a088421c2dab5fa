mod demo;
mod health;

pub use demo::{boom, greet};
pub use health::health_check;
