pub mod calibration;
pub mod camera;
pub mod config;
pub mod error;
pub mod measure;
#[cfg(feature = "desktop")]
pub mod pipeline;
pub mod pose;
pub mod protocol;
pub mod render;
pub mod server;
pub mod sizing;
pub mod snapshot;
pub mod studio;
pub mod tryon;

pub use error::{Error, Result};
