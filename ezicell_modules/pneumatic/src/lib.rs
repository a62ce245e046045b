extern crate ezicell_core;

pub mod pin_config;
pub mod slide;
pub mod manager;

pub use pin_config::IoPinConfig;
pub use slide::{PneumaticSlide, SlideState, StateCallback};
pub use manager::{PneumaticError, PneumaticManager};
