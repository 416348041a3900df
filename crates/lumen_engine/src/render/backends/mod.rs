//! Graphics backend implementations
//!
//! Contains backends implementing [`GraphicsDevice`](crate::render::api::GraphicsDevice).
//! The headless backend runs entirely on the CPU and is the reference
//! implementation for the trait's contract; GPU backends live in separate
//! integration crates so this one never links a graphics driver.

pub mod headless;

pub use headless::{BlitRecord, ClearRecord, DrawRecord, HeadlessDevice};
