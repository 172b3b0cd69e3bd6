#![deny(clippy::all)]

mod color;
mod sync;

pub use color::Colors;
pub use color::init as color_init;
pub use sync::mutex_lock_or_recover;
