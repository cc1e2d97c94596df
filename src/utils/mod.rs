pub use core_pinner::*;
pub use wait::*;

pub mod config_io;
mod core_pinner;
pub mod logger;
mod wait;
