pub mod sample;
pub mod errors;

pub use sample::*;
pub use errors::*;
