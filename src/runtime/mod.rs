pub mod error;
pub mod process;

pub use error::*;
pub use process::*;
