pub mod error;
pub mod lock;
pub mod manager;
pub mod source;

pub use error::*;
pub use lock::*;
pub use manager::*;
pub use source::*;
