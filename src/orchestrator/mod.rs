pub mod artifacts;
pub mod capture;
pub mod definition;
pub mod error;
pub mod jig;
pub mod playbook;
pub mod runner;

pub use artifacts::*;
pub use capture::*;
pub use definition::*;
pub use error::*;
pub use jig::*;
pub use playbook::*;
pub use runner::*;
