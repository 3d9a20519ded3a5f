pub mod node;
pub mod role;
pub mod run;

pub use node::*;
pub use role::*;
pub use run::*;
