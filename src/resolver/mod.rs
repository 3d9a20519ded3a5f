pub mod conditions;
pub mod error;
pub mod evaluate;
pub mod expr;
pub mod functions;
pub mod path;

pub use conditions::*;
pub use error::*;
pub use evaluate::*;
pub use expr::*;
pub use functions::*;
pub use path::*;
