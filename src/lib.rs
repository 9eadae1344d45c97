pub mod common;
pub mod driver;
pub mod eval;
pub mod syntax;
