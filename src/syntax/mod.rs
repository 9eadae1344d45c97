pub mod error;
pub mod keywords;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

pub use parser::parse_package;
