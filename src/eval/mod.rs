pub mod code;
pub mod emit;
pub mod error;
pub mod expr;
pub mod machine;
pub mod memory;
pub mod trace;
