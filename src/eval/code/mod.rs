//! Instruction graph: nodes, construction and execution
pub mod builder;
pub mod execute;
pub mod instruction;
pub mod package;
