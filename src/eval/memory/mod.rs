//! Allocation and memory management for the machine
pub mod collect;
pub mod envelope;
pub mod header;
pub mod heap;
pub mod mutator;
pub mod object;
pub mod string;
pub mod walk;
