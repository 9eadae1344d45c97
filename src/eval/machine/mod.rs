//! The execution machine and its runtime object model
pub mod activation;
pub mod builtins;
pub mod classes;
pub mod metrics;
pub mod stack;
pub mod vm;
