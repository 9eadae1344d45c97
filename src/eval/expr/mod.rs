//! Expression nodes and their evaluation
pub mod arith;
pub mod call;
pub mod evaluate;
pub mod expression;
pub mod message;
