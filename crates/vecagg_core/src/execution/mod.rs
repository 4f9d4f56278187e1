pub mod interrupt;
pub mod operators;
pub mod source;
