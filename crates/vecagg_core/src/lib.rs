pub mod arrays;
pub mod config;
pub mod execution;
pub mod expr;
pub mod functions;
pub mod testutil;
