//! CLI crate for the sturnus training and evaluation tool.

pub mod cli;
pub mod eval;
pub mod train;
