pub mod commands;
pub mod console;
pub mod render;

pub use console::{input_loop, render_loop};
