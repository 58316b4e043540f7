pub mod cli;
pub mod commands;
pub mod logging;
mod render;

pub use commands::run;
