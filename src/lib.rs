pub mod cli;
pub mod commands;
pub mod hypothesis;
pub mod model;
mod util;
