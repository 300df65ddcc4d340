//! One module per subcommand

pub mod config;
pub mod deploy;
pub mod logs;
pub mod ps;
pub mod remove;
