pub mod cli;
pub mod commands;
pub mod config;
pub mod shell;

pub use cli::{Cli, Command, DatasourceCommand};
pub use config::{load_cli_settings, save_cli_settings, CliSettings};
pub use shell::{notice_for, spawn_session_watcher, Shell};
