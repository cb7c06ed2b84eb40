//! rxhub-app: the application-core side of the receiver.
//!
//! Protocol views fold decoded packets into recent-entries caches and show
//! them as scrollable tables. The `rxhub` binary wires them to an event
//! dispatcher with a terminal display, console input and timer tasks.

use thiserror::Error;

pub mod display;
pub mod input;
pub mod session;
pub mod table;
pub mod views;

pub use display::TerminalDisplay;
pub use input::{parse_command, Command, Console};
pub use session::{build_screen, replay_headless, ReplayReport, Screen};
pub use table::{RecentEntriesTable, TableRow};
pub use views::{Protocol, ProtocolView};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] rxhub_core::CoreError),
    #[error(transparent)]
    Baseband(#[from] rxhub_baseband::BasebandError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dispatcher thread failed: {0}")]
    Dispatcher(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
