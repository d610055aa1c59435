pub mod commands;
pub mod events;
pub mod history;
pub mod idle;
pub mod prompts;
pub mod session;
pub mod tool_loop;

pub use commands::{Command, CommandParser, derive_sentinel};
pub use events::{NotificationKind, Notifier, Presence, PresenceSource};
pub use history::TurnHistory;
pub use idle::IdleScheduler;
pub use session::{Session, TurnGate, TurnPermit};
pub use tool_loop::{FALLBACK_REPLY, LoopOutcome, run_tool_loop};
