/// Poll scheduler and command loop of a match session.
pub mod session;
/// Forced refresh when a flag falls.
pub mod watchdog;

pub use self::session::{SessionCommand, SessionHandle};
pub use self::watchdog::TimeoutWatchdog;
