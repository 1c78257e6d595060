//! Built-in lifecycle handlers.
//!
//! One handler per lifecycle transition; the coordinator drives them in
//! the order the worker registers them.

mod abandon;
mod deprioritize;
mod precondition;
mod schedule;
mod start;
mod terminate;

pub use abandon::AbandonHandler;
pub use deprioritize::DeprioritizeHandler;
pub use precondition::CheckPreconditionHandler;
pub use schedule::ScheduleHandler;
pub use start::StartHandler;
pub use terminate::TerminateHandler;
