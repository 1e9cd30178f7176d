//! The Execution Engine + Debugger (spec §4.C): schedules nodes over the
//! flow arena, moves values across edges, enforces concurrency and
//! timeouts, and exposes the debugger gate.

mod debugger;
mod scheduler;

pub use debugger::{Debugger, DebuggerState};
pub use scheduler::{Engine, ScheduleOptions};
