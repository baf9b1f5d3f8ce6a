mod clock;
mod machine;
pub mod persist;
mod phase;

pub use clock::{Clock, ManualClock, SystemClock};
pub use machine::{
    next_phase, CatchUpPolicy, Countdown, PhaseMachine, TimerSnapshot, TimerState,
    MAX_CATCH_UP_STEPS, SESSIONS_PER_LONG_BREAK,
};
pub use persist::{RestoreSource, Restored};
pub use phase::Phase;
