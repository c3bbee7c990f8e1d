//! Proactive refresh state machine using rust-fsm.
//!
//! ```text
//!            Arm                    Fire
//!  ┌──────┐ ─────► ┌───────────┐ ─────────► ┌────────────┐
//!  │ Idle │        │ Scheduled │            │ Refreshing │
//!  └──────┘ ◄───── └───────────┘ ◄───────── └────────────┘
//!     ▲     Disarm      ▲  │ Arm     Arm          │
//!     │                 └──┘                      │
//!     └───────────────────────────────────────────┘
//!                        Disarm
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub refresh_machine(Idle)

    Idle => {
        Arm => Scheduled,
        Disarm => Idle
    },
    Scheduled => {
        // Tokens changed while waiting; timer replaced
        Arm => Scheduled,
        Fire => Refreshing,
        Disarm => Idle
    },
    Refreshing => {
        // New tokens stored
        Arm => Scheduled,
        // Refresh failed or session ended
        Disarm => Idle
    }
}

pub use refresh_machine::Input as RefreshMachineInput;
pub use refresh_machine::State as RefreshMachineState;
pub use refresh_machine::StateMachine as RefreshMachine;

/// Scheduler state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No timer armed.
    Idle,
    /// Timer armed for the next proactive refresh.
    Scheduled,
    /// Timer fired; refresh in flight.
    Refreshing,
}

impl From<&RefreshMachineState> for SchedulerState {
    fn from(state: &RefreshMachineState) -> Self {
        match state {
            RefreshMachineState::Idle => SchedulerState::Idle,
            RefreshMachineState::Scheduled => SchedulerState::Scheduled,
            RefreshMachineState::Refreshing => SchedulerState::Refreshing,
        }
    }
}
