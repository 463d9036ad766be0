//! `cogs-scheduler` — polling task scheduler with durable cross-reload state.
//!
//! # Overview
//!
//! A [`ThreadController`] manages two kinds of work inside a cooperatively
//! scheduled host:
//!
//! - **Recurring tasks** — named, independently-intervalled callbacks with
//!   sleep/wake control. Not resumable across reloads (bodies are code);
//!   scripts re-register them on every load.
//! - **A step machine** — an ordered list of guarded steps executed strictly
//!   one at a time by a single driving timer. Progress (`{index, active}`)
//!   is persisted to the durable store on every mutation, so a sequence
//!   interrupted by a page reload resumes at the saved index once the owner
//!   has re-registered the steps.
//!
//! # Step outcomes
//!
//! | Outcome   | Effect                                            |
//! |-----------|---------------------------------------------------|
//! | `Retry`   | Same step again next tick                         |
//! | `Advance` | Index incremented, persisted, `on_advance` fired  |
//! | `Fail`    | Reported to the observer, same step next tick     |
//!
//! A panicking guard, action or task body is caught at the invocation
//! boundary, reported through the injected [`TickObserver`], and never stops
//! the scheduler.
//!
//! [`TickObserver`]: cogs_core::TickObserver

pub mod controller;
pub mod error;
pub mod types;

pub use controller::ThreadController;
pub use error::{Result, SchedulerError};
pub use types::{ControllerState, Step, StepOutcome};
