//! `cogs-core` — shared abstractions for the cogs automation runtime.
//!
//! The cogs runtime lives inside a host page that can be torn down and
//! rebuilt at any moment, so everything environmental is injected:
//!
//! - [`Medium`] — the string-blob storage medium (a cookie jar in the real
//!   host). [`MemoryJar`] is an in-process implementation with the same
//!   semantics, used by embedders and tests alike.
//! - [`Timers`] — recurring timer scheduling. [`TokioTimers`] drives real
//!   time; [`ManualTimers`] is a deterministic test driver.
//! - [`Clock`] — wall time, so TTL handling is testable.
//! - [`TickObserver`] — the error boundary sink for task/step bodies.
//! - [`Page`] — the two DOM primitives the step machine consumes.

pub mod clock;
pub mod config;
pub mod error;
pub mod medium;
pub mod observer;
pub mod page;
pub mod timers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CogsConfig, SchedulerConfig, StoreConfig};
pub use error::{CoreError, Result};
pub use medium::{Medium, MemoryJar, HTTP_DATE_FORMAT, MAX_ENTRY_BYTES};
pub use observer::{LogObserver, TickObserver};
pub use page::Page;
pub use timers::{ManualTimers, TickFn, TimerHandle, Timers, TokioTimers};
