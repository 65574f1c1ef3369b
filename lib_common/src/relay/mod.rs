//! # Relay Module
//!
//! This module forms the heart of the relay: it decides when to poll, what
//! window to poll, and who receives the results.
//!
//! ## Core Components:
//!
//! - **`stream`**: the allow-list and the validated stream names built from it.
//! - **`time_window`**: derives the `[lower, upper)` bounds for each poll.
//! - **`event`**: the update payload and its wire form.
//! - **`registry`**: the set of currently open subscribers.
//! - **`dispatcher`**: serializes an update once and fans it out.
//! - **`scheduler`**: the process-wide context and the self-rescheduling poll loop.
//! - **`lifecycle`**: the out-of-band sync run when a subscriber connects.

pub mod dispatcher;
pub mod event;
pub mod lifecycle;
pub mod registry;
pub mod scheduler;
pub mod stream;
pub mod time_window;

// --- Public API Re-exports ---
pub use dispatcher::Dispatcher;
pub use event::UpdateEvent;
pub use lifecycle::ConnectionLifecycle;
pub use registry::{Subscriber, SubscriberRegistry};
pub use scheduler::{CycleReport, PollScheduler, RelayContext, SchedulerState, DEFAULT_POLL_INTERVAL};
pub use stream::{AllowList, StreamBinding, StreamKind, StreamName, DEFAULT_ALLOWED_STREAMS};
pub use time_window::{TimeWindow, WindowCalculator, DEFAULT_FORWARD_SKEW, DEFAULT_LOOKBACK, MAX_WINDOW_OFFSET};
