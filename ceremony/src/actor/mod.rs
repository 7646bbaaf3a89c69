//! Serve a [Ceremony](crate::Ceremony) to concurrent callers.
//!
//! # Overview
//!
//! The [Actor] owns the ceremony and applies every [Command](crate::Command) it receives
//! through its [Mailbox], one at a time. Because a single task performs all mutations, two
//! submissions racing to complete a phase (or a submission racing an abort) are resolved in
//! arrival order and each caller observes a consistent outcome.
//!
//! # Timeouts
//!
//! If the ceremony has a phase timeout, the actor sleeps until the active round's deadline
//! alongside its mailbox and aborts the round when the deadline passes first. Any transition
//! moves the deadline.
//!
//! # Metrics
//!
//! The actor registers counters for processed commands (by outcome), rounds started,
//! completed, aborted, and timed out, and a gauge of registered participants.

mod actor;
pub use actor::Actor;
mod config;
pub use config::Config;
mod ingress;
pub use ingress::Mailbox;
pub(crate) use ingress::Message;
mod metrics;
