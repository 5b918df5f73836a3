// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Multi-process log fan-in.
//!
//! Any number of producers (threads in this process, or worker processes
//! connected over a Unix socket) push [`logging::LogRecord`]s onto one
//! shared queue. A single listener thread drains it into leveled console
//! and file sinks, keeps a bounded replay history and feeds live
//! subscribers.

pub mod config;
pub mod ipc;
pub mod logging;
pub mod supervisor;
pub mod worker;

pub use config::{Config, ConfigError, ConfigService};
pub use ipc::{IngressServer, RemoteQueue};
pub use logging::{FanIn, FanInError, ListenerConfig, LogRecord, Logger, Registration, Severity};
