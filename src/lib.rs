//! Data access and view state for a services dashboard.
//!
//! The [`core`] module holds the cached query client and the state machines
//! behind the list, the add/edit dialog and the event history feed. The
//! [`mock`] module serves an in-memory version of the REST API they talk to.

pub mod config;
pub mod core;
pub mod error;
pub mod mock;

pub use crate::core::{QueryClient, Revalidator};
pub use crate::error::{Error, Result};
