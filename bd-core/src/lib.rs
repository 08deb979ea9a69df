//! Platform layer for BoardPilot.
//!
//! Holds the shared error taxonomy, identity/context models, clock and
//! cron utilities, and the data-access traits the orchestration layer is
//! written against. Backends live in `dev` (in-memory) and `sqlite`.

pub mod authz;
pub mod board;
pub mod clock;
pub mod cron;
pub mod dev;
pub mod error;
pub mod ledger;
pub mod models;
pub mod schedule;
pub mod secrets;
pub mod sqlite;
pub mod webhook;

pub use error::{Error, Result};
pub use models::{AccessLevel, ActionContext, DelegationContext, OrgId, ProjectId, UserId};
