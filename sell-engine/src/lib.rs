//! sell - host monetized services on a single machine.
//!
//! The engine brings up a host's supporting infrastructure, drives each
//! service through its lifecycle, publishes started services to the
//! marketplace, and reconciles what they have earned.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            sell CLI                              │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────────┐  │
//! │  │ Provisioner │─▶│ Orchestrator │─▶│  Publication Workflow   │  │
//! │  └─────────────┘  └──────────────┘  └─────────────────────────┘  │
//! │         │                │                      │                │
//! │         │                ▼                      │                │
//! │         │         ┌──────────────┐  ┌─────────────────────────┐  │
//! │         │         │ Status lines │◀─│ Balance Reconciler +    │  │
//! │         │         └──────────────┘  │ Earnings Store (SQLite) │  │
//! │         │                           └─────────────────────────┘  │
//! └─────────┼────────────────┼──────────────────────┼────────────────┘
//!           ▼                ▼                      ▼
//!   ┌───────────────┐ ┌──────────────┐   ┌──────────────────────┐
//!   │ System        │ │ Container    │   │ Marketplace REST API │
//!   │ installer     │ │ runtime      │   │ Wallets / channels   │
//!   └───────────────┘ └──────────────┘   └──────────────────────┘
//! ```

pub mod balance;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod earnings;
pub mod host;
pub mod lifecycle;
pub mod progress;
pub mod provisioner;
pub mod publication;
pub mod report;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use balance::{Balance, Reconciler, WalletStatus};
pub use cli::{App, Cli, Collaborators, Command};
pub use config::SellConfig;
pub use earnings::{EarningsRecord, EarningsStore, SqliteEarningsStore};
pub use lifecycle::{Orchestrator, RuntimeManager};
pub use provisioner::{DependencyUnit, Provisioner};
pub use publication::PublicationWorkflow;
pub use services::{Action, Outcome, Service, ServiceState};
