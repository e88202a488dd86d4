//! # rf-lootbox: Weighted reward opening engine
//!
//! Runs "loot crate" openings: a requester spends a token, the engine draws a
//! winning reward by weight, plays an animated reveal that slows down towards
//! the end, then hands the reward to a delivery collaborator exactly once.
//!
//! ## Features
//!
//! - **Chance Allocation**: Manual and automatic weights that always sum to 100
//! - **Weighted Selection**: Cumulative-weight draw over an immutable snapshot
//! - **Reveal Scheduling**: Quadratic ease-in delay plans under a fixed budget
//! - **Session State Machine**: Token refund on every failure path
//! - **Session Manager**: Heartbeat-driven registry with reap and shutdown
//!
//! ## Architecture
//!
//! ```text
//! SessionManager (heartbeat)
//!     │
//!     └── OpeningSession
//!           ├── TokenLedger       (consume / refund)
//!           ├── CatalogSource     (snapshot) ◀── ChanceAllocator
//!           ├── RewardSelector    (winner, decoys)
//!           ├── RevealScheduler   (delay plan)
//!           ├── PresentationSink  (RevealFrame per step)
//!           └── RewardDelivery    (commit)
//! ```

pub mod allocator;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod layout;
pub mod manager;
pub mod memory;
pub mod presentation;
pub mod scheduler;
pub mod selector;
pub mod session;

pub use allocator::*;
pub use catalog::*;
pub use collaborators::*;
pub use config::*;
pub use error::*;
pub use layout::*;
pub use manager::*;
pub use memory::*;
pub use presentation::*;
pub use scheduler::*;
pub use selector::*;
pub use session::*;
