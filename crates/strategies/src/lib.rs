//! # Meridian Strategy Library
//!
//! Sample strategies built on the engine's hook surface, together with the
//! `ta`-backed indicator adapters they use. Everything in this crate is a
//! *user* of the engine: it talks to the runtime exclusively through
//! [`engine::Strategy`] hooks and the [`engine::host::StrategyContext`]
//! surface, the same way an end user's strategy would.

pub mod ema_cross;
pub mod error;
pub mod indicators;

// Re-export the key components to provide a clean, public-facing API.
pub use ema_cross::{EmaCross, EmaCrossParams};
pub use error::StrategyError;
pub use indicators::{Atr, Ema};
