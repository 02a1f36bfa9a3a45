//! weft: streaming tool-call agent orchestrator.
//!
//! Folds an ordered stream of model generation events into an append-only
//! conversation log, runs the tools the model calls, keeps every tool call
//! paired with exactly one result before the history goes back to the model,
//! and lets a remote client rebuild the same log from discrete transport
//! messages.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use weft::prelude::*;
//! use weft::model::scripted::{ScriptStep, ScriptedModel};
//!
//! # async fn example() -> weft::error::Result<()> {
//! let model = Arc::new(ScriptedModel::new([ScriptStep::new(vec![
//!     StreamEvent::text("Hello"),
//!     StreamEvent::finish(FinishReason::Stop),
//! ])]));
//! let orchestrator = Orchestrator::new(model, ToolSet::new(), WeftConfig::from_env()?);
//! let outcome = orchestrator
//!     .run(Vec::new(), Message::user("Hi"), &mut ())
//!     .await?;
//! println!("{}", outcome.messages[1].text());
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod fold;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;
pub mod prelude;
pub mod projection;
pub mod reducer;
pub mod repair;
pub mod store;
pub mod stream_transform;
pub mod tools;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;
