//! # Atelier Core
//!
//! The "Brain" of the Atelier system - shared design state, the
//! in-process message bus, specialist agents, and the orchestration
//! loop that turns natural language into a coherent furniture design.
//!
//! ## Architecture
//!
//! - `model` - Design, constraints, decisions, proposals
//! - `state/` - Versioned shared state with change trail and advisory locks
//! - `bus/` - In-process pub/sub and request/response messaging
//! - `agents/` - Specialist agents behind a uniform capability contract
//! - `harmony/` - Cohesion coordinator: conflict detection and resolution
//! - `orchestrator/` - Per-turn control loop and response synthesis
//! - `reasoning` - External text-generation collaborator with backoff
//! - `wire` - Partner envelope for third-party integrations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atelier_core::orchestrator::{Orchestrator, SessionConfig};
//!
//! let mut orchestrator = Orchestrator::new(SessionConfig::default());
//! let outcome = orchestrator.process_input("I want a bookshelf").await;
//! println!("{}", outcome.response);
//! ```

pub mod agents;
pub mod bus;
pub mod harmony;
pub mod model;
pub mod orchestrator;
pub mod reasoning;
pub mod state;
pub mod wire;

pub use harmony::{CohesionCoordinator, HarmonyReport};
pub use model::{AgentResponse, Design, DesignPatch};
pub use orchestrator::{Orchestrator, SessionConfig, TurnOutcome};
pub use state::{DesignSnapshot, SharedDesignState};
