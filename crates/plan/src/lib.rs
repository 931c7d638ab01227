//! Deployment planning for deltaplan
//!
//! Given an [`OperationMap`](deltaplan_config::OperationMap) and a change set,
//! this crate works out which operations must run and in what order:
//!
//! 1. [`OperationGraph`] validates relations and rejects ordering cycles.
//! 2. [`FileMatcher`] maps changed files to impacted operations.
//! 3. [`Resolver`] expands the impacted set and orders it deterministically.
//! 4. [`FastTrackClassifier`] prunes conditional work when only configuration changed.
//! 5. [`validate`] checks every planned operation's required variables.
//!
//! [`DeployPlanner`] strings these together and caches graphs by map fingerprint.
//! None of the steps perform I/O.

pub mod cache;
pub mod collaborators;
pub mod fast_track;
pub mod graph;
pub mod matcher;
pub mod pipeline;
pub mod resolver;
pub mod validator;

pub use cache::{GraphCache, GraphCacheConfig, GraphCacheStats};
pub use collaborators::{ChangeSource, StaticChanges, VariableSource};
pub use fast_track::{FastTrackClassifier, FastTrackDecision, FastTrackOutcome, FastTrackReason};
pub use graph::{OperationGraph, RelationKind};
pub use matcher::{FileMatcher, MatchResult};
pub use pipeline::{DeployPlanner, Escalation, PlanMode, PlanOutcome, PlanRequest, Seed};
pub use resolver::{ExecutionPlan, Resolver};
pub use validator::{validate, ValidationReport};
