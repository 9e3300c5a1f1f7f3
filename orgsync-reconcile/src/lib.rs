//! # orgsync-reconcile
//!
//! Reconciles the declarative configuration with the live organization, corrects drift in
//! both directions and enforces the quarantine policy.
//!
//! Call [`pipeline::run`] for a full run or [`pipeline::validate`] for a read-only pass.
//! Collaborators are passed in as trait objects ([`clients`]); [`memory`], [`repository`] and
//! [`state`] provide local implementations.

pub mod clients;
pub mod diff;
pub mod drift;
pub mod engine;
pub mod error;
pub mod guardian;
pub mod matcher;
pub mod memory;
pub mod pipeline;
pub mod publisher;
pub mod repository;
pub mod state;
pub mod tree;

pub use clients::{
    ClientError, OrganizationDirectory, PolicyClient, PublishedState, SourceControl, StateStore,
};
pub use drift::{CorrectionReport, DriftCorrector};
pub use engine::{Reconciliation, ReconciliationEngine};
pub use error::ReconcileError;
pub use guardian::{GuardPlan, GuardReport, PolicyGuardian};
pub use memory::InMemoryOrganization;
pub use pipeline::{Collaborators, ConfigLocation, RunOptions, RunReport};
pub use publisher::{PublishOutcome, ResultPublisher};
pub use repository::LocalRepository;
pub use state::FileStateStore;
pub use tree::OrgTree;
