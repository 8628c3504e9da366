pub mod audit;
pub mod error;
pub mod manager;
pub mod plan;
pub mod schema;
pub mod store;
pub mod synthesize;

pub use audit::{AuditOptions, AuditReport, AuditStats, ClusterPredicate, StaticClassifier};
pub use error::SubstrateError;
pub use manager::{ApplyOutcome, SubstrateEvent, SubstrateManager, SubstrateSettings, SynthesisPreview};
pub use plan::{ArchiveAction, PlanTarget, SourceDisposition, SynthesisOperation, SynthesisPlan};
pub use schema::KnowledgeNode;
pub use store::{InMemoryRepository, JsonFileRepository, NodeRepository};
pub use synthesize::SynthesisStrategy;
