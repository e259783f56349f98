pub mod deps;
pub mod enrich;
pub mod local_meta;
pub mod model;
pub mod service;
pub mod store;
pub mod sync;
pub mod updates;
pub mod verify;

pub use model::{
    ConflictPrediction, EnrichmentResult, InitSummary, ModConflict, ModDependency, ModRecord,
    ModSource, ModsFile, SyncResult, UpdateCheckResult, VerificationResult, VerificationStatus,
};
pub use service::ModService;
pub use store::ModStore;
