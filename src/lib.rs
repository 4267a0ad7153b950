// Card Reconciler - Core Library
// Matches organizations' card usage reports against the loyalty card export
// and prepares import files for newly seen cards

pub mod error;
pub mod card;
pub mod config;
pub mod origin;
pub mod external;
pub mod index;
pub mod phones;
pub mod reconciliation;
pub mod output;
pub mod storage;
pub mod pipeline;

#[cfg(feature = "sftp")]
pub mod remote;

// Re-export commonly used types
pub use error::{ReconcileError, Result};
pub use card::{parse_card_identity, CardIdentity, CardParseError};
pub use config::{OrgNames, ReconcilerConfig, RemoteConfig};
pub use origin::{load_origin, read_origin, CategoryRules, OriginRecord};
pub use external::{ExternalFile, ExternalRow, ExternalSource, LocalDirSource};
pub use index::{CardState, IndexStats, OriginIndex};
pub use phones::{PhoneAllocator, PhoneCounter};
pub use reconciliation::{
    Classification, ReconciliationEngine, ReconciliationReport, ReconciliationStats,
};
pub use output::{save_reports, OutputRecord, ReportGroups};
pub use pipeline::{run, RunSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
