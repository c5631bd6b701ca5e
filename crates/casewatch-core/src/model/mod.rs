pub mod artifact;
pub mod change;
pub mod record;
pub mod snapshot;

pub use artifact::{ArtifactBlob, ArtifactEntry};
pub use change::{ChangeEvent, ChangeKind};
pub use record::{RawRecord, Record, SkipReason};
pub use snapshot::{CanonicalState, Snapshot};
