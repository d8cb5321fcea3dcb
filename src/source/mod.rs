// ABOUTME: Local source acquisition: ephemeral git credentials and branch synchronisation.
// ABOUTME: The credential store only lives for the duration of the synchronisation stage.

mod credentials;
mod error;
mod sync;

pub use credentials::CredentialStore;
pub use error::{SourceError, SourceErrorKind};
pub use sync::{SourceSynchronizer, SyncAction, SyncOutcome};
