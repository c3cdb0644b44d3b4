//! Transport abstraction for delivering artifacts to relays

use async_trait::async_trait;
use murmur_core::{Artifact, DraftArtifact, Result};

/// Delivers a draft to the network and returns the accepted artifact.
///
/// Implementations own signing and relay fan-out. Failures are treated as
/// transient by the publish path.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, draft: DraftArtifact) -> Result<Artifact>;
}
