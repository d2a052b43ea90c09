//! Placeholder engine wired by the shipped binary.
//!
//! The media engine is an external collaborator. Until an embedding
//! application supplies a real [`MediaEngine`], every router allocation
//! fails, so joins are answered with `EngineUnavailable`.

use super::{EngineError, MediaEngine, Router, RtpCodecCapability};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Engine that refuses every router allocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredEngine;

#[async_trait]
impl MediaEngine for UnconfiguredEngine {
    async fn create_router(
        &self,
        _codecs: &[RtpCodecCapability],
    ) -> Result<Arc<dyn Router>, EngineError> {
        warn!(
            target: "rc.media",
            "Router requested but no media engine is configured"
        );
        Err(EngineError::Unavailable(
            "no media engine configured".to_string(),
        ))
    }
}
