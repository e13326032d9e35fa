use thiserror::Error;

/// Failures that abort a chat request.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The provider call itself failed (transport, HTTP status, bad payload).
    #[error("model call failed: {0:#}")]
    Model(#[from] anyhow::Error),

    #[error("psychological analysis unavailable: no structured result after fallback")]
    AnalysisUnavailable,

    #[error("cannot generate a reply without an analysis")]
    MissingAnalysis,

    #[error("model returned an empty reply")]
    EmptyModelResponse,

    #[error("workflow finished without a reply")]
    EmptyReply,
}
