use thiserror::Error;

#[derive(Debug, Error)]
pub enum RatingError {
    /// A race result referenced a player with no loaded ranking entry. The
    /// whole update is aborted before any mutation when this happens.
    #[error("no ranking entry for online id {online_id}")]
    UnknownPlayer { online_id: u32 },

    #[error("failed to parse snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error)
}
