#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid job identifier: {0:?}")]
    InvalidJobId(String),

    #[error("Progress {0} is outside 0..=100")]
    InvalidProgress(i64),
}
