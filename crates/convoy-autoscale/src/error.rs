use convoy_cloud::CloudError;
use convoy_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutoscaleError {
    /// No service is registered to the cluster, so its largest
    /// container requirement cannot be computed.
    #[error("no services registered to cluster {0}")]
    UnknownCluster(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type AutoscaleResult<T> = Result<T, AutoscaleError>;
