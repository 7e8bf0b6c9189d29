use convoy_cloud::CloudError;
use convoy_routing::RoutingError;
use convoy_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Rejected before anything is persisted.
    #[error("container {0} declares no memory bound")]
    MissingMemoryBound(String),

    /// Rollback found no prior successful deployment to return to.
    #[error("no stable version of {0} to roll back to")]
    NoStableVersion(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}
