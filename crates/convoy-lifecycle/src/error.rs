use convoy_cloud::CloudError;
use convoy_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
