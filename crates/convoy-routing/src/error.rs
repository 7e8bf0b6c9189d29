use convoy_cloud::CloudError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type RoutingResult<T> = Result<T, RoutingError>;
