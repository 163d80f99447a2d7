use std::result::Result as StdResult;
use thiserror::Error;

/// Failures raised while managing disposable test containers.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("Container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),
}

/// `Result` alias for test-infrastructure operations.
pub type Result<T> = StdResult<T, TestInfraError>;
