use thiserror::Error;

use crate::{
    application::{generator::GenerateError, repos::RepoError},
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Validation(_) | AppError::Domain(DomainError::Validation { .. }) => 2,
            AppError::Generate(GenerateError::InvalidPath { .. }) => 2,
            AppError::Repo(RepoError::InvalidInput { .. }) => 2,
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            _ => 1,
        }
    }
}
