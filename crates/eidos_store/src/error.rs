use thiserror::Error;

#[derive(Debug, Error)]
pub enum EidosError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("unsupported model type: {message}")]
    UnsupportedType { message: String },
}

impl EidosError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedType {
            message: message.into(),
        }
    }
}

pub type EidosResult<T> = Result<T, EidosError>;

impl From<sea_orm::DbErr> for EidosError {
    fn from(value: sea_orm::DbErr) -> Self {
        EidosError::storage(value.to_string())
    }
}
