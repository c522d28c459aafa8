use backbone_domain::error::DomainError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("domain: {0}")]
    Domain(#[from] DomainError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("handler not found: {0}")]
    HandlerNotFound(&'static str),

    #[error("handler already registered: command={command}")]
    AlreadyRegisteredCommand { command: &'static str },

    #[error("handler already registered: query={query}")]
    AlreadyRegisteredQuery { query: &'static str },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl AppError {
    /// 映射为 HTTP 状态码，供接口层直接使用
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Domain(err) => match err {
                DomainError::NotFound { .. } => 404,
                DomainError::InvalidState { .. } => 409,
                DomainError::HandlerUnavailable { .. } | DomainError::StoreUnavailable { .. } => {
                    503
                }
                DomainError::UnknownEvent { .. }
                | DomainError::InvalidPayload { .. }
                | DomainError::InvalidValue { .. }
                | DomainError::Parse { .. } => 400,
                _ => 500,
            },
            AppError::Validation(_) => 400,
            AppError::HandlerNotFound(_)
            | AppError::AlreadyRegisteredCommand { .. }
            | AppError::AlreadyRegisteredQuery { .. }
            | AppError::TypeMismatch { .. } => 500,
        }
    }
}
