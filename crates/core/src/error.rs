use thiserror::Error;

pub type FunnelResult<T> = Result<T, FunnelError>;

/// What kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Node,
    Page,
    Funnel,
    Terminal,
    Product,
    CartLine,
    Coupon,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RecordKind::Node => "node",
            RecordKind::Page => "page",
            RecordKind::Funnel => "funnel",
            RecordKind::Terminal => "terminal node",
            RecordKind::Product => "product",
            RecordKind::CartLine => "cart line",
            RecordKind::Coupon => "coupon",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request token rejected")]
    Unauthorized,

    #[error("Funnel configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FunnelError {
    pub fn not_found(kind: RecordKind, id: impl std::fmt::Display) -> Self {
        FunnelError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Short machine-readable code carried in failure payloads.
    pub fn code(&self) -> &'static str {
        match self {
            FunnelError::NotFound { .. } => "not_found",
            FunnelError::Validation(_) => "validation_error",
            FunnelError::Unauthorized => "unauthorized",
            FunnelError::Configuration(_) => "configuration_error",
            FunnelError::Serialization(_) => "malformed_request",
            FunnelError::Internal(_) => "internal_error",
        }
    }
}

/// Failures of the condition-evaluation capability. The decision evaluator
/// treats every variant as a degraded branch, never as a hard failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("operator `{operator}` cannot compare field `{field}` with {value}")]
    MalformedValue {
        field: String,
        operator: String,
        value: serde_json::Value,
    },

    #[error("condition has an empty field name")]
    EmptyField,
}
