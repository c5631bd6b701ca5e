use casewatch_core_types::RunId;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling, testing, and the run ledger's `detail` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Input
    InvalidInput,
    /// A single collector record could not be validated (skipped, never fatal)
    MalformedRecord,
    NotFound,

    // Storage
    Io,
    Serialization,
    Persistence,
    /// The stored change log contains a row that does not decode to a ChangeEvent
    CorruptChangeLog,

    // Run control
    /// Another run holds the run lock
    Concurrency,
    Cancelled,
    Timeout,

    // Promotion
    /// The staged version could not be made canonical
    PromotionFailed,
    /// An earlier promotion failure is unresolved; no run may start
    PromotionBlocked,
    /// Downstream change sink rejected the change set
    ExternalService,

    // Internal
    InvariantViolation,
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::MalformedRecord => "ERR_MALFORMED_RECORD",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::CorruptChangeLog => "ERR_CORRUPT_CHANGE_LOG",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::PromotionFailed => "ERR_PROMOTION_FAILED",
            ExErrorKind::PromotionBlocked => "ERR_PROMOTION_BLOCKED",
            ExErrorKind::ExternalService => "ERR_EXTERNAL_SERVICE",
            ExErrorKind::InvariantViolation => "ERR_INVARIANT_VIOLATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether a run that failed with this kind can simply be retried from scratch
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExErrorKind::Io
                | ExErrorKind::Persistence
                | ExErrorKind::Concurrency
                | ExErrorKind::Cancelled
                | ExErrorKind::Timeout
        )
    }
}

/// Canonical structured error type
///
/// Carries a classification (`kind`) for programmatic handling and optional
/// context for debugging: the failing operation, the entity involved and the
/// run it happened in.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    run_id: Option<RunId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            run_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context (record id, version id, artifact path)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add run context
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity ID context, if any
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Get the run context, if any
    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(run_id) = &self.run_id {
            write!(f, " (run_id: {})", run_id)?;
        }
        if let Some(source) = &self.source {
            write!(f, " <- {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Conversion from serde_json::Error to ExError
impl From<serde_json::Error> for ExError {
    fn from(err: serde_json::Error) -> Self {
        ExError::new(ExErrorKind::Serialization).with_message(err.to_string())
    }
}

/// A skipped record is reported as `MalformedRecord`
impl From<crate::model::SkipReason> for ExError {
    fn from(reason: crate::model::SkipReason) -> Self {
        let err = ExError::new(ExErrorKind::MalformedRecord).with_message(reason.to_string());
        match reason.record_id() {
            Some(id) => err.with_entity_id(id),
            None => err,
        }
    }
}
