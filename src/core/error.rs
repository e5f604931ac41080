use derive_more::Display;

/// Infrastructure failure from a store or sink collaborator. Kept
/// separate from the domain rejections so the caller can retry without
/// confusing a flaky database with a denied request.
#[derive(Debug, Display)]
#[display(fmt = "{}", _0)]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(err: impl std::fmt::Display) -> Self {
        StoreError(err.to_string())
    }
}

impl std::error::Error for StoreError {}

/// Domain-level outcomes of lifecycle and gate operations. Everything
/// except `Store` is a synchronous rejection with no state change.
#[derive(Debug, Display)]
pub enum CoreError {
    #[display(fmt = "to_date cannot be before from_date")]
    InvalidRange,
    #[display(fmt = "leave must be applied at least {} days in advance", _0)]
    InsufficientLeadTime(i64),
    #[display(fmt = "an active leave application already covers part of this date range")]
    OverlappingApplication,
    #[display(fmt = "not found")]
    NotFound,
    #[display(fmt = "application is routed to the other approval tier")]
    WrongTier,
    #[display(fmt = "application has already been processed")]
    AlreadyProcessed,
    #[display(fmt = "leave application is not approved")]
    NotApproved,
    #[display(fmt = "extension date must be after the current end date")]
    NonAdvancingDate,
    #[display(fmt = "storage failure: {}", _0)]
    Store(StoreError),
}

impl std::error::Error for CoreError {}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Store(err)
    }
}
