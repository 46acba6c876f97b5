#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Payment amount must be positive, got {0}")]
    NonPositivePayment(i64),
    #[error("Required field is missing: {0}")]
    MissingField(&'static str),
    #[error("Order amount cannot be negative, got {0}")]
    NegativeAmount(i64),
    #[error("Order must contain at least one item")]
    NoItems,
    #[error("Item quantity must be at least one: {0}")]
    ZeroQuantity(String),
    #[error("Status '{status}' is not used by the {department} department")]
    StatusNotAllowed { status: String, department: String },
    #[error("Cannot {action} an order that is '{status}'")]
    InvalidTransition { action: &'static str, status: String },
    #[error("Order already has a pending approval request")]
    ApprovalAlreadyPending,
    #[error("Order has no pending approval request")]
    NoPendingApproval,
    #[error("Order is in {actual}, this needs {expected}")]
    WrongDepartment { expected: String, actual: String },
    #[error("Amounts on this order would exceed the largest supported total")]
    AmountOverflow,
    #[error("Edit window of {0} minutes is out of range")]
    EditWindowOutOfRange(i64),
    #[error("Malformed money value: '{0}'")]
    MalformedMoney(String),
    #[error("Row {row} is malformed: {reason}")]
    MalformedRow { row: usize, reason: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Order {0} cannot move any further along the workflow")]
    TerminalStage(String),
    #[error("User {user} is not allowed to {action}")]
    NotAllowed { user: String, action: &'static str },
    #[error("Order {0} was not found")]
    NotFound(String),
    #[error("Order {0} was modified by someone else, reload and retry")]
    Conflict(String),
}
