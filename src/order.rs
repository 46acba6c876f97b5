//! Core order record, its history entries and the closed enumerations they use
use super::error::{OrderError, ValidationError};
use super::user::User;
use super::utils;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

/// Workflow stage an order sits in. `Admin` is a user department only and
/// never a stage an order can be forwarded to.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Department {
    #[n(0)]
    Sales,
    #[n(1)]
    Design,
    #[n(2)]
    Prepress,
    #[n(3)]
    Production,
    #[n(4)]
    Admin,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Status {
    #[n(0)]
    New,
    #[n(1)]
    InProgress,
    #[n(2)]
    AwaitingApproval,
    #[n(3)]
    Approved,
    #[n(4)]
    Rejected,
    #[n(5)]
    OnHold,
    #[n(6)]
    Issue,
    #[n(7)]
    Completed,
    #[n(8)]
    ReadyForDispatch,
    #[n(9)]
    Dispatched,
    #[n(10)]
    Cancelled,
    #[n(11)]
    Archived,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum PaymentStatus {
    #[n(0)]
    NotPaid,
    #[n(1)]
    PartiallyPaid,
    #[n(2)]
    Paid,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    #[n(0)]
    Cash,
    #[n(1)]
    Card,
    #[n(2)]
    Upi,
    #[n(3)]
    BankTransfer,
    #[n(4)]
    Cheque,
    #[n(5)]
    Other,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone> PartialOrd for TimeStamp<T>
where
    TimeStamp<T>: PartialEq,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl<T: TimeZone> Ord for TimeStamp<T>
where
    TimeStamp<T>: Eq,
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    #[n(0)]
    pub description: String,
    #[n(1)]
    pub quantity: u32,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct DispatchDetails {
    #[n(0)]
    pub carrier: String,
    #[n(1)]
    pub tracking_number: Option<String>,
    #[n(2)]
    pub dispatched_at: TimeStamp<Utc>,
    #[n(3)]
    pub dispatched_by: String,
}

// set while a department is waiting on a sign-off
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    #[n(0)]
    pub requested_by: String,
    #[n(1)]
    pub requested_at: TimeStamp<Utc>,
    #[n(2)]
    pub department: Department,
}

/// One entry of an order's timeline. Entries are only ever appended.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    #[n(0)]
    pub timestamp: TimeStamp<Utc>,
    #[n(1)]
    pub department: Department,
    #[n(2)]
    pub status: Status,
    #[n(3)]
    pub remarks: String,
    #[n(4)]
    pub author: String,
    #[n(5)]
    pub estimated_completion: Option<String>,
    #[n(6)]
    pub edit_deadline: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub author_id: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    #[n(0)]
    pub amount: i64,
    #[n(1)]
    pub date: TimeStamp<Utc>,
    #[n(2)]
    pub method: PaymentMethod,
    #[n(3)]
    pub remarks: Option<String>,
}

// Key is the order id, value is this struct encoded into CBOR
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Order {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7, hrp "order_"
    #[n(1)]
    pub order_number: String,
    #[n(2)]
    pub client_name: String,
    #[n(3)]
    pub items: Vec<OrderItem>,
    #[n(4)]
    pub amount: i64, // minor units
    #[n(5)]
    pub paid_amount: i64,
    #[n(6)]
    pub pending_amount: i64,
    #[n(7)]
    pub current_department: Department,
    #[n(8)]
    pub status: Status,
    #[n(9)]
    pub payment_status: PaymentStatus,
    #[n(10)]
    pub created_at: Option<TimeStamp<Utc>>, // missing on some imported rows
    #[n(11)]
    pub updated_at: TimeStamp<Utc>,
    #[n(12)]
    pub delivery_address: Option<String>,
    #[n(13)]
    pub dispatch: Option<DispatchDetails>,
    #[n(14)]
    pub approval_pending: Option<ApprovalRequest>,
    #[n(15)]
    pub status_history: Vec<StatusUpdate>,
    #[n(16)]
    pub payment_history: Vec<PaymentRecord>,
    #[n(17)]
    pub revision: u64,
    #[n(18)]
    pub sync_id: Option<String>,
}

// Intake form, also used for constructing drafts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    client_name: Option<String>,
    items: Vec<OrderItem>,
    amount: Option<i64>,
    delivery_address: Option<String>,
    estimated_completion: Option<String>,
    order_prefix: Option<String>,
}

pub const DEFAULT_ORDER_PREFIX: &str = "PS";

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Sales,
        Department::Design,
        Department::Prepress,
        Department::Production,
        Department::Admin,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Department::Sales => "Sales",
            Department::Design => "Design",
            Department::Prepress => "Prepress",
            Department::Production => "Production",
            Department::Admin => "Admin",
        }
    }

    /// Whether orders can sit in this department.
    pub fn is_stage(&self) -> bool {
        !matches!(self, Department::Admin)
    }
}

impl Status {
    pub const ALL: [Status; 12] = [
        Status::New,
        Status::InProgress,
        Status::AwaitingApproval,
        Status::Approved,
        Status::Rejected,
        Status::OnHold,
        Status::Issue,
        Status::Completed,
        Status::ReadyForDispatch,
        Status::Dispatched,
        Status::Cancelled,
        Status::Archived,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Status::New => "New",
            Status::InProgress => "In Progress",
            Status::AwaitingApproval => "Awaiting Approval",
            Status::Approved => "Approved",
            Status::Rejected => "Rejected",
            Status::OnHold => "On Hold",
            Status::Issue => "Issue",
            Status::Completed => "Completed",
            Status::ReadyForDispatch => "Ready for Dispatch",
            Status::Dispatched => "Dispatched",
            Status::Cancelled => "Cancelled",
            Status::Archived => "Archived",
        }
    }
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 3] = [
        PaymentStatus::NotPaid,
        PaymentStatus::PartiallyPaid,
        PaymentStatus::Paid,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::NotPaid => "Not Paid",
            PaymentStatus::PartiallyPaid => "Partially Paid",
            PaymentStatus::Paid => "Paid",
        }
    }

    /// Paid once nothing is pending, partially paid while some money has
    /// come in, not paid otherwise.
    pub fn from_amounts(amount: i64, paid: i64) -> Self {
        if paid >= amount {
            PaymentStatus::Paid
        } else if paid > 0 {
            PaymentStatus::PartiallyPaid
        } else {
            PaymentStatus::NotPaid
        }
    }
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Upi,
        PaymentMethod::BankTransfer,
        PaymentMethod::Cheque,
        PaymentMethod::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Card => "Card",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::Cheque => "Cheque",
            PaymentMethod::Other => "Other",
        }
    }
}

// Labels compare case-insensitively and ignore surrounding whitespace.
fn parse_label<T: Copy>(
    raw: &str,
    all: &[T],
    label: fn(&T) -> &'static str,
    kind: &str,
) -> Result<T, OrderError> {
    let wanted = raw.trim();
    all.iter()
        .find(|candidate| label(candidate).eq_ignore_ascii_case(wanted))
        .copied()
        .ok_or_else(|| OrderError::InvalidArgument(format!("unknown {}: '{}'", kind, raw)))
}

impl FromStr for Department {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(s, &Department::ALL, Department::label, "department")
    }
}

impl FromStr for Status {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(s, &Status::ALL, Status::label, "status")
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(s, &PaymentStatus::ALL, PaymentStatus::label, "payment status")
    }
}

impl FromStr for PaymentMethod {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(s, &PaymentMethod::ALL, PaymentMethod::label, "payment method")
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// `None` when the shift leaves chrono's representable range.
    pub fn plus_minutes(&self, minutes: i64) -> Option<Self> {
        chrono::TimeDelta::try_minutes(minutes)
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map(Self)
    }
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
    /// Accepts RFC 3339 or a bare `YYYY-MM-DD` date, `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self(dt.with_timezone(&Utc)));
        }
        chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Self(naive.and_utc()))
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl OrderItem {
    pub fn new(description: &str, quantity: u32) -> Self {
        Self {
            description: description.to_string(),
            quantity,
        }
    }
}

impl StatusUpdate {
    pub fn new(department: Department, status: Status, remarks: &str, author: &User) -> Self {
        Self {
            timestamp: TimeStamp::new(),
            department,
            status,
            remarks: remarks.to_string(),
            author: author.name.clone(),
            estimated_completion: None,
            edit_deadline: None,
            author_id: author.id.clone(),
        }
    }
}

impl Order {
    pub fn latest_update(&self) -> Option<&StatusUpdate> {
        self.status_history.last()
    }

    pub fn is_archived(&self) -> bool {
        self.status == Status::Archived
    }

    /// Sum of every recorded payment, `None` if it does not fit in an i64.
    pub fn total_payments(&self) -> Option<i64> {
        self.payment_history
            .iter()
            .try_fold(0i64, |total, p| total.checked_add(p.amount))
    }

    // paid/pending/status are always derived from the payment history
    pub(crate) fn settle_payments(&mut self) -> Result<(), ValidationError> {
        let paid = self.total_payments().ok_or(ValidationError::AmountOverflow)?;
        let pending = self
            .amount
            .checked_sub(paid)
            .ok_or(ValidationError::AmountOverflow)?;

        self.paid_amount = paid;
        self.pending_amount = pending;
        self.payment_status = PaymentStatus::from_amounts(self.amount, paid);
        Ok(())
    }

    // bookkeeping shared by every command producing a new snapshot
    pub(crate) fn touch(&mut self, at: &TimeStamp<Utc>) {
        self.updated_at = at.clone();
        self.revision += 1;
    }
}

impl OrderDetails {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_client_name(mut self, name: &str) -> Self {
        self.client_name = Some(name.trim().to_string());
        self
    }
    pub fn add_item(mut self, description: &str, quantity: u32) -> Self {
        self.items.push(OrderItem::new(description.trim(), quantity));
        self
    }
    pub fn set_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }
    pub fn set_delivery_address(mut self, address: &str) -> Self {
        self.delivery_address = Some(address.trim().to_string());
        self
    }
    pub fn set_estimated_completion(mut self, estimate: &str) -> Self {
        self.estimated_completion = Some(estimate.to_string());
        self
    }
    pub fn set_order_prefix(mut self, prefix: &str) -> Self {
        self.order_prefix = Some(prefix.to_string());
        self
    }
    /// Checks the form fields. Returns the first problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.client_name.as_deref() {
            None | Some("") => return Err(ValidationError::MissingField("client name")),
            _ => {}
        }
        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }
        if self.items.iter().any(|item| item.description.is_empty()) {
            return Err(ValidationError::MissingField("item description"));
        }
        if let Some(item) = self.items.iter().find(|item| item.quantity == 0) {
            return Err(ValidationError::ZeroQuantity(item.description.clone()));
        }
        match self.amount {
            None => Err(ValidationError::MissingField("amount")),
            Some(amount) if amount < 0 => Err(ValidationError::NegativeAmount(amount)),
            Some(_) => Ok(()),
        }
    }
    /// Validates the intake form and produces a fresh order sitting in
    /// Sales with status New and nothing paid.
    pub fn validate_and_finalise(&self, author: &User) -> anyhow::Result<Order> {
        self.validate()?;

        let amount = self.amount.unwrap_or_default();
        let prefix = self.order_prefix.as_deref().unwrap_or(DEFAULT_ORDER_PREFIX);
        let now = TimeStamp::new();

        let mut created =
            StatusUpdate::new(Department::Sales, Status::New, "Order created", author);
        created.timestamp = now.clone();
        created.estimated_completion = self.estimated_completion.clone();

        Ok(Order {
            id: utils::new_uuid_to_bech32("order_")?,
            order_number: utils::new_order_number(prefix),
            client_name: self.client_name.clone().unwrap_or_default(),
            items: self.items.clone(),
            amount,
            paid_amount: 0,
            pending_amount: amount,
            current_department: Department::Sales,
            status: Status::New,
            payment_status: PaymentStatus::from_amounts(amount, 0),
            created_at: Some(now.clone()),
            updated_at: now,
            delivery_address: self.delivery_address.clone().filter(|a| !a.is_empty()),
            dispatch: None,
            approval_pending: None,
            status_history: vec![created],
            payment_history: vec![],
            revision: 0,
            sync_id: None,
        })
    }
}
