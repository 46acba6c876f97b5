//! Order commands. Each takes an order snapshot and returns a new one with
//! exactly one history (or payment) entry appended; the input is never touched.
use super::error::{OrderError, ValidationError};
use super::order::{
    ApprovalRequest, DEFAULT_ORDER_PREFIX, Department, DispatchDetails, Order, PaymentMethod,
    PaymentRecord, PaymentStatus, Status, StatusUpdate, TimeStamp,
};
use super::user::User;
use super::{utils, workflow};
use chrono::Utc;
use tracing::debug;

/// A manual status edit as submitted from a department's update form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: Status,
    pub remarks: String,
    pub estimated_completion: Option<String>,
    pub edit_window_minutes: Option<i64>,
}

impl StatusChange {
    pub fn new(status: Status, remarks: &str) -> Self {
        Self {
            status,
            remarks: remarks.to_string(),
            estimated_completion: None,
            edit_window_minutes: None,
        }
    }
    pub fn with_estimated_completion(mut self, estimate: &str) -> Self {
        self.estimated_completion = Some(estimate.to_string());
        self
    }
    pub fn with_edit_window(mut self, minutes: i64) -> Self {
        self.edit_window_minutes = Some(minutes);
        self
    }
}

// Clones the order, applies the new status and appends the entry describing it.
fn transition(
    order: &Order,
    department: Department,
    status: Status,
    remarks: &str,
    author: &User,
) -> (Order, StatusUpdate) {
    let entry = StatusUpdate::new(department, status, remarks, author);

    let mut next = order.clone();
    next.current_department = department;
    next.status = status;
    next.touch(&entry.timestamp);
    next.status_history.push(entry.clone());

    (next, entry)
}

fn reject_when(order: &Order, action: &'static str, blocked: &[Status]) -> Result<(), OrderError> {
    if blocked.contains(&order.status) {
        return Err(ValidationError::InvalidTransition {
            action,
            status: order.status.label().to_string(),
        }
        .into());
    }
    Ok(())
}

fn require(order: &Order, action: &'static str, allowed: &[Status]) -> Result<(), OrderError> {
    if !allowed.contains(&order.status) {
        return Err(ValidationError::InvalidTransition {
            action,
            status: order.status.label().to_string(),
        }
        .into());
    }
    Ok(())
}

fn with_remarks(summary: String, remarks: &str) -> String {
    match remarks.trim() {
        "" => summary,
        extra => format!("{}: {}", summary, extra),
    }
}

fn edit_deadline(from: &TimeStamp<Utc>, minutes: i64) -> Result<TimeStamp<Utc>, ValidationError> {
    if minutes < 0 {
        return Err(ValidationError::EditWindowOutOfRange(minutes));
    }
    from.plus_minutes(minutes)
        .ok_or(ValidationError::EditWindowOutOfRange(minutes))
}

pub fn advance_status(
    order: &Order,
    new_status: Status,
    remarks: &str,
    acting_user: &User,
) -> Result<(Order, StatusUpdate), OrderError> {
    advance_status_with(order, StatusChange::new(new_status, remarks), acting_user)
}

/// Manual status edit. The status must be one the order's department uses,
/// administrators may pick any.
pub fn advance_status_with(
    order: &Order,
    change: StatusChange,
    acting_user: &User,
) -> Result<(Order, StatusUpdate), OrderError> {
    let department = order.current_department;
    if !acting_user.is_admin() && !workflow::is_status_allowed(department, change.status) {
        return Err(ValidationError::StatusNotAllowed {
            status: change.status.label().to_string(),
            department: department.label().to_string(),
        }
        .into());
    }

    let (mut next, mut entry) =
        transition(order, department, change.status, &change.remarks, acting_user);
    entry.estimated_completion = change.estimated_completion;
    entry.edit_deadline = change
        .edit_window_minutes
        .map(|minutes| edit_deadline(&entry.timestamp, minutes))
        .transpose()?;
    if let Some(last) = next.status_history.last_mut() {
        *last = entry.clone();
    }

    debug!(order = %order.order_number, status = %change.status, "status changed");
    Ok((next, entry))
}

/// Appends a payment and re-derives paid, pending and payment status from
/// the full payment history.
pub fn record_payment(
    order: &Order,
    amount: i64,
    method: PaymentMethod,
    remarks: Option<&str>,
) -> Result<(Order, PaymentRecord), OrderError> {
    if amount <= 0 {
        return Err(ValidationError::NonPositivePayment(amount).into());
    }

    let record = PaymentRecord {
        amount,
        date: TimeStamp::new(),
        method,
        remarks: remarks
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    };

    let mut next = order.clone();
    next.payment_history.push(record.clone());
    next.settle_payments()?;
    next.touch(&record.date);

    debug!(
        order = %order.order_number,
        amount,
        pending = next.pending_amount,
        "payment recorded"
    );
    Ok((next, record))
}

/// Hands the order to the next department, resetting its status to New.
pub fn forward(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    let from = order.current_department;
    let to = workflow::next_department(from)?
        .ok_or_else(|| OrderError::TerminalStage(order.order_number.clone()))?;

    let summary = with_remarks(format!("Forwarded from {} to {}", from, to), remarks);
    let (mut next, entry) = transition(order, to, Status::New, &summary, acting_user);
    next.approval_pending = None;

    debug!(order = %order.order_number, %from, %to, "order forwarded");
    Ok((next, entry))
}

/// Returns the order to the previous department for rework.
pub fn send_back(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    let from = order.current_department;
    let to = workflow::previous_department(from)?
        .ok_or_else(|| OrderError::TerminalStage(order.order_number.clone()))?;

    let summary = with_remarks(format!("Returned from {} to {}", from, to), remarks);
    let (mut next, entry) = transition(order, to, Status::New, &summary, acting_user);
    next.approval_pending = None;

    Ok((next, entry))
}

/// Starts a fresh order from an existing one's client, items and amount.
pub fn duplicate(order: &Order, acting_user: &User) -> anyhow::Result<Order> {
    let prefix = order
        .order_number
        .split_once('-')
        .map(|(prefix, _)| prefix)
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or(DEFAULT_ORDER_PREFIX);

    let entry = StatusUpdate::new(
        Department::Sales,
        Status::New,
        &format!("Duplicated from order {}", order.order_number),
        acting_user,
    );
    let now = entry.timestamp.clone();

    Ok(Order {
        id: utils::new_uuid_to_bech32("order_")?,
        order_number: utils::new_order_number(prefix),
        client_name: order.client_name.clone(),
        items: order.items.clone(),
        amount: order.amount,
        paid_amount: 0,
        pending_amount: order.amount,
        current_department: Department::Sales,
        status: Status::New,
        payment_status: PaymentStatus::from_amounts(order.amount, 0),
        created_at: Some(now.clone()),
        updated_at: now,
        delivery_address: order.delivery_address.clone(),
        dispatch: None,
        approval_pending: None,
        status_history: vec![entry],
        payment_history: vec![],
        revision: 0,
        sync_id: None,
    })
}

pub fn hold(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    reject_when(
        order,
        "hold",
        &[Status::OnHold, Status::Cancelled, Status::Dispatched, Status::Archived],
    )?;
    Ok(transition(order, order.current_department, Status::OnHold, remarks, acting_user))
}

pub fn resume(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    require(order, "resume", &[Status::OnHold])?;
    Ok(transition(order, order.current_department, Status::InProgress, remarks, acting_user))
}

pub fn cancel(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    reject_when(
        order,
        "cancel",
        &[Status::Cancelled, Status::Dispatched, Status::Archived],
    )?;
    let (mut next, entry) =
        transition(order, order.current_department, Status::Cancelled, remarks, acting_user);
    next.approval_pending = None;
    Ok((next, entry))
}

pub fn complete(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    reject_when(
        order,
        "complete",
        &[Status::Completed, Status::Cancelled, Status::Archived],
    )?;
    Ok(transition(order, order.current_department, Status::Completed, remarks, acting_user))
}

pub fn reopen(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    require(
        order,
        "reopen",
        &[Status::Cancelled, Status::Completed, Status::Rejected],
    )?;
    Ok(transition(order, order.current_department, Status::InProgress, remarks, acting_user))
}

pub fn request_approval(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    if order.approval_pending.is_some() {
        return Err(ValidationError::ApprovalAlreadyPending.into());
    }
    reject_when(
        order,
        "request approval for",
        &[Status::Cancelled, Status::Archived],
    )?;

    let (mut next, entry) = transition(
        order,
        order.current_department,
        Status::AwaitingApproval,
        remarks,
        acting_user,
    );
    next.approval_pending = Some(ApprovalRequest {
        requested_by: acting_user.name.clone(),
        requested_at: entry.timestamp.clone(),
        department: order.current_department,
    });
    Ok((next, entry))
}

fn settle_approval(
    order: &Order,
    acting_user: &User,
    remarks: &str,
    outcome: Status,
) -> Result<(Order, StatusUpdate), OrderError> {
    if order.approval_pending.is_none() {
        return Err(ValidationError::NoPendingApproval.into());
    }
    let (mut next, entry) =
        transition(order, order.current_department, outcome, remarks, acting_user);
    next.approval_pending = None;
    Ok((next, entry))
}

pub fn approve(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    settle_approval(order, acting_user, remarks, Status::Approved)
}

pub fn reject(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    settle_approval(order, acting_user, remarks, Status::Rejected)
}

pub fn archive(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    reject_when(order, "archive", &[Status::Archived])?;
    Ok(transition(order, order.current_department, Status::Archived, remarks, acting_user))
}

/// Puts an archived order back to the status it had before archiving.
pub fn restore(
    order: &Order,
    acting_user: &User,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    require(order, "restore", &[Status::Archived])?;

    let previous = order
        .status_history
        .iter()
        .rev()
        .find(|entry| entry.status != Status::Archived)
        .map(|entry| entry.status)
        .unwrap_or(Status::New);

    Ok(transition(order, order.current_department, previous, remarks, acting_user))
}

pub fn dispatch(
    order: &Order,
    acting_user: &User,
    carrier: &str,
    tracking_number: Option<&str>,
    remarks: &str,
) -> Result<(Order, StatusUpdate), OrderError> {
    if order.current_department != Department::Production {
        return Err(ValidationError::WrongDepartment {
            expected: Department::Production.label().to_string(),
            actual: order.current_department.label().to_string(),
        }
        .into());
    }
    if carrier.trim().is_empty() {
        return Err(ValidationError::MissingField("carrier").into());
    }
    reject_when(
        order,
        "dispatch",
        &[Status::Dispatched, Status::Cancelled, Status::Archived],
    )?;

    let summary = with_remarks(format!("Dispatched via {}", carrier.trim()), remarks);
    let (mut next, entry) = transition(
        order,
        Department::Production,
        Status::Dispatched,
        &summary,
        acting_user,
    );
    next.dispatch = Some(DispatchDetails {
        carrier: carrier.trim().to_string(),
        tracking_number: tracking_number
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        dispatched_at: entry.timestamp.clone(),
        dispatched_by: acting_user.name.clone(),
    });

    debug!(order = %order.order_number, carrier, "order dispatched");
    Ok((next, entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderDetails;
    use crate::user::Role;

    fn user(department: Department) -> User {
        User::new("Asha", "asha@shop.test", department, Role::Member).unwrap()
    }

    fn new_order(amount: i64) -> Order {
        OrderDetails::new()
            .set_client_name("Acme")
            .add_item("Brochures", 250)
            .set_amount(amount)
            .validate_and_finalise(&user(Department::Sales))
            .unwrap()
    }

    #[test]
    fn payments_settle_in_steps() {
        let order = new_order(1000);

        let (order, record) = record_payment(&order, 400, PaymentMethod::Cash, None).unwrap();
        assert_eq!(record.amount, 400);
        assert_eq!(order.pending_amount, 600);
        assert_eq!(order.payment_status, PaymentStatus::PartiallyPaid);

        let (order, _) = record_payment(&order, 600, PaymentMethod::Cash, None).unwrap();
        assert_eq!(order.pending_amount, 0);
        assert_eq!(order.paid_amount, 1000);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.payment_history.len(), 2);
    }

    #[test]
    fn non_positive_payments_are_rejected() {
        let order = new_order(1000);

        for amount in [0, -50] {
            let err = record_payment(&order, amount, PaymentMethod::Card, None).unwrap_err();
            assert_eq!(
                err,
                OrderError::Validation(ValidationError::NonPositivePayment(amount))
            );
        }
    }

    #[test]
    fn forward_walks_the_pipeline_then_stops() {
        let sales = user(Department::Sales);
        let order = new_order(1000);

        let (order, entry) = forward(&order, &sales, "").unwrap();
        assert_eq!(order.current_department, Department::Design);
        assert_eq!(order.status, Status::New);
        assert_eq!(entry.remarks, "Forwarded from Sales to Design");

        let (order, _) = forward(&order, &sales, "proof signed").unwrap();
        let (order, entry) = forward(&order, &sales, "").unwrap();
        assert_eq!(order.current_department, Department::Production);
        assert_eq!(entry.department, Department::Production);

        let err = forward(&order, &sales, "").unwrap_err();
        assert_eq!(err, OrderError::TerminalStage(order.order_number.clone()));
    }

    #[test]
    fn commands_leave_input_untouched() {
        let order = new_order(1000);
        let before = order.clone();

        let (advanced, _) =
            advance_status(&order, Status::InProgress, "started", &user(Department::Sales))
                .unwrap();

        assert_eq!(order, before);
        assert_eq!(advanced.status, Status::InProgress);
        assert_eq!(advanced.status_history.len(), before.status_history.len() + 1);
        assert_eq!(advanced.revision, before.revision + 1);
    }

    #[test]
    fn status_must_belong_to_department_unless_admin() {
        let order = new_order(1000);

        let err = advance_status(&order, Status::Dispatched, "", &user(Department::Sales))
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::StatusNotAllowed { .. })
        ));

        let admin = User::new("Meera", "meera@shop.test", Department::Sales, Role::Admin).unwrap();
        assert!(advance_status(&order, Status::Dispatched, "", &admin).is_ok());
    }

    #[test]
    fn edit_window_and_estimate_recorded() {
        let order = new_order(1000);
        let change = StatusChange::new(Status::InProgress, "printing plates")
            .with_estimated_completion("Friday")
            .with_edit_window(15);

        let (next, entry) = advance_status_with(&order, change, &user(Department::Sales)).unwrap();

        assert_eq!(entry.estimated_completion.as_deref(), Some("Friday"));
        assert_eq!(entry.edit_deadline, entry.timestamp.plus_minutes(15));
        assert_eq!(next.status_history.last(), Some(&entry));
    }

    #[test]
    fn unrepresentable_edit_window_is_rejected() {
        let order = new_order(1000);
        let sales = user(Department::Sales);

        for minutes in [i64::MAX / 1000, i64::MAX, -1] {
            let change = StatusChange::new(Status::InProgress, "").with_edit_window(minutes);
            let err = advance_status_with(&order, change, &sales).unwrap_err();
            assert_eq!(
                err,
                OrderError::Validation(ValidationError::EditWindowOutOfRange(minutes))
            );
        }
    }

    #[test]
    fn payments_that_overflow_the_total_are_rejected() {
        let order = new_order(i64::MAX);
        let (order, _) = record_payment(&order, i64::MAX, PaymentMethod::Card, None).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.pending_amount, 0);

        let err = record_payment(&order, 1, PaymentMethod::Cash, None).unwrap_err();
        assert_eq!(err, OrderError::Validation(ValidationError::AmountOverflow));
        assert_eq!(order.payment_history.len(), 1);
    }

    #[test]
    fn duplicate_resets_everything_but_the_job() {
        let sales = user(Department::Sales);
        let (paid, _) = record_payment(&new_order(1000), 300, PaymentMethod::Upi, None).unwrap();
        let (source, _) = forward(&paid, &sales, "").unwrap();

        let copy = duplicate(&source, &sales).unwrap();

        assert_ne!(copy.id, source.id);
        assert_ne!(copy.order_number, source.order_number);
        assert_eq!(copy.items, source.items);
        assert_eq!(copy.status, Status::New);
        assert_eq!(copy.current_department, Department::Sales);
        assert!(copy.payment_history.is_empty());
        assert_eq!(copy.pending_amount, copy.amount);
        assert_eq!(copy.status_history.len(), 1);
        assert!(copy.status_history[0].remarks.contains(&source.order_number));
    }

    #[test]
    fn hold_and_resume() {
        let sales = user(Department::Sales);
        let (held, _) = hold(&new_order(1000), &sales, "waiting on paper").unwrap();
        assert_eq!(held.status, Status::OnHold);
        assert!(hold(&held, &sales, "").is_err());

        let (resumed, _) = resume(&held, &sales, "").unwrap();
        assert_eq!(resumed.status, Status::InProgress);
        assert!(resume(&resumed, &sales, "").is_err());
    }

    #[test]
    fn approval_round_trip() {
        let sales = user(Department::Sales);
        let admin = User::new("Meera", "meera@shop.test", Department::Admin, Role::Admin).unwrap();

        let order = new_order(1000);
        assert_eq!(
            approve(&order, &admin, "").unwrap_err(),
            OrderError::Validation(ValidationError::NoPendingApproval)
        );

        let (pending, _) = request_approval(&order, &sales, "discount above 10%").unwrap();
        assert_eq!(pending.status, Status::AwaitingApproval);
        assert!(pending.approval_pending.is_some());
        assert_eq!(
            request_approval(&pending, &sales, "").unwrap_err(),
            OrderError::Validation(ValidationError::ApprovalAlreadyPending)
        );

        let (approved, _) = approve(&pending, &admin, "").unwrap();
        assert_eq!(approved.status, Status::Approved);
        assert!(approved.approval_pending.is_none());

        let (rejected, _) = reject(&pending, &admin, "too cheap").unwrap();
        assert_eq!(rejected.status, Status::Rejected);

        let (reopened, _) = reopen(&rejected, &sales, "").unwrap();
        assert_eq!(reopened.status, Status::InProgress);
    }

    #[test]
    fn restore_returns_to_pre_archive_status() {
        let admin = User::new("Meera", "meera@shop.test", Department::Admin, Role::Admin).unwrap();
        let (order, _) = complete(&new_order(1000), &admin, "").unwrap();

        let (archived, _) = archive(&order, &admin, "").unwrap();
        assert!(archived.is_archived());
        assert!(archive(&archived, &admin, "").is_err());

        let (restored, _) = restore(&archived, &admin, "").unwrap();
        assert_eq!(restored.status, Status::Completed);
        assert!(restore(&restored, &admin, "").is_err());
    }

    #[test]
    fn send_back_and_dispatch() {
        let sales = user(Department::Sales);
        let order = new_order(1000);
        assert!(matches!(
            send_back(&order, &sales, ""),
            Err(OrderError::TerminalStage(_))
        ));
        assert!(matches!(
            dispatch(&order, &sales, "BlueDart", None, ""),
            Err(OrderError::Validation(ValidationError::WrongDepartment { .. }))
        ));

        let (order, _) = forward(&order, &sales, "").unwrap();
        let (order, _) = forward(&order, &sales, "").unwrap();
        let (order, _) = forward(&order, &sales, "").unwrap();

        let (back, _) = send_back(&order, &sales, "colours off").unwrap();
        assert_eq!(back.current_department, Department::Prepress);
        assert!(back.status_history.last().unwrap().remarks.ends_with("colours off"));

        let production = user(Department::Production);
        assert!(dispatch(&order, &production, "  ", None, "").is_err());

        let (sent, entry) =
            dispatch(&order, &production, "BlueDart", Some("BD123"), "").unwrap();
        assert_eq!(sent.status, Status::Dispatched);
        assert_eq!(entry.remarks, "Dispatched via BlueDart");
        let details = sent.dispatch.unwrap();
        assert_eq!(details.tracking_number.as_deref(), Some("BD123"));
        assert_eq!(details.dispatched_by, "Asha");
    }

    #[test]
    fn cancelled_orders_cannot_be_dispatched_or_cancelled_again() {
        let sales = user(Department::Sales);
        let (cancelled, _) = cancel(&new_order(1000), &sales, "client withdrew").unwrap();

        assert!(cancel(&cancelled, &sales, "").is_err());
        assert!(hold(&cancelled, &sales, "").is_err());
        assert!(complete(&cancelled, &sales, "").is_err());
    }
}
