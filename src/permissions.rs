//! Capability checks for a (possibly signed-out) user against an order.
//!
//! Every predicate is a plain rule table lookup; a missing user never has
//! any capability.
use super::order::{Department, Order, StatusUpdate, TimeStamp};
use super::user::User;
use chrono::Utc;

fn in_departments(user: &User, departments: &[Department]) -> bool {
    user.is_admin() || departments.contains(&user.department)
}

fn owns_stage(user: &User, order: &Order) -> bool {
    user.is_admin() || user.department == order.current_department
}

/// Sales, Production and Admin always; anyone else while the order is in
/// their department.
pub fn can_view_address(user: Option<&User>, order: &Order) -> bool {
    user.is_some_and(|u| {
        in_departments(u, &[Department::Sales, Department::Production]) || owns_stage(u, order)
    })
}

pub fn can_view_payments(user: Option<&User>, _order: &Order) -> bool {
    user.is_some_and(|u| in_departments(u, &[Department::Sales]))
}

pub fn can_record_payment(user: Option<&User>, order: &Order) -> bool {
    can_view_payments(user, order) && !order.is_archived()
}

pub fn can_update_status(user: Option<&User>, order: &Order) -> bool {
    user.is_some_and(|u| owns_stage(u, order)) && !order.is_archived()
}

pub fn can_forward(user: Option<&User>, order: &Order) -> bool {
    can_update_status(user, order) && order.approval_pending.is_none()
}

/// Sales and Design ask clients or admins to sign off, one request at a time.
pub fn can_request_approval(user: Option<&User>, order: &Order) -> bool {
    user.is_some_and(|u| {
        u.department == order.current_department
            && matches!(u.department, Department::Sales | Department::Design)
    }) && order.approval_pending.is_none()
        && !order.is_archived()
}

pub fn can_approve(user: Option<&User>, order: &Order) -> bool {
    user.is_some_and(User::is_admin) && order.approval_pending.is_some()
}

pub fn can_dispatch(user: Option<&User>, order: &Order) -> bool {
    user.is_some_and(|u| in_departments(u, &[Department::Production]))
        && order.current_department == Department::Production
        && !order.is_archived()
}

pub fn can_duplicate(user: Option<&User>, _order: &Order) -> bool {
    user.is_some_and(|u| in_departments(u, &[Department::Sales]))
}

pub fn can_create_order(user: Option<&User>) -> bool {
    user.is_some_and(|u| in_departments(u, &[Department::Sales]))
}

pub fn can_import(user: Option<&User>) -> bool {
    user.is_some_and(User::is_admin)
}

pub fn can_delete(user: Option<&User>) -> bool {
    user.is_some_and(User::is_admin)
}

pub fn can_archive(user: Option<&User>) -> bool {
    user.is_some_and(User::is_admin)
}

pub fn can_view_reports(user: Option<&User>) -> bool {
    user.is_some_and(User::is_admin)
}

/// Authors may amend their own entry until its edit deadline passes.
/// Authorship is by user id, display names are not unique.
pub fn can_edit_history_entry(
    user: Option<&User>,
    entry: &StatusUpdate,
    now: &TimeStamp<Utc>,
) -> bool {
    match (user, entry.edit_deadline.as_ref()) {
        (Some(u), Some(deadline)) => u.id == entry.author_id && now < deadline,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{ApprovalRequest, OrderDetails, Status};
    use crate::user::Role;

    fn member(department: Department) -> User {
        User::new("Ravi", "ravi@shop.test", department, Role::Member).unwrap()
    }

    fn order_in(department: Department) -> Order {
        let mut order = OrderDetails::new()
            .set_client_name("Acme")
            .add_item("Flyers", 1000)
            .set_amount(20_000)
            .validate_and_finalise(&member(Department::Sales))
            .unwrap();
        order.current_department = department;
        order
    }

    #[test]
    fn signed_out_users_have_no_capabilities() {
        let order = order_in(Department::Sales);

        assert!(!can_view_address(None, &order));
        assert!(!can_view_payments(None, &order));
        assert!(!can_update_status(None, &order));
        assert!(!can_request_approval(None, &order));
        assert!(!can_delete(None));
        assert!(!can_view_reports(None));
    }

    #[test]
    fn address_visibility_rule_table() {
        let at_prepress = order_in(Department::Prepress);

        assert!(can_view_address(Some(&member(Department::Sales)), &at_prepress));
        assert!(can_view_address(Some(&member(Department::Production)), &at_prepress));
        assert!(can_view_address(Some(&member(Department::Admin)), &at_prepress));
        assert!(can_view_address(Some(&member(Department::Prepress)), &at_prepress));
        assert!(!can_view_address(Some(&member(Department::Design)), &at_prepress));
    }

    #[test]
    fn only_owning_department_updates_status() {
        let order = order_in(Department::Design);

        assert!(can_update_status(Some(&member(Department::Design)), &order));
        assert!(!can_update_status(Some(&member(Department::Sales)), &order));

        let admin = User::new("Meera", "meera@shop.test", Department::Sales, Role::Admin).unwrap();
        assert!(can_update_status(Some(&admin), &order));
    }

    #[test]
    fn approval_requests_are_single_flight() {
        let mut order = order_in(Department::Design);
        let designer = member(Department::Design);

        assert!(can_request_approval(Some(&designer), &order));
        assert!(!can_request_approval(Some(&member(Department::Prepress)), &order));

        order.approval_pending = Some(ApprovalRequest {
            requested_by: designer.name.clone(),
            requested_at: TimeStamp::new(),
            department: Department::Design,
        });
        assert!(!can_request_approval(Some(&designer), &order));
        assert!(!can_forward(Some(&designer), &order));
        assert!(can_approve(Some(&member(Department::Admin)), &order));
    }

    #[test]
    fn archived_orders_are_read_only() {
        let mut order = order_in(Department::Sales);
        order.status = Status::Archived;

        assert!(!can_update_status(Some(&member(Department::Sales)), &order));
        assert!(!can_record_payment(Some(&member(Department::Sales)), &order));
        assert!(can_view_payments(Some(&member(Department::Sales)), &order));
    }

    #[test]
    fn history_entries_editable_within_window() {
        let author = member(Department::Sales);
        let mut entry = StatusUpdate::new(Department::Sales, Status::InProgress, "", &author);
        let now = TimeStamp::new_with(2024, 6, 1, 12, 0, 0);

        assert!(!can_edit_history_entry(Some(&author), &entry, &now));

        entry.edit_deadline = now.plus_minutes(15);
        assert!(can_edit_history_entry(Some(&author), &entry, &now));
        assert!(!can_edit_history_entry(
            Some(&author),
            &entry,
            &now.plus_minutes(16).unwrap()
        ));

        let other = User::new("Kiran", "kiran@shop.test", Department::Sales, Role::Member).unwrap();
        assert!(!can_edit_history_entry(Some(&other), &entry, &now));

        // same display name, different account
        let namesake = member(Department::Sales);
        assert_eq!(namesake.name, author.name);
        assert!(!can_edit_history_entry(Some(&namesake), &entry, &now));
    }
}
