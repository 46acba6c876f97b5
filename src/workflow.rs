//! Fixed department pipeline and the statuses each department works with
use super::error::OrderError;
use super::order::{Department, Status};

/// Order in which work moves through the shop.
pub const STAGES: [Department; 4] = [
    Department::Sales,
    Department::Design,
    Department::Prepress,
    Department::Production,
];

fn stage_index(department: Department) -> Result<usize, OrderError> {
    STAGES
        .iter()
        .position(|stage| *stage == department)
        .ok_or_else(|| {
            OrderError::InvalidArgument(format!("{} is not a workflow department", department))
        })
}

/// The department that receives an order forwarded from `current`,
/// `None` once the order is in the last stage.
pub fn next_department(current: Department) -> Result<Option<Department>, OrderError> {
    let index = stage_index(current)?;
    Ok(STAGES.get(index + 1).copied())
}

/// The department an order is sent back to, `None` from the first stage.
pub fn previous_department(current: Department) -> Result<Option<Department>, OrderError> {
    let index = stage_index(current)?;
    Ok(index.checked_sub(1).map(|i| STAGES[i]))
}

pub fn is_final_stage(department: Department) -> bool {
    STAGES.last() == Some(&department)
}

/// Statuses offered to a department, in display order. Admin may set any.
pub fn allowed_statuses(department: Department) -> &'static [Status] {
    match department {
        Department::Sales => &[
            Status::New,
            Status::InProgress,
            Status::AwaitingApproval,
            Status::Approved,
            Status::OnHold,
            Status::Issue,
            Status::Completed,
            Status::Cancelled,
        ],
        Department::Design => &[
            Status::New,
            Status::InProgress,
            Status::AwaitingApproval,
            Status::Approved,
            Status::Rejected,
            Status::OnHold,
            Status::Issue,
            Status::Completed,
        ],
        Department::Prepress => &[
            Status::New,
            Status::InProgress,
            Status::OnHold,
            Status::Issue,
            Status::Completed,
        ],
        Department::Production => &[
            Status::New,
            Status::InProgress,
            Status::OnHold,
            Status::Issue,
            Status::Completed,
            Status::ReadyForDispatch,
            Status::Dispatched,
        ],
        Department::Admin => &Status::ALL,
    }
}

pub fn is_status_allowed(department: Department, status: Status) -> bool {
    allowed_statuses(department).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_linearly() {
        assert_eq!(next_department(Department::Sales), Ok(Some(Department::Design)));
        assert_eq!(next_department(Department::Design), Ok(Some(Department::Prepress)));
        assert_eq!(
            next_department(Department::Prepress),
            Ok(Some(Department::Production))
        );
        assert_eq!(next_department(Department::Production), Ok(None));
    }

    #[test]
    fn stages_go_back_linearly() {
        assert_eq!(previous_department(Department::Sales), Ok(None));
        assert_eq!(
            previous_department(Department::Production),
            Ok(Some(Department::Prepress))
        );
    }

    #[test]
    fn admin_is_not_a_stage() {
        assert!(matches!(
            next_department(Department::Admin),
            Err(OrderError::InvalidArgument(_))
        ));
        assert!(matches!(
            previous_department(Department::Admin),
            Err(OrderError::InvalidArgument(_))
        ));
        assert!(!is_final_stage(Department::Admin));
    }

    #[test]
    fn every_stage_starts_at_new() {
        for stage in STAGES {
            assert_eq!(allowed_statuses(stage).first(), Some(&Status::New));
        }
        assert_eq!(allowed_statuses(Department::Admin).len(), Status::ALL.len());
        assert!(is_status_allowed(Department::Production, Status::Dispatched));
        assert!(!is_status_allowed(Department::Prepress, Status::Dispatched));
    }
}
