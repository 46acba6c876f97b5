//! Outbound notifications sent after an order changes hands or state.
use super::order::{Department, Order};
use tracing::info;

/// What a notification carries about the order that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub order_id: String,
    pub order_number: String,
    pub status_label: String,
    pub department: Department,
}

impl Notification {
    /// Uses the order's current status unless `label` overrides it
    /// (e.g. "Payment Received", "Deleted").
    pub fn for_order(order: &Order, label: Option<&str>) -> Self {
        Self {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            status_label: label.unwrap_or(order.status.label()).to_string(),
            department: order.current_department,
        }
    }
}

pub trait Notifier {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of a delivery channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            order_id = %notification.order_id,
            order = %notification.order_number,
            status = %notification.status_label,
            department = %notification.department,
            "order notification"
        );
        Ok(())
    }
}
