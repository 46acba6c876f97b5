//! Dashboard and report aggregates derived from an order collection.
//!
//! Everything here is a pure fold over `&[Order]`. Empty input yields zeroed
//! maps and empty series, orders without a creation date are left out of
//! anything bucketed by date.
use super::order::{Department, Order, PaymentRecord, PaymentStatus, Status, TimeStamp};
use super::workflow::STAGES;
use chrono::{Datelike, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthlyRevenue {
    pub year: i32,
    pub month: u32,
    pub orders: usize,
    pub billed: i64,    // amount of orders created in the month
    pub collected: i64, // payments received in the month
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEntry {
    pub order_id: String,
    pub order_number: String,
    pub client_name: String,
    pub payment: PaymentRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderSummary {
    pub total_orders: usize,
    pub active_orders: usize,
    pub archived_orders: usize,
    pub total_amount: i64,
    pub total_paid: i64,
    pub total_pending: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub summary: OrderSummary,
    pub by_status: BTreeMap<Status, usize>,
    pub by_payment_status: BTreeMap<PaymentStatus, usize>,
    pub workload: BTreeMap<Department, usize>,
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub recent_payments: Vec<PaymentEntry>,
}

// Orders that no longer need work from any department.
fn is_closed(order: &Order) -> bool {
    matches!(
        order.status,
        Status::Archived | Status::Cancelled | Status::Dispatched
    )
}

pub fn status_counts(orders: &[Order]) -> BTreeMap<Status, usize> {
    let mut counts: BTreeMap<Status, usize> = Status::ALL.iter().map(|s| (*s, 0)).collect();
    for order in orders {
        *counts.entry(order.status).or_default() += 1;
    }
    counts
}

pub fn payment_status_counts(orders: &[Order]) -> BTreeMap<PaymentStatus, usize> {
    let mut counts: BTreeMap<PaymentStatus, usize> =
        PaymentStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for order in orders {
        *counts.entry(order.payment_status).or_default() += 1;
    }
    counts
}

/// Open orders per workflow stage.
pub fn department_workload(orders: &[Order]) -> BTreeMap<Department, usize> {
    let mut counts: BTreeMap<Department, usize> = STAGES.iter().map(|d| (*d, 0)).collect();
    for order in orders.iter().filter(|order| !is_closed(order)) {
        *counts.entry(order.current_department).or_default() += 1;
    }
    counts
}

fn month_of<'a>(
    months: &'a mut BTreeMap<(i32, u32), MonthlyRevenue>,
    at: &TimeStamp<Utc>,
) -> &'a mut MonthlyRevenue {
    let dt = at.to_datetime_utc();
    let (year, month) = (dt.year(), dt.month());
    months.entry((year, month)).or_insert_with(|| MonthlyRevenue {
        year,
        month,
        ..Default::default()
    })
}

/// Billed and collected totals per calendar month, oldest first.
pub fn monthly_revenue(orders: &[Order]) -> Vec<MonthlyRevenue> {
    let mut months = BTreeMap::new();

    for order in orders {
        if let Some(created) = order.created_at.as_ref() {
            let bucket = month_of(&mut months, created);
            bucket.orders += 1;
            bucket.billed = bucket.billed.saturating_add(order.amount);
        }
        for payment in &order.payment_history {
            let bucket = month_of(&mut months, &payment.date);
            bucket.collected = bucket.collected.saturating_add(payment.amount);
        }
    }

    months.into_values().collect()
}

/// Payments received between `since` and `until` (inclusive), newest first.
pub fn recent_payments(
    orders: &[Order],
    since: &TimeStamp<Utc>,
    until: &TimeStamp<Utc>,
) -> Vec<PaymentEntry> {
    let mut entries: Vec<PaymentEntry> = orders
        .iter()
        .flat_map(|order| {
            order
                .payment_history
                .iter()
                .filter(|payment| &payment.date >= since && &payment.date <= until)
                .map(move |payment| PaymentEntry {
                    order_id: order.id.clone(),
                    order_number: order.order_number.clone(),
                    client_name: order.client_name.clone(),
                    payment: payment.clone(),
                })
        })
        .collect();

    entries.sort_by(|a, b| b.payment.date.cmp(&a.payment.date));
    entries
}

pub fn summary(orders: &[Order]) -> OrderSummary {
    orders.iter().fold(OrderSummary::default(), |mut acc, order| {
        acc.total_orders += 1;
        if order.is_archived() {
            acc.archived_orders += 1;
        } else if !is_closed(order) {
            acc.active_orders += 1;
        }
        // totals across orders clamp rather than wrap
        acc.total_amount = acc.total_amount.saturating_add(order.amount);
        acc.total_paid = acc.total_paid.saturating_add(order.paid_amount);
        acc.total_pending = acc.total_pending.saturating_add(order.pending_amount);
        acc
    })
}

pub fn dashboard(orders: &[Order], since: &TimeStamp<Utc>, until: &TimeStamp<Utc>) -> Dashboard {
    Dashboard {
        summary: summary(orders),
        by_status: status_counts(orders),
        by_payment_status: payment_status_counts(orders),
        workload: department_workload(orders),
        monthly_revenue: monthly_revenue(orders),
        recent_payments: recent_payments(orders, since, until),
    }
}
