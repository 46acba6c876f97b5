//! Positional spreadsheet rows <-> orders, used for bulk import and export.
//!
//! Column order: order#, client, items, amount, paid, pending, created at,
//! status, department, payment status, sync id.
use super::error::ValidationError;
use super::order::{
    Department, Order, OrderItem, PaymentMethod, PaymentRecord, PaymentStatus, Status,
    StatusUpdate, TimeStamp,
};
use super::user::User;
use super::utils::{self, format_money, parse_money};
use tracing::warn;

pub const HEADER: [&str; 11] = [
    "Order #",
    "Client",
    "Items",
    "Amount",
    "Paid",
    "Pending",
    "Created At",
    "Status",
    "Department",
    "Payment Status",
    "Sync ID",
];

// the sync id column may be left off entirely
const REQUIRED_COLUMNS: usize = 10;

// A description needs quoting when it would otherwise split on a comma,
// lose a quote, or read back as a quantity suffix.
fn needs_quotes(description: &str) -> bool {
    description.contains(',')
        || description.contains('"')
        || description != description.trim()
        || quantity_suffix(description).is_some()
}

fn quantity_suffix(part: &str) -> Option<(&str, u32)> {
    let (description, qty) = part.rsplit_once(" x")?;
    let qty = qty.trim().parse::<u32>().ok().filter(|q| *q > 0)?;
    Some((description.trim(), qty))
}

pub fn format_items(items: &[OrderItem]) -> String {
    items
        .iter()
        .map(|item| {
            let description = if needs_quotes(&item.description) {
                format!("\"{}\"", item.description.replace('"', "\"\""))
            } else {
                item.description.clone()
            };
            match item.quantity {
                1 => description,
                n => format!("{} x{}", description, n),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// Splits on commas outside double quotes.
fn split_items(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

// `"desc ""quoted"", x2" x3` -> (desc "quoted", x2, 3)
fn parse_quoted(part: &str) -> Option<OrderItem> {
    let body = part.strip_prefix('"')?;
    let mut description = String::new();
    let mut chars = body.char_indices().peekable();
    let rest = loop {
        let (i, c) = chars.next()?;
        if c != '"' {
            description.push(c);
        } else if chars.peek().is_some_and(|(_, next)| *next == '"') {
            chars.next();
            description.push('"');
        } else {
            break body[i + 1..].trim();
        }
    };

    let quantity = match rest {
        "" => 1,
        suffix => suffix
            .strip_prefix('x')?
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|q| *q > 0)?,
    };
    Some(OrderItem::new(&description, quantity))
}

/// "Flyers x500, Banner" -> [Flyers × 500, Banner × 1]
///
/// Descriptions holding commas, quotes or a trailing ` xN` are written in
/// double quotes with inner quotes doubled, e.g. `"Poster x2"` or
/// `"Cards, matte" x50`.
pub fn parse_items(raw: &str) -> Vec<OrderItem> {
    split_items(raw)
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            parse_quoted(part)
                .or_else(|| quantity_suffix(part).map(|(d, q)| OrderItem::new(d, q)))
                .unwrap_or_else(|| OrderItem::new(part, 1))
        })
        .collect()
}

pub fn order_to_row(order: &Order) -> Vec<String> {
    vec![
        order.order_number.clone(),
        order.client_name.clone(),
        format_items(&order.items),
        format_money(order.amount),
        format_money(order.paid_amount),
        format_money(order.pending_amount),
        order
            .created_at
            .as_ref()
            .map(|at| at.to_rfc3339())
            .unwrap_or_default(),
        order.status.label().to_string(),
        order.current_department.label().to_string(),
        order.payment_status.label().to_string(),
        order.sync_id.clone().unwrap_or_default(),
    ]
}

pub fn export_rows(orders: &[Order]) -> Vec<Vec<String>> {
    orders.iter().map(order_to_row).collect()
}

fn cell(row: &[String], column: usize) -> &str {
    row.get(column).map(|c| c.trim()).unwrap_or("")
}

/// Builds an order from one sheet row. `row_number` is only used in errors.
///
/// Paid money becomes a single opening payment so paid and pending keep
/// following the payment history afterwards.
pub fn row_to_order(row_number: usize, row: &[String], author: &User) -> anyhow::Result<Order> {
    let malformed = |reason: String| ValidationError::MalformedRow {
        row: row_number,
        reason,
    };

    if row.len() < REQUIRED_COLUMNS {
        return Err(malformed(format!(
            "expected at least {} columns, found {}",
            REQUIRED_COLUMNS,
            row.len()
        ))
        .into());
    }

    let order_number = cell(row, 0);
    if order_number.is_empty() {
        return Err(malformed("order number is empty".into()).into());
    }
    let client_name = cell(row, 1);
    if client_name.is_empty() {
        return Err(malformed("client is empty".into()).into());
    }
    let items = parse_items(cell(row, 2));
    if items.is_empty() {
        return Err(malformed("no items".into()).into());
    }

    let amount = parse_money(cell(row, 3)).map_err(|e| malformed(e.to_string()))?;
    let paid = match cell(row, 4) {
        "" => 0,
        raw => parse_money(raw).map_err(|e| malformed(e.to_string()))?,
    };
    if amount < 0 || paid < 0 {
        return Err(malformed("amounts cannot be negative".into()).into());
    }
    if let Ok(pending) = parse_money(cell(row, 5)) {
        if pending != amount - paid {
            warn!(
                row = row_number,
                order = order_number,
                pending,
                "pending column disagrees with amount and paid, recomputing"
            );
        }
    }

    let created_at = TimeStamp::parse(cell(row, 6));
    let status = cell(row, 7)
        .parse::<Status>()
        .map_err(|e| malformed(format!("{}", e)))?;
    let department = cell(row, 8)
        .parse::<Department>()
        .map_err(|e| malformed(format!("{}", e)))?;
    if !department.is_stage() {
        return Err(malformed(format!("{} is not a workflow department", department)).into());
    }
    let sync_id = Some(cell(row, 10)).filter(|id| !id.is_empty()).map(str::to_string);

    let now = TimeStamp::new();
    let mut imported = StatusUpdate::new(department, status, "Imported from sheet", author);
    imported.timestamp = now.clone();

    let mut order = Order {
        id: utils::new_uuid_to_bech32("order_")?,
        order_number: order_number.to_string(),
        client_name: client_name.to_string(),
        items,
        amount,
        paid_amount: 0,
        pending_amount: amount,
        current_department: department,
        status,
        payment_status: PaymentStatus::NotPaid,
        created_at: created_at.clone(),
        updated_at: now.clone(),
        delivery_address: None,
        dispatch: None,
        approval_pending: None,
        status_history: vec![imported],
        payment_history: vec![],
        revision: 0,
        sync_id,
    };
    if paid > 0 {
        order.payment_history.push(PaymentRecord {
            amount: paid,
            date: created_at.unwrap_or(now),
            method: PaymentMethod::Other,
            remarks: Some("Balance imported from sheet".into()),
        });
    }
    order.settle_payments()?;

    Ok(order)
}
