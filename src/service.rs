//! Service layer API for order workflow operations
//!
//! Every mutation follows the same path: load the stored order, check the
//! acting user's permission, run the pure command, write the new snapshot
//! back with a compare-and-swap against the bytes that were loaded, then
//! notify. A failed notification is logged and never undoes the write.
use super::commands::{self, StatusChange};
use super::config::ShopConfig;
use super::error::OrderError;
use super::notify::{Notification, Notifier, TracingNotifier};
use super::order::{Order, OrderDetails, PaymentMethod, TimeStamp};
use super::permissions;
use super::reports::{self, Dashboard};
use super::sheets;
use super::store::{DocumentStore, ORDERS, SledStore, USERS};
use super::user::User;
use anyhow::Context;
use std::collections::HashSet;
use tracing::{info, warn};

type Check = fn(Option<&User>, &Order) -> bool;

// how a committed change is announced
enum Announce {
    Status,
    Label(&'static str),
    Silent,
}

/// Outcome of a sheet import. Rows are numbered from 1 as in the sheet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: Vec<Order>,
    pub skipped: Vec<(usize, String)>,
}

pub struct OrderService<S: DocumentStore = SledStore, N: Notifier = TracingNotifier> {
    store: S,
    notifier: N,
    config: ShopConfig,
}

impl OrderService<SledStore, TracingNotifier> {
    /// Opens the sled store named by the config and logs notifications.
    pub fn open(config: ShopConfig) -> anyhow::Result<Self> {
        let store = SledStore::open(&config.db_path)?;
        Ok(Self::new(store, TracingNotifier, config))
    }
}

impl<S: DocumentStore, N: Notifier> OrderService<S, N> {
    pub fn new(store: S, notifier: N, config: ShopConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &ShopConfig {
        &self.config
    }

    fn ensure(allowed: bool, user: &User, action: &'static str) -> anyhow::Result<()> {
        if !allowed {
            return Err(OrderError::NotAllowed {
                user: user.name.clone(),
                action,
            }
            .into());
        }
        Ok(())
    }

    /// Load an order and the exact bytes it was stored as
    fn load(&self, order_id: &str) -> anyhow::Result<(Order, Vec<u8>)> {
        let bytes = self
            .store
            .get_one(ORDERS, order_id)
            .with_context(|| format!("failed to load order {}", order_id))?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
        let order: Order = minicbor::decode(&bytes)
            .with_context(|| format!("order {} is not a valid document", order_id))?;

        Ok((order, bytes))
    }

    fn insert(&self, order: &Order) -> anyhow::Result<()> {
        let encoded = minicbor::to_vec(order)?;
        if !self.store.swap(ORDERS, &order.id, None, encoded)? {
            return Err(OrderError::Conflict(order.order_number.clone()).into());
        }
        Ok(())
    }

    fn announce(&self, order: &Order, announce: Announce) {
        let label = match announce {
            Announce::Silent => return,
            Announce::Status => None,
            Announce::Label(label) => Some(label),
        };
        let notification = Notification::for_order(order, label);
        if let Err(e) = self.notifier.notify(&notification) {
            warn!(
                order = %order.order_number,
                error = %e,
                "notification failed, change is kept"
            );
        }
    }

    /// Runs `command` against the stored order and commits its result.
    fn apply<E, F>(
        &self,
        order_id: &str,
        user: &User,
        action: &'static str,
        check: Check,
        announce: Announce,
        command: F,
    ) -> anyhow::Result<Order>
    where
        F: FnOnce(&Order) -> Result<(Order, E), OrderError>,
    {
        let (current, stored) = self.load(order_id)?;
        Self::ensure(check(Some(user), &current), user, action)?;

        let (updated, _entry) = command(&current)?;

        let encoded = minicbor::to_vec(&updated)?;
        let written = self
            .store
            .swap(ORDERS, order_id, Some(stored.as_slice()), encoded)
            .with_context(|| format!("failed to save order {}", current.order_number))?;
        if !written {
            return Err(OrderError::Conflict(current.order_number.clone()).into());
        }

        info!(
            order = %updated.order_number,
            action,
            user = %user.name,
            revision = updated.revision,
            "order updated"
        );
        self.announce(&updated, announce);

        Ok(updated)
    }

    pub fn get_order(&self, order_id: &str) -> anyhow::Result<Order> {
        self.load(order_id).map(|(order, _)| order)
    }

    /// All orders, newest first; undated imports last.
    pub fn list_orders(&self) -> anyhow::Result<Vec<Order>> {
        let mut orders = self
            .store
            .get(ORDERS)
            .context("failed to list orders")?
            .into_iter()
            .map(|(id, bytes)| {
                minicbor::decode::<Order>(&bytes)
                    .with_context(|| format!("order {} is not a valid document", id))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// Intake a new order
    pub fn create_order(&self, details: OrderDetails, user: &User) -> anyhow::Result<Order> {
        Self::ensure(permissions::can_create_order(Some(user)), user, "create orders")?;

        let order = details
            .set_order_prefix(&self.config.order_prefix)
            .validate_and_finalise(user)?;
        self.insert(&order)?;

        info!(order = %order.order_number, user = %user.name, "order created");
        Ok(order)
    }

    /// Manual status edit. The configured edit window applies unless the
    /// change carries its own.
    pub fn advance_status(
        &self,
        order_id: &str,
        mut change: StatusChange,
        user: &User,
    ) -> anyhow::Result<Order> {
        if change.edit_window_minutes.is_none() {
            change.edit_window_minutes = Some(self.config.edit_window_minutes);
        }
        self.apply(
            order_id,
            user,
            "update the status",
            permissions::can_update_status,
            Announce::Silent,
            |order| commands::advance_status_with(order, change, user),
        )
    }

    pub fn record_payment(
        &self,
        order_id: &str,
        amount: i64,
        method: PaymentMethod,
        remarks: Option<&str>,
        user: &User,
    ) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "record payments",
            permissions::can_record_payment,
            Announce::Label("Payment Received"),
            |order| commands::record_payment(order, amount, method, remarks),
        )
    }

    pub fn forward(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "forward this order",
            permissions::can_forward,
            Announce::Status,
            |order| commands::forward(order, user, remarks),
        )
    }

    pub fn send_back(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "return this order",
            permissions::can_update_status,
            Announce::Label("Returned"),
            |order| commands::send_back(order, user, remarks),
        )
    }

    pub fn duplicate(&self, order_id: &str, user: &User) -> anyhow::Result<Order> {
        let source = self.get_order(order_id)?;
        Self::ensure(
            permissions::can_duplicate(Some(user), &source),
            user,
            "duplicate orders",
        )?;

        let copy = commands::duplicate(&source, user)?;
        self.insert(&copy)?;

        info!(
            order = %copy.order_number,
            source = %source.order_number,
            "order duplicated"
        );
        Ok(copy)
    }

    pub fn hold(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "hold this order",
            permissions::can_update_status,
            Announce::Status,
            |order| commands::hold(order, user, remarks),
        )
    }

    pub fn resume(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "resume this order",
            permissions::can_update_status,
            Announce::Label("Resumed"),
            |order| commands::resume(order, user, remarks),
        )
    }

    pub fn cancel(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "cancel this order",
            permissions::can_update_status,
            Announce::Status,
            |order| commands::cancel(order, user, remarks),
        )
    }

    pub fn complete(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "complete this order",
            permissions::can_update_status,
            Announce::Status,
            |order| commands::complete(order, user, remarks),
        )
    }

    pub fn reopen(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "reopen this order",
            permissions::can_update_status,
            Announce::Label("Reopened"),
            |order| commands::reopen(order, user, remarks),
        )
    }

    pub fn request_approval(
        &self,
        order_id: &str,
        user: &User,
        remarks: &str,
    ) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "request approval",
            permissions::can_request_approval,
            Announce::Silent,
            |order| commands::request_approval(order, user, remarks),
        )
    }

    pub fn approve(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "approve orders",
            permissions::can_approve,
            Announce::Silent,
            |order| commands::approve(order, user, remarks),
        )
    }

    pub fn reject(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "reject orders",
            permissions::can_approve,
            Announce::Status,
            |order| commands::reject(order, user, remarks),
        )
    }

    pub fn archive(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "archive orders",
            |u, _| permissions::can_archive(u),
            Announce::Status,
            |order| commands::archive(order, user, remarks),
        )
    }

    pub fn restore(&self, order_id: &str, user: &User, remarks: &str) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "restore orders",
            |u, _| permissions::can_archive(u),
            Announce::Label("Restored"),
            |order| commands::restore(order, user, remarks),
        )
    }

    pub fn dispatch(
        &self,
        order_id: &str,
        user: &User,
        carrier: &str,
        tracking_number: Option<&str>,
        remarks: &str,
    ) -> anyhow::Result<Order> {
        self.apply(
            order_id,
            user,
            "dispatch orders",
            permissions::can_dispatch,
            Announce::Status,
            |order| commands::dispatch(order, user, carrier, tracking_number, remarks),
        )
    }

    /// Removes the given orders for good. Returns how many existed.
    pub fn bulk_delete(&self, order_ids: &[String], user: &User) -> anyhow::Result<usize> {
        Self::ensure(permissions::can_delete(Some(user)), user, "delete orders")?;

        let mut deleted = 0;
        for id in order_ids {
            let existing = match self.load(id) {
                Ok((order, _)) => order,
                Err(e) if matches!(
                    e.downcast_ref::<OrderError>(),
                    Some(OrderError::NotFound(_))
                ) =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.store.delete(ORDERS, id)? {
                deleted += 1;
                self.announce(&existing, Announce::Label("Deleted"));
            }
        }

        info!(deleted, user = %user.name, "orders deleted");
        Ok(deleted)
    }

    /// Imports sheet rows. Bad rows and order numbers already on file are
    /// skipped and reported rather than failing the whole import.
    pub fn import_rows(&self, rows: &[Vec<String>], user: &User) -> anyhow::Result<ImportReport> {
        Self::ensure(permissions::can_import(Some(user)), user, "import orders")?;

        let mut known: HashSet<String> = self
            .list_orders()?
            .into_iter()
            .map(|order| order.order_number)
            .collect();
        let mut report = ImportReport::default();

        for (index, row) in rows.iter().enumerate() {
            let row_number = index + 1;
            let order = match sheets::row_to_order(row_number, row, user) {
                Ok(order) => order,
                Err(e) => {
                    warn!(row = row_number, error = %e, "skipping sheet row");
                    report.skipped.push((row_number, e.to_string()));
                    continue;
                }
            };
            if !known.insert(order.order_number.clone()) {
                report
                    .skipped
                    .push((row_number, format!("order {} already exists", order.order_number)));
                continue;
            }

            self.insert(&order)?;
            self.announce(&order, Announce::Label("Imported"));
            report.imported.push(order);
        }

        info!(
            imported = report.imported.len(),
            skipped = report.skipped.len(),
            "sheet import finished"
        );
        Ok(report)
    }

    pub fn export_rows(&self, user: &User) -> anyhow::Result<Vec<Vec<String>>> {
        Self::ensure(permissions::can_view_reports(Some(user)), user, "export orders")?;
        Ok(sheets::export_rows(&self.list_orders()?))
    }

    pub fn save_user(&self, user: &User) -> anyhow::Result<()> {
        self.store
            .set(USERS, &user.id, minicbor::to_vec(user)?)
            .with_context(|| format!("failed to save user {}", user.name))
    }

    pub fn list_users(&self) -> anyhow::Result<Vec<User>> {
        self.store
            .get(USERS)?
            .into_iter()
            .map(|(id, bytes)| {
                minicbor::decode::<User>(&bytes)
                    .with_context(|| format!("user {} is not a valid document", id))
            })
            .collect()
    }

    /// Admin dashboard over every stored order, payments windowed by the
    /// configured number of days.
    pub fn dashboard(&self, user: &User) -> anyhow::Result<Dashboard> {
        Self::ensure(permissions::can_view_reports(Some(user)), user, "view reports")?;

        let days = self.config.recent_payment_days;
        let until = TimeStamp::new();
        let since = days
            .checked_mul(24 * 60)
            .and_then(i64::checked_neg)
            .and_then(|minutes| until.plus_minutes(minutes))
            .ok_or_else(|| {
                OrderError::InvalidArgument(format!(
                    "recent payment window of {} days is out of range",
                    days
                ))
            })?;
        Ok(reports::dashboard(&self.list_orders()?, &since, &until))
    }
}
