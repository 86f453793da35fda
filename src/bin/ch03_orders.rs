//! Chapter 3: structs, methods and validated constructors.
//!
//! An order with a list of order lines. Nothing is persisted; the point is
//! constructor validation and methods that mutate through `&mut self`.
//!
//! Run with: cargo run --bin ch03_orders

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/* ============================================================
 * Errors
 * ============================================================
 */

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("item is required")]
    MissingItem,

    #[error("user is required")]
    MissingUser,

    #[error("{field} should be a valid number")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("The id provided is not an OrderLine")]
    LineNotFound(u32),

    #[error("index {index} is out of range for an order with {len} lines")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("You dont have any OrderLines")]
    NoLines,
}

fn check_amount(field: &'static str, value: f64) -> Result<f64, OrderError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(OrderError::InvalidAmount { field, value })
    }
}

/* ============================================================
 * Order line
 * ============================================================
 */

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLine {
    pub id: u32,
    pub item: String,
    pub created: DateTime<Utc>,
    pub quantity: u32,
    pub unit_price: f64,
}

impl OrderLine {
    pub fn create(
        id: u32,
        item: impl Into<String>,
        quantity: u32,
        unit_price: f64,
    ) -> Result<Self, OrderError> {
        let item = item.into();
        if item.trim().is_empty() {
            return Err(OrderError::MissingItem);
        }
        let unit_price = check_amount("unitPrice", unit_price)?;

        Ok(Self {
            id,
            item,
            created: Utc::now(),
            quantity,
            unit_price,
        })
    }

    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/* ============================================================
 * Order
 * ============================================================
 */

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: u32,
    pub user: String,
    pub lines: Vec<OrderLine>,
    pub total_cost: f64,
    pub created: DateTime<Utc>,
}

impl Order {
    pub fn create(id: u32, user: impl Into<String>, total_cost: f64) -> Result<Self, OrderError> {
        let user = user.into();
        if user.trim().is_empty() {
            return Err(OrderError::MissingUser);
        }
        let total_cost = check_amount("totalCost", total_cost)?;

        Ok(Self {
            id,
            user,
            lines: Vec::new(),
            total_cost,
            created: Utc::now(),
        })
    }

    pub fn append_line(&mut self, line: OrderLine) -> &OrderLine {
        self.lines.push(line);
        self.refresh_total();
        // Just pushed, so the list is non-empty.
        &self.lines[self.lines.len() - 1]
    }

    pub fn update_line_quantity(&mut self, line_id: u32, quantity: u32) -> Result<(), OrderError> {
        let line = self
            .lines
            .iter_mut()
            .find(|line| line.id == line_id)
            .ok_or(OrderError::LineNotFound(line_id))?;
        line.quantity = quantity;
        self.refresh_total();
        Ok(())
    }

    /// Removes the line at `index` by moving the last line into its slot.
    /// Order of the remaining lines is not preserved.
    pub fn remove_line(&mut self, index: usize) -> Result<OrderLine, OrderError> {
        if index >= self.lines.len() {
            return Err(OrderError::IndexOutOfRange {
                index,
                len: self.lines.len(),
            });
        }
        let removed = self.lines.swap_remove(index);
        self.refresh_total();
        Ok(removed)
    }

    pub fn total_price(&self) -> Result<f64, OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::NoLines);
        }
        Ok(self.lines.iter().map(OrderLine::line_total).sum())
    }

    fn refresh_total(&mut self) {
        self.total_cost = self.lines.iter().map(OrderLine::line_total).sum();
    }
}

/* ============================================================
 * Demo (cargo run)
 * ============================================================
 */

#[derive(Parser, Debug)]
#[command(about = "Build an order from a few catalogue items")]
struct Args {
    /// Customer name on the order
    #[arg(long, default_value = "andrea meza")]
    user: String,

    /// Quantity every line is bumped to after being added
    #[arg(long, default_value_t = 6)]
    bump_to: u32,

    #[arg(short, long)]
    verbose: bool,
}

const CATALOGUE: [(&str, f64); 4] = [
    ("book", 0.99),
    ("pencil", 2.99),
    ("paper", 4.89),
    ("notebooks", 10.99),
];

/// One line per catalogue entry, ids counting up from 0, every quantity
/// bumped to `bump_to` after the line is added.
fn build_order(
    user: &str,
    catalogue: &[(&str, f64)],
    bump_to: u32,
) -> Result<Order, OrderError> {
    let mut order = Order::create(1, user, 0.0)?;
    info!(order = order.id, user = %order.user, "order created");

    for (id, (item, price)) in (0u32..).zip(catalogue) {
        let line = OrderLine::create(id, *item, id.saturating_mul(2), *price)?;
        let stored = order.append_line(line);
        debug!(line = stored.id, item = %stored.item, "line appended");
        order.update_line_quantity(id, bump_to)?;
    }
    Ok(order)
}

fn main() -> Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(args.verbose);

    let mut order = build_order(&args.user, &CATALOGUE, args.bump_to)?;

    let removed = order.remove_line(0)?;
    info!(item = %removed.item, "removed first line");

    if let Err(err) = order.update_line_quantity(99, 1) {
        warn!(%err, "update rejected");
    }

    println!("{}", serde_json::to_string_pretty(&order)?);
    println!("Total price: {:.2}", order.total_price()?);
    Ok(())
}

/* ============================================================
 * Tests (cargo test)
 * ============================================================
 */

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        let mut order = Order::create(1, "andrea", 0.0).unwrap();
        order.append_line(OrderLine::create(10, "book", 2, 0.5).unwrap());
        order.append_line(OrderLine::create(11, "pencil", 1, 3.0).unwrap());
        order.append_line(OrderLine::create(12, "paper", 4, 1.25).unwrap());
        order
    }

    #[test]
    fn test_order_line_validation() {
        assert_eq!(
            OrderLine::create(1, "  ", 1, 1.0).unwrap_err(),
            OrderError::MissingItem
        );
        let err = OrderLine::create(1, "book", 1, -0.5).unwrap_err();
        assert_eq!(err.to_string(), "unitPrice should be a valid number");
        assert!(OrderLine::create(1, "book", 1, f64::NAN).is_err());
    }

    #[test]
    fn test_order_validation() {
        assert_eq!(
            Order::create(1, "", 0.0).unwrap_err().to_string(),
            "user is required"
        );
        assert_eq!(
            Order::create(1, "bob", -1.0).unwrap_err().to_string(),
            "totalCost should be a valid number"
        );
        let order = Order::create(7, "bob", 23.44).unwrap();
        assert_eq!(order.total_cost, 23.44);
        assert!(order.lines.is_empty());
    }

    #[test]
    fn test_append_returns_stored_line() {
        let mut order = Order::create(1, "bob", 0.0).unwrap();
        let line = OrderLine::create(3, "book", 2, 1.5).unwrap();
        let stored = order.append_line(line.clone());
        assert_eq!(stored, &line);
        assert_eq!(order.total_cost, 3.0);
    }

    #[test]
    fn test_update_changes_stored_quantity() {
        let mut order = sample_order();
        order.update_line_quantity(11, 5).unwrap();

        let line = order.lines.iter().find(|l| l.id == 11).unwrap();
        assert_eq!(line.quantity, 5);
        assert_eq!(order.total_cost, 1.0 + 15.0 + 5.0);
    }

    #[test]
    fn test_update_unknown_line() {
        let mut order = sample_order();
        let err = order.update_line_quantity(99, 1).unwrap_err();
        assert_eq!(err, OrderError::LineNotFound(99));
        assert_eq!(err.to_string(), "The id provided is not an OrderLine");
    }

    #[test]
    fn test_remove_swaps_last_into_place() {
        let mut order = sample_order();
        let removed = order.remove_line(0).unwrap();

        assert_eq!(removed.id, 10);
        let ids: Vec<u32> = order.lines.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![12, 11]);
        assert_eq!(order.total_cost, 3.0 + 5.0);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut order = sample_order();
        assert_eq!(
            order.remove_line(3).unwrap_err(),
            OrderError::IndexOutOfRange { index: 3, len: 3 }
        );
        assert_eq!(order.lines.len(), 3);
    }

    #[test]
    fn test_total_price() {
        let order = sample_order();
        assert_eq!(order.total_price().unwrap(), 1.0 + 3.0 + 5.0);

        let empty = Order::create(2, "bob", 0.0).unwrap();
        assert_eq!(empty.total_price().unwrap_err(), OrderError::NoLines);
    }

    #[test]
    fn test_build_order_from_catalogue() {
        let order = build_order("andrea", &CATALOGUE, 6).unwrap();

        let ids: Vec<u32> = order.lines.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(order.lines.iter().all(|l| l.quantity == 6));
        assert_eq!(order.lines[3].item, "notebooks");
    }

    #[test]
    fn test_build_order_rejects_bad_catalogue_entry() {
        let catalogue = [("book", 0.99), ("", 1.0)];
        assert_eq!(
            build_order("andrea", &catalogue, 1).unwrap_err(),
            OrderError::MissingItem
        );
    }
}
