// Pure domain logic
pub mod group_rules;
pub mod pricing;

// Catalog
pub mod assemblies;
pub mod assembly_categories;
pub mod assembly_groups;
pub mod materials;
pub mod templates;

// Projects
pub mod clients;
pub mod projects;
pub mod timelines;
pub mod uploads;

// Accounts and messaging
pub mod notifications;
pub mod users;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::ColumnTrait;
use serde::{Deserialize, Deserializer};
use validator::ValidationError;

/// Case-insensitive `LIKE '%term%'` on a text column, portable across
/// PostgreSQL and SQLite.
pub(crate) fn ilike<C: ColumnTrait>(column: C, term: &str) -> SimpleExpr {
    let pattern = format!("%{}%", term.trim().to_lowercase());
    Expr::expr(Func::lower(Expr::col(column))).like(pattern)
}

/// Converts a 1-based page into the zero-based index sea-orm expects.
pub(crate) fn page_index(page: u64) -> u64 {
    page.max(1) - 1
}

/// Deserializes a field that can be absent (`None`), explicitly `null`
/// (`Some(None)`) or set (`Some(Some(v))`). Pair with `#[serde(default)]`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trims and drops blank optional strings.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Largest unit price or labor cost accepted.
pub const MAX_AMOUNT: Decimal = dec!(1000000000);
/// Largest quantity accepted on a BOM or template line.
pub const MAX_LINE_QUANTITY: Decimal = dec!(1000000);
/// Largest template markup, in percent.
pub const MAX_MARKUP_PERCENT: Decimal = dec!(1000);
/// Largest number of template units a project may order.
pub const MAX_PROJECT_QUANTITY: i32 = 10_000;
/// Largest value a `numeric(16, 4)` column holds.
pub const MAX_STORED_AMOUNT: Decimal = dec!(999999999999.9999);

fn out_of_range(message: String) -> ValidationError {
    let mut err = ValidationError::new("range");
    err.message = Some(message.into());
    err
}

fn check_range(value: &Decimal, max: Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(out_of_range("Must not be negative".into()));
    }
    if *value > max {
        return Err(out_of_range(format!("Must not exceed {}", max)));
    }
    Ok(())
}

/// Prices and labor costs: `0 ..= MAX_AMOUNT`.
pub(crate) fn validate_amount(value: &Decimal) -> Result<(), ValidationError> {
    check_range(value, MAX_AMOUNT)
}

pub(crate) fn validate_markup(value: &Decimal) -> Result<(), ValidationError> {
    check_range(value, MAX_MARKUP_PERCENT)
}

/// Line quantities: `0 < q <= MAX_LINE_QUANTITY`.
pub(crate) fn validate_line_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(out_of_range("Must be greater than 0".into()));
    }
    check_range(value, MAX_LINE_QUANTITY)
}

#[cfg(test)]
pub(crate) mod test_support {
    use sea_orm::{ConnectOptions, Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::events::{Event, EventSender};

    /// Migrated single-connection in-memory SQLite database.
    pub async fn db() -> Arc<DatabaseConnection> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        crate::migrator::Migrator::up(&db, None).await.unwrap();
        Arc::new(db)
    }

    pub fn events() -> (EventSender, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(64);
        (EventSender::new(tx), rx)
    }
}
