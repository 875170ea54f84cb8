//! Inventory reconciliation.
//!
//! Current stock is never stored. It is recomputed on every query as
//! `baseline + net confirmed - sold`, per normalized product key, from the
//! master data, the ledger and the sales rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::PartKind;
use crate::events::PendingQueue;
use crate::ledger::{net_confirmed, LedgerEntry};
use crate::master::{items_from_table, MasterItem};
use crate::normalize::normalize_key;
use crate::table::{cell, resolve_schema, SalesField, Table, SALES_RULES};

pub const SALE_KEYWORDS: &[&str] = &["販売", "売上", "売れた", "sold"];
pub const TOTAL_SENTINELS: &[&str] = &["合計", "小計", "total", "subtotal"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StockStatus {
    InStock,
    /// Out of stock with unconfirmed production on the calendar. Only set by
    /// [`apply_production_signals`].
    Producing,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::InStock => "in-stock",
            StockStatus::Producing => "producing",
            StockStatus::OutOfStock => "out-of-stock",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryRecord {
    pub key: String,
    pub display_name: String,
    pub set_price: i64,
    pub body_remaining: i64,
    pub sheath_remaining: i64,
    pub status: StockStatus,
    pub has_sheath: bool,
    pub net_confirmed: i64,
    pub sales_observed: i64,
    pub target_quantity: i64,
}

#[derive(Default)]
struct ProductGroup<'a> {
    display_name: &'a str,
    price: i64,
    body_baseline: i64,
    sheath_baseline: i64,
    has_sheath: bool,
    target_quantity: i64,
}

/// Counts sale rows per normalized product key. A row is a sale when its
/// process/status column mentions one of [`SALE_KEYWORDS`].
pub fn sales_counts(sales: &Table) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    let schema = resolve_schema(&sales.headers, SALES_RULES);
    let (Some(project_col), Some(process_col)) = (
        schema.get(SalesField::Project),
        schema.get(SalesField::Process),
    ) else {
        if !sales.headers.is_empty() {
            debug!(headers = ?sales.headers, "sales rows lack project/process columns");
        }
        return counts;
    };

    for row in &sales.rows {
        let process = cell(row, Some(process_col)).to_lowercase();
        if !SALE_KEYWORDS.iter().any(|kw| process.contains(kw)) {
            continue;
        }
        let key = normalize_key(cell(row, Some(project_col)));
        if key.is_empty() {
            continue;
        }
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

pub fn reconcile(
    items: &[MasterItem],
    sales: &Table,
    entries: &[LedgerEntry],
) -> Vec<InventoryRecord> {
    let mut groups = BTreeMap::<&str, ProductGroup>::new();
    for item in items {
        if item.key.is_empty() || is_total_row(item) {
            continue;
        }
        let group = groups.entry(item.key.as_str()).or_insert_with(|| ProductGroup {
            display_name: item.display_name.as_str(),
            ..ProductGroup::default()
        });
        group.price = group.price.max(item.unit_price);
        group.target_quantity = group.target_quantity.saturating_add(item.target_quantity);
        match item.part {
            PartKind::Sheath => {
                group.sheath_baseline = group.sheath_baseline.saturating_add(item.baseline_stock);
                group.has_sheath = true;
            }
            PartKind::Body | PartKind::Other => {
                group.body_baseline = group.body_baseline.saturating_add(item.baseline_stock)
            }
        }
    }

    let sold = sales_counts(sales);
    let confirmed = net_confirmed(entries);

    groups
        .into_iter()
        .map(|(key, group)| {
            let sales_observed = sold.get(key).copied().unwrap_or(0);
            let net = confirmed.get(key).copied().unwrap_or(0);
            let body_remaining = remaining(group.body_baseline, net, sales_observed);
            let sheath_remaining = if group.has_sheath {
                remaining(group.sheath_baseline, net, sales_observed)
            } else {
                0
            };
            let status = if body_remaining >= 1 {
                StockStatus::InStock
            } else {
                StockStatus::OutOfStock
            };
            InventoryRecord {
                key: key.to_string(),
                display_name: group.display_name.to_string(),
                set_price: group.price,
                body_remaining,
                sheath_remaining,
                status,
                has_sheath: group.has_sheath,
                net_confirmed: net,
                sales_observed,
                target_quantity: group.target_quantity,
            }
        })
        .collect()
}

/// [`reconcile`] straight from a master spreadsheet export.
pub fn reconcile_table(
    master: &Table,
    sales: &Table,
    entries: &[LedgerEntry],
) -> Vec<InventoryRecord> {
    reconcile(&items_from_table(master), sales, entries)
}

/// Marks out-of-stock products that have unconfirmed production events.
pub fn apply_production_signals(records: &mut [InventoryRecord], pending: &PendingQueue) {
    for record in records
        .iter_mut()
        .filter(|record| record.status == StockStatus::OutOfStock)
    {
        if pending
            .iter()
            .any(|event| normalize_key(&event.project) == record.key)
        {
            record.status = StockStatus::Producing;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesGap {
    pub target_revenue: i64,
    pub current_revenue: i64,
    pub gap: i64,
    pub progress_ratio: f64,
}

/// Target revenue versus the value of stock on hand, over priced products.
pub fn sales_gap(records: &[InventoryRecord]) -> SalesGap {
    let (target_revenue, current_revenue) = records
        .iter()
        .filter(|record| record.set_price > 0)
        .fold((0_i64, 0_i64), |(target, current), record| {
            (
                target.saturating_add(record.target_quantity.max(0).saturating_mul(record.set_price)),
                current.saturating_add(record.body_remaining.saturating_mul(record.set_price)),
            )
        });
    let progress_ratio = if target_revenue > 0 {
        (current_revenue as f64 / target_revenue as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    SalesGap {
        target_revenue,
        current_revenue,
        gap: target_revenue.saturating_sub(current_revenue),
        progress_ratio,
    }
}

fn remaining(baseline: i64, net_confirmed: i64, sold: i64) -> i64 {
    baseline
        .saturating_add(net_confirmed)
        .saturating_sub(sold)
        .max(0)
}

fn is_total_row(item: &MasterItem) -> bool {
    TOTAL_SENTINELS.iter().any(|sentinel| item.key == *sentinel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerAction;
    use pretty_assertions::assert_eq;

    fn entry(project: &str, action: LedgerAction) -> LedgerEntry {
        LedgerEntry::new(project, "本体", action, "", "")
    }

    #[test]
    fn sheath_scenario() {
        let items = vec![
            MasterItem::new("剣", PartKind::Body, 5, 0),
            MasterItem::new("剣", PartKind::Sheath, 5, 0),
        ];
        let records = reconcile(&items, &Table::default(), &[]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_name, "剣");
        assert_eq!(records[0].body_remaining, 5);
        assert_eq!(records[0].sheath_remaining, 5);
        assert!(records[0].has_sheath);
        assert_eq!(records[0].status, StockStatus::InStock);
    }

    #[test]
    fn duplicate_keys_collapse_and_take_max_price() {
        let items = vec![
            MasterItem::new("剣", PartKind::Other, 0, 1000),
            MasterItem::new("剣", PartKind::Other, 0, 1200),
            MasterItem::new("", PartKind::Other, 0, 0),
            MasterItem::new("盾", PartKind::Other, 0, 500),
        ];
        let records = reconcile(&items, &Table::default(), &[]);
        assert_eq!(records.len(), 2);
        let sword = records.iter().find(|r| r.key == "剣").expect("sword");
        assert_eq!(sword.set_price, 1200);
        assert!(!sword.has_sheath);
        assert_eq!(sword.sheath_remaining, 0);
    }

    #[test]
    fn total_rows_are_dropped() {
        let items = vec![
            MasterItem::new("剣", PartKind::Body, 1, 100),
            MasterItem::new("合計", PartKind::Body, 99, 0),
            MasterItem::new(" TOTAL ", PartKind::Body, 99, 0),
        ];
        let records = reconcile(&items, &Table::default(), &[]);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn ledger_and_sales_fold_into_remaining() {
        let items = vec![
            MasterItem::new("Ｓｗｏｒｄ Ａ", PartKind::Body, 2, 1000),
            MasterItem::new("Sword A", PartKind::Sheath, 1, 0),
        ];
        let entries = vec![
            entry("sword a", LedgerAction::Produced),
            entry("SwordA", LedgerAction::Produced),
            entry("sworda", LedgerAction::Cancel),
            entry("Shield", LedgerAction::Produced),
        ];
        let sales = Table::from_rows(
            &["PROJECT", "PATH"],
            &[
                &["Sword A", "販売"],
                &["sword a", "Sword_A_face.nc"],
                &["ＳＷＯＲＤ Ａ", "売上 1"],
            ],
        );
        let records = reconcile(&items, &sales, &entries);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.display_name, "Ｓｗｏｒｄ Ａ");
        assert_eq!(record.net_confirmed, 1);
        assert_eq!(record.sales_observed, 2);
        assert_eq!(record.body_remaining, 1);
        assert_eq!(record.sheath_remaining, 0);
        assert_eq!(record.status, StockStatus::InStock);
    }

    #[test]
    fn remaining_never_negative() {
        let items = vec![
            MasterItem::new("剣", PartKind::Body, -5, 100),
            MasterItem::new("剣", PartKind::Sheath, 0, 0),
        ];
        let entries = vec![entry("剣", LedgerAction::Cancel), entry("剣", LedgerAction::Cancel)];
        let sales = Table::from_rows(&["Project", "Status"], &[&["剣", "販売"], &["剣", "販売"]]);
        let records = reconcile(&items, &sales, &entries);
        assert_eq!(records[0].body_remaining, 0);
        assert_eq!(records[0].sheath_remaining, 0);
        assert_eq!(records[0].status, StockStatus::OutOfStock);

        let extreme = vec![MasterItem::new("盾", PartKind::Body, i64::MIN, 0)];
        let records = reconcile(&extreme, &Table::default(), &[]);
        assert_eq!(records[0].body_remaining, 0);
    }

    #[test]
    fn sales_without_recognizable_columns_count_nothing() {
        let sales = Table::from_rows(&["when", "what"], &[&["today", "販売"]]);
        assert!(sales_counts(&sales).is_empty());
    }

    #[test]
    fn reconcile_table_without_name_column_is_empty() {
        let master = Table::from_rows(&["在庫数"], &[&["5"]]);
        assert!(reconcile_table(&master, &Table::default(), &[]).is_empty());
    }

    #[test]
    fn sales_gap_over_priced_records() {
        let mut items = vec![
            MasterItem::new("剣", PartKind::Body, 2, 1000),
            MasterItem::new("鞘飾り", PartKind::Body, 9, 0),
            MasterItem::new("盾", PartKind::Body, 0, 500),
        ];
        items[0].target_quantity = 4;
        items[1].target_quantity = 9;
        items[2].target_quantity = 2;
        let records = reconcile(&items, &Table::default(), &[]);
        let gap = sales_gap(&records);
        assert_eq!(gap.target_revenue, 5000);
        assert_eq!(gap.current_revenue, 2000);
        assert_eq!(gap.gap, 3000);
        assert!((gap.progress_ratio - 0.4).abs() < f64::EPSILON);

        assert_eq!(sales_gap(&[]).progress_ratio, 0.0);
    }

    #[test]
    fn sales_gap_survives_extreme_targets() {
        let mut items = vec![
            MasterItem::new("Sword", PartKind::Body, 5, 1000),
            MasterItem::new("Shield", PartKind::Body, 0, i64::MAX),
        ];
        items[0].target_quantity = -9_223_372_036_854_775_807;
        items[1].target_quantity = i64::MAX;
        items.push(MasterItem::new("Shield", PartKind::Body, 0, 1));
        items[2].target_quantity = i64::MAX;
        let records = reconcile(&items, &Table::default(), &[]);
        let gap = sales_gap(&records);
        assert_eq!(gap.target_revenue, i64::MAX);
        assert_eq!(gap.current_revenue, 5000);
        assert_eq!(gap.gap, i64::MAX - 5000);

        let mut items = vec![MasterItem::new("Sword", PartKind::Body, 5, 1000)];
        items[0].target_quantity = -9_223_372_036_854_775_807;
        let gap = sales_gap(&reconcile(&items, &Table::default(), &[]));
        assert_eq!(gap.target_revenue, 0);
        assert_eq!(gap.gap, -5000);
        assert_eq!(gap.progress_ratio, 0.0);
    }
}
