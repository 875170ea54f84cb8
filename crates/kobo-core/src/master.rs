//! Product master rows: display names, part lines, baseline stock, prices.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::{classify_part_label, PartKind};
use crate::normalize::normalize_key;
use crate::table::{cell, parse_quantity, resolve_schema, MasterField, Table, MASTER_RULES};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MasterItem {
    pub key: String,
    pub display_name: String,
    pub part: PartKind,
    pub baseline_stock: i64,
    /// Whole currency units.
    pub unit_price: i64,
    #[serde(default)]
    pub target_quantity: i64,
}

impl MasterItem {
    pub fn new(display_name: &str, part: PartKind, baseline_stock: i64, unit_price: i64) -> Self {
        Self {
            key: normalize_key(display_name),
            display_name: display_name.trim().to_string(),
            part,
            baseline_stock,
            unit_price,
            target_quantity: 0,
        }
    }
}

/// Reads master items from a spreadsheet export. Columns are found by
/// keyword; unreadable numbers count as zero. Without any recognizable
/// name column the result is empty.
pub fn items_from_table(table: &Table) -> Vec<MasterItem> {
    let schema = resolve_schema(&table.headers, MASTER_RULES);
    let Some(name_col) = schema.get(MasterField::Name) else {
        warn!(headers = ?table.headers, "master data has no recognizable name column");
        return Vec::new();
    };
    let part_col = schema.get(MasterField::Part);
    let stock_col = schema.get(MasterField::Stock);
    let price_col = schema.get(MasterField::Price);
    let target_col = schema.get(MasterField::Target);

    table
        .rows
        .iter()
        .map(|row| {
            let display_name = cell(row, Some(name_col));
            MasterItem {
                key: normalize_key(display_name),
                display_name: display_name.trim().to_string(),
                part: classify_part_label(cell(row, part_col)),
                baseline_stock: parse_quantity(cell(row, stock_col)).unwrap_or(0),
                unit_price: parse_quantity(cell(row, price_col)).unwrap_or(0),
                target_quantity: parse_quantity(cell(row, target_col)).unwrap_or(0).max(0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_items_with_renamed_headers() {
        let table = Table::from_rows(
            &["品名", "部位", "在庫", "単価", "目標数"],
            &[
                &["剣", "本体", "5", "12,000", "10"],
                &["剣", "鞘", "4.0", "", ""],
                &["盾", "", "abc", "500", "x"],
            ],
        );
        let items = items_from_table(&table);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].key, "剣");
        assert_eq!(items[0].part, PartKind::Body);
        assert_eq!(items[0].unit_price, 12_000);
        assert_eq!(items[0].target_quantity, 10);
        assert_eq!(items[1].part, PartKind::Sheath);
        assert_eq!(items[1].baseline_stock, 4);
        assert_eq!(items[2].part, PartKind::Other);
        assert_eq!(items[2].baseline_stock, 0);
        assert_eq!(items[2].target_quantity, 0);
    }

    #[test]
    fn target_column_ahead_of_stock_keeps_both_values() {
        let table = Table::from_rows(
            &["商品名", "目標数量", "在庫数", "単価"],
            &[&["剣", "10", "2", "1000"]],
        );
        let items = items_from_table(&table);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].baseline_stock, 2);
        assert_eq!(items[0].target_quantity, 10);
        assert_eq!(items[0].unit_price, 1000);
    }

    #[test]
    fn negative_targets_read_as_zero() {
        let table = Table::from_rows(
            &["Name", "Stock", "Price", "Target"],
            &[&["Sword", "5", "1000", "-9223372036854775807"]],
        );
        let items = items_from_table(&table);
        assert_eq!(items[0].target_quantity, 0);
    }

    #[test]
    fn no_name_column_yields_nothing() {
        let table = Table::from_rows(&["在庫数", "単価"], &[&["5", "1000"]]);
        assert!(items_from_table(&table).is_empty());
    }
}
