//! Table rendering for manifest reports

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, Color, ContentArrangement, Table};
use migrator_manifest::{MigrationStatus, StatusTotals};

fn status_color(status: MigrationStatus) -> Color {
    match status {
        MigrationStatus::Pending => Color::Grey,
        MigrationStatus::Skipped => Color::Yellow,
        MigrationStatus::Migrated => Color::Green,
        MigrationStatus::Error => Color::Red,
        MigrationStatus::Canceled => Color::Magenta,
    }
}

/// One row per content type with its count for every status, plus a total row.
pub fn status_table(rows: &[(String, usize, StatusTotals)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![Cell::new("Content type").fg(Color::Cyan), Cell::new("Entries").fg(Color::Cyan)];
    header.extend(
        MigrationStatus::ALL
            .iter()
            .map(|status| Cell::new(status.as_str()).fg(status_color(*status))),
    );
    table.set_header(header);

    let mut grand_total = 0;
    let mut column_totals = [0usize; MigrationStatus::ALL.len()];
    for (name, entries, totals) in rows {
        grand_total += entries;
        let mut cells = vec![Cell::new(name), count_cell(*entries)];
        for (i, status) in MigrationStatus::ALL.iter().enumerate() {
            let count = totals.get(status).copied().unwrap_or(0);
            column_totals[i] += count;
            cells.push(count_cell(count));
        }
        table.add_row(cells);
    }

    if rows.len() > 1 {
        let mut cells = vec![Cell::new("Total"), count_cell(grand_total)];
        cells.extend(column_totals.iter().map(|count| count_cell(*count)));
        table.add_row(cells);
    }
    table
}

fn count_cell(count: usize) -> Cell {
    Cell::new(count).set_alignment(CellAlignment::Right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table_includes_totals() {
        let mut workbooks = StatusTotals::new();
        workbooks.insert(MigrationStatus::Migrated, 3);
        workbooks.insert(MigrationStatus::Error, 1);
        let mut users = StatusTotals::new();
        users.insert(MigrationStatus::Pending, 2);

        let table = status_table(&[
            ("User".to_string(), 2, users),
            ("Workbook".to_string(), 4, workbooks),
        ]);
        let rendered = table.to_string();
        assert!(rendered.contains("Workbook"));
        assert!(rendered.contains("Total"));
        assert!(rendered.contains("Migrated"));
    }
}
