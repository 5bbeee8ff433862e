//! Reading the two table shapes SAP GUI exposes into rows of strings.

/// A `GuiTableControl`.
pub trait TableControl {
    fn row_count(&self) -> Result<i32, String>;

    /// `GetCell(row, column).Text`. Fails past the last column.
    fn cell_text(&self, row: i32, column: i32) -> Result<String, String>;
}

/// A `GuiGridView` (a `GuiShell` of subtype `GridView`).
pub trait GridView {
    fn row_count(&self) -> Result<i32, String>;

    /// Column names in display order (`ColumnOrder`).
    fn column_order(&self) -> Result<Vec<String>, String>;

    fn set_first_visible_row(&self, row: i32) -> Result<(), String>;

    fn set_first_visible_column(&self, column: &str) -> Result<(), String>;

    fn cell_value(&self, row: i32, column: &str) -> Result<String, String>;
}

/// Columns are probed until a cell cannot be read; that ends the row only.
pub fn read_table_control(table: &impl TableControl) -> Result<Vec<Vec<String>>, String> {
    let rows = table.row_count()?;
    Ok((0..rows)
        .map(|row| {
            (0..)
                .map_while(|column| table.cell_text(row, column).ok())
                .collect::<Vec<_>>()
        })
        .collect())
}

/// Rows and columns are only loaded once scrolled into view, so the grid is
/// scrolled every third row and every third column while reading. A cell
/// that cannot be scrolled to or read is left out of its row.
pub fn read_grid_view(grid: &impl GridView) -> Result<Vec<Vec<String>>, String> {
    let rows = grid.row_count()?;
    let columns = grid.column_order()?;

    let mut output = Vec::with_capacity(rows.max(0) as usize);
    for row in 0..rows {
        if row % 3 == 0 {
            grid.set_first_visible_row(row)?;
        }
        let mut content = Vec::with_capacity(columns.len());
        for (j, column) in columns.iter().enumerate() {
            if j % 3 == 0 && grid.set_first_visible_column(column).is_err() {
                continue;
            }
            if let Ok(value) = grid.cell_value(row, column) {
                content.push(value);
            }
        }
        output.push(content);
    }
    Ok(output)
}
