pub use crate::config::*;
use crate::table::Table;

/// A builder for assembling a table from raw text rows.
///
/// This is what the file readers use: every cell is text, empty cells become null.
///
/// ```
/// use redcap_shaping::builder::TableBuilder;
/// # use redcap_shaping::ShapeError;
///
/// let mut builder = TableBuilder::new(&["Student ID".to_string(), "Email".to_string()])?;
/// builder.add_row_simple(&["42".to_string(), "".to_string()])?;
/// let table = builder.build();
///
/// assert_eq!(table.value(0, "Student ID"), Some("42"));
/// assert_eq!(table.value(0, "Email"), None);
/// # Ok::<(), ShapeError>(())
/// ```
pub struct TableBuilder {
    pub(crate) _columns: Vec<String>,
    pub(crate) _rows: Vec<Vec<Cell>>,
}

impl TableBuilder {
    pub fn new(header: &[String]) -> Result<TableBuilder, ShapeError> {
        // Validates the header once, up front.
        Table::new(header.to_vec())?;
        Ok(TableBuilder {
            _columns: header.to_vec(),
            _rows: Vec::new(),
        })
    }

    /// Adds a row of text values.
    ///
    /// Rows shorter than the header are padded with nulls, which is how
    /// spreadsheet exports usually drop trailing empty cells.
    pub fn add_row_simple(&mut self, values: &[String]) -> Result<(), ShapeError> {
        let cells: Vec<Cell> = values
            .iter()
            .map(|s| if s.is_empty() { None } else { Some(s.clone()) })
            .collect();
        self.add_row(cells)
    }

    /// Adds a row of cells, padding short rows with nulls.
    pub fn add_row(&mut self, mut cells: Vec<Cell>) -> Result<(), ShapeError> {
        if cells.len() > self._columns.len() {
            return Err(ShapeError::RowLength {
                row: self._rows.len(),
                expected: self._columns.len(),
                actual: cells.len(),
            });
        }
        cells.resize(self._columns.len(), None);
        self._rows.push(cells);
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self._rows.len()
    }

    pub fn build(self) -> Table {
        Table::from_parts(self._columns, self._rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_short_rows_and_nulls_empty_cells() {
        let header: Vec<String> = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut b = TableBuilder::new(&header).unwrap();
        b.add_row_simple(&["1".to_string()]).unwrap();
        b.add_row_simple(&["".to_string(), "2".to_string(), "3".to_string()])
            .unwrap();
        let t = b.build();
        assert_eq!(t.rows()[0], vec![Some("1".to_string()), None, None]);
        assert_eq!(t.rows()[1][0], None);
    }

    #[test]
    fn rejects_long_rows() {
        let mut b = TableBuilder::new(&["a".to_string()]).unwrap();
        let res = b.add_row_simple(&["1".to_string(), "2".to_string()]);
        assert!(matches!(res, Err(ShapeError::RowLength { actual: 2, .. })));
    }

    #[test]
    fn rejects_repeated_headers() {
        let res = TableBuilder::new(&["Email".to_string(), "Email".to_string()]);
        assert!(matches!(res, Err(ShapeError::DuplicateHeader { .. })));
    }
}
