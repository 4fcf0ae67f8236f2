use std::collections::{HashMap, HashSet};

use crate::config::{Cell, ShapeError};

/// An ordered sequence of rows sharing the same set of named columns.
///
/// Invariants (checked at construction):
/// - column names are unique
/// - every row has exactly one cell per column
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// A borrowed view on one row of a table.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Cell],
}

impl<'a> Row<'a> {
    /// The value of the given column, `None` for null cells and unknown columns.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values[idx].as_deref()
    }

    pub fn values(&self) -> &'a [Cell] {
        self.values
    }

    /// The (column, value) pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Option<&'a str>)> + 'a {
        let columns: &'a [String] = self.columns;
        let values: &'a [Cell] = self.values;
        columns
            .iter()
            .zip(values.iter())
            .map(|(c, v)| (c.as_str(), v.as_deref()))
    }
}

impl Table {
    /// An empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Result<Table, ShapeError> {
        check_unique(&columns)?;
        Ok(Table {
            columns,
            rows: Vec::new(),
        })
    }

    /// A table from its columns and rows, checking all the invariants.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Table, ShapeError> {
        let mut table = Table::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    // The caller guarantees the invariants.
    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Table {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Table { columns, rows }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), ShapeError> {
        if row.len() != self.columns.len() {
            return Err(ShapeError::RowLength {
                row: self.rows.len(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, idx: usize) -> Option<Row<'_>> {
        self.rows.get(idx).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// The positions of all the requested columns.
    ///
    /// Fails with the complete list of the absent ones.
    pub fn require_columns(&self, names: &[&str]) -> Result<Vec<usize>, ShapeError> {
        let positions: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.as_str(), idx))
            .collect();
        let mut found: Vec<usize> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        for name in names {
            match positions.get(name) {
                Some(idx) => found.push(*idx),
                None if !missing.iter().any(|m| m == name) => missing.push(name.to_string()),
                None => {}
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(ShapeError::MissingColumns { columns: missing })
        }
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?[idx].as_deref()
    }

    /// All the values of one column, in row order.
    pub fn column_values(&self, column: &str) -> Result<Vec<Option<&str>>, ShapeError> {
        let idx = self.require_columns(&[column])?[0];
        Ok(self.rows.iter().map(|r| r[idx].as_deref()).collect())
    }

    /// Replaces the values of a column, or appends it at the end if it does not exist.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> Result<(), ShapeError> {
        if values.len() != self.rows.len() {
            return Err(ShapeError::RowLength {
                row: self.rows.len().min(values.len()),
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        Ok(())
    }

    /// Removes the given columns. Unknown names are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let dropped: HashSet<usize> = names
            .iter()
            .filter_map(|n| self.column_index(n))
            .collect();
        if dropped.is_empty() {
            return;
        }
        self.columns = keep_positions(std::mem::take(&mut self.columns), &dropped);
        self.rows = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|r| keep_positions(r, &dropped))
            .collect();
    }

    /// Moves the given columns (those that exist) to the front, in the given order.
    /// The other columns keep their relative order.
    pub fn move_to_front(&mut self, names: &[&str]) {
        let mut order: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        let front: HashSet<usize> = order.iter().cloned().collect();
        order.extend((0..self.columns.len()).filter(|idx| !front.contains(idx)));
        self.columns = order.iter().map(|idx| self.columns[*idx].clone()).collect();
        self.rows = self
            .rows
            .iter()
            .map(|r| order.iter().map(|idx| r[*idx].clone()).collect())
            .collect();
    }

    /// Keeps only the rows accepted by the predicate.
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(Row<'_>) -> bool,
    {
        let columns = &self.columns;
        self.rows.retain(|values| {
            keep(Row {
                columns,
                values,
            })
        });
    }

    /// Rebuilds the table with the rows in the given order of positions.
    pub(crate) fn reorder_rows(&mut self, order: &[usize]) {
        debug_assert_eq!(order.len(), self.rows.len());
        let mut old: Vec<Option<Vec<Cell>>> =
            std::mem::take(&mut self.rows).into_iter().map(Some).collect();
        self.rows = order.iter().filter_map(|idx| old[*idx].take()).collect();
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<Vec<Cell>>) {
        (self.columns, self.rows)
    }
}

fn keep_positions<T>(values: Vec<T>, dropped: &HashSet<usize>) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !dropped.contains(idx))
        .map(|(_, v)| v)
        .collect()
}

fn check_unique(columns: &[String]) -> Result<(), ShapeError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for c in columns.iter() {
        if !seen.insert(c.as_str()) {
            return Err(ShapeError::DuplicateHeader {
                header: c.clone(),
                sources: columns.iter().filter(|c2| *c2 == c).cloned().collect(),
            });
        }
    }
    Ok(())
}
