use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{first_row_with_id, SheetStore, Table};
use crate::db::{FILES_HEADER, FILES_SHEET, OPTIONAL_WORKSHEETS, USERS_HEADER, USERS_SHEET};
use crate::error::SheetError;

/// Spreadsheet kept in process memory. Each worksheet is a list of rows,
/// header first.
#[derive(Default)]
pub struct MemoryStore {
    sheets: RwLock<HashMap<String, Vec<Vec<String>>>>,
    write_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the header row of every worksheet the app uses.
    pub fn with_default_sheets() -> Self {
        let mut sheets = HashMap::new();
        let required = [(USERS_SHEET, USERS_HEADER), (FILES_SHEET, FILES_HEADER)];
        for (name, header) in required.into_iter().chain(OPTIONAL_WORKSHEETS.iter().copied()) {
            sheets.insert(
                name.to_string(),
                vec![header.iter().map(|h| h.to_string()).collect()],
            );
        }
        Self {
            sheets: RwLock::new(sheets),
            write_calls: AtomicU64::new(0),
        }
    }

    pub async fn add_sheet(&self, name: &str) {
        self.sheets
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    /// Number of create/append/update/delete calls served so far.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SheetStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn fetch_all(&self, sheet: &str) -> Result<Table, SheetError> {
        let sheets = self.sheets.read().await;
        let values = sheets
            .get(sheet)
            .ok_or_else(|| SheetError::WorksheetNotFound(sheet.to_string()))?;
        Ok(Table::from_values(values.clone()))
    }

    async fn create_sheet(&self, sheet: &str) -> Result<(), SheetError> {
        let mut sheets = self.sheets.write().await;
        if sheets.contains_key(sheet) {
            return Err(SheetError::Api {
                status: 400,
                message: format!("A sheet with the name \"{}\" already exists", sheet),
            });
        }
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        sheets.insert(sheet.to_string(), Vec::new());
        Ok(())
    }

    async fn append_row(&self, sheet: &str, cells: Vec<String>) -> Result<(), SheetError> {
        let mut sheets = self.sheets.write().await;
        let values = sheets
            .get_mut(sheet)
            .ok_or_else(|| SheetError::WorksheetNotFound(sheet.to_string()))?;
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        values.push(cells);
        Ok(())
    }

    async fn find_row(&self, sheet: &str, id: &str) -> Result<Option<usize>, SheetError> {
        let sheets = self.sheets.read().await;
        let values = sheets
            .get(sheet)
            .ok_or_else(|| SheetError::WorksheetNotFound(sheet.to_string()))?;
        Ok(first_row_with_id(values, id))
    }

    async fn update_cells(
        &self,
        sheet: &str,
        row: usize,
        first_column: usize,
        cells: Vec<String>,
    ) -> Result<(), SheetError> {
        if row == 0 || first_column == 0 {
            return Err(SheetError::Malformed(format!(
                "row and column are 1-based, got row {} column {}",
                row, first_column
            )));
        }
        let mut sheets = self.sheets.write().await;
        let values = sheets
            .get_mut(sheet)
            .ok_or_else(|| SheetError::WorksheetNotFound(sheet.to_string()))?;
        let target = values.get_mut(row - 1).ok_or_else(|| {
            SheetError::Malformed(format!("row {} is past the end of '{}'", row, sheet))
        })?;

        let end = first_column - 1 + cells.len();
        if target.len() < end {
            target.resize(end, String::new());
        }
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        for (offset, cell) in cells.into_iter().enumerate() {
            target[first_column - 1 + offset] = cell;
        }
        Ok(())
    }

    async fn delete_row(&self, sheet: &str, row: usize) -> Result<(), SheetError> {
        let mut sheets = self.sheets.write().await;
        let values = sheets
            .get_mut(sheet)
            .ok_or_else(|| SheetError::WorksheetNotFound(sheet.to_string()))?;
        if row < 2 || row > values.len() {
            return Err(SheetError::Malformed(format!(
                "row {} is not a data row of '{}'",
                row, sheet
            )));
        }
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        values.remove(row - 1);
        Ok(())
    }
}
