//! Data-access façade over the spreadsheet that stores every record.
//!
//! Worksheets are addressed by name, the first row is the header and data
//! rows are numbered the way the spreadsheet numbers them (header is row 1).

mod auth;
mod google;
mod memory;

pub use google::GoogleSheetsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Backend, Config};
use crate::error::SheetError;

/// One worksheet read in full. Data rows are padded to the header width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_values(mut values: Vec<Vec<String>>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let header = values.remove(0);
        let width = header.len();
        let rows = values
            .into_iter()
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, String::new());
                }
                row
            })
            .collect();
        Self { header, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a header column, matched exactly.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

#[async_trait]
pub trait SheetStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn fetch_all(&self, sheet: &str) -> Result<Table, SheetError>;

    /// Adds an empty worksheet called `sheet`.
    async fn create_sheet(&self, sheet: &str) -> Result<(), SheetError>;

    async fn append_row(&self, sheet: &str, cells: Vec<String>) -> Result<(), SheetError>;

    /// Sheet row number (1-based, header included) of the first data row
    /// whose column A equals `id`. An empty `id` never matches.
    async fn find_row(&self, sheet: &str, id: &str) -> Result<Option<usize>, SheetError>;

    /// Overwrites `cells.len()` contiguous cells of `row` starting at
    /// `first_column` (1-based) in a single write.
    async fn update_cells(
        &self,
        sheet: &str,
        row: usize,
        first_column: usize,
        cells: Vec<String>,
    ) -> Result<(), SheetError>;

    /// Removes one data row; the rows below it move up.
    async fn delete_row(&self, sheet: &str, row: usize) -> Result<(), SheetError>;

    /// Returns `false` without writing anything when `id` is absent.
    async fn find_and_update(
        &self,
        sheet: &str,
        id: &str,
        first_column: usize,
        cells: Vec<String>,
    ) -> Result<bool, SheetError> {
        match self.find_row(sheet, id).await? {
            Some(row) => {
                self.update_cells(sheet, row, first_column, cells).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Reads a worksheet that older spreadsheets may not have yet. A missing
/// worksheet reads as empty.
pub async fn fetch_optional(store: &dyn SheetStore, sheet: &str) -> Result<Table, SheetError> {
    match store.fetch_all(sheet).await {
        Err(SheetError::WorksheetNotFound(_)) => {
            tracing::debug!("worksheet '{}' is missing, reading it as empty", sheet);
            Ok(Table::default())
        }
        other => other,
    }
}

/// Index into `values` (header at 0) of the first data row whose column A is
/// `id`, as a 1-based sheet row number.
pub(crate) fn first_row_with_id(values: &[Vec<String>], id: &str) -> Option<usize> {
    if id.is_empty() {
        return None;
    }
    values
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| row.first().map(String::as_str) == Some(id))
        .map(|(index, _)| index + 1)
}

pub type SharedStore = Arc<dyn SheetStore>;

/// Opens the configured backend once; the handle is shared for the life of
/// the process.
pub async fn connect(config: &Config) -> Result<SharedStore, SheetError> {
    match config.backend {
        Backend::Memory => {
            tracing::warn!("using in-memory spreadsheet; data is lost on restart");
            Ok(Arc::new(MemoryStore::with_default_sheets()))
        }
        Backend::Google => {
            let key = config
                .service_account
                .clone()
                .ok_or_else(|| SheetError::Auth("service account credentials missing".to_string()))?;
            let store = GoogleSheetsStore::open(
                key,
                config.spreadsheet_id.as_deref(),
                &config.spreadsheet_name,
                config.sheets_timeout,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}

/// Converts a 1-based column number to its A1 letters.
pub fn column_letter(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A1 range covering `width` cells of one row, e.g. `files!F3:H3`.
pub fn row_range(sheet: &str, row: usize, first_column: usize, width: usize) -> String {
    let last = first_column + width.max(1) - 1;
    format!(
        "{}!{}{}:{}{}",
        sheet,
        column_letter(first_column),
        row,
        column_letter(last),
        row
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_follow_a1_notation() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(6), "F");
        assert_eq!(column_letter(8), "H");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn grade_columns_form_one_range() {
        assert_eq!(row_range("files", 3, 6, 3), "files!F3:H3");
        assert_eq!(row_range("users", 10, 4, 2), "users!D10:E10");
    }

    #[test]
    fn short_rows_are_padded_to_header_width() {
        let table = Table::from_values(vec![
            vec!["id".into(), "name".into(), "phone".into()],
            vec!["1".into(), "Mona".into()],
        ]);
        assert_eq!(table.rows[0], vec!["1", "Mona", ""]);
        assert_eq!(table.column("phone"), Some(2));
    }

    #[test]
    fn empty_id_never_matches_a_row() {
        let values = vec![
            vec!["id".to_string(), "name".to_string()],
            vec![String::new(), "blank".to_string()],
            vec!["a".to_string(), "Ali".to_string()],
        ];
        assert_eq!(first_row_with_id(&values, ""), None);
        assert_eq!(first_row_with_id(&values, "a"), Some(3));
    }

    #[tokio::test]
    async fn missing_optional_worksheet_reads_as_empty() {
        let store = MemoryStore::new();
        let table = fetch_optional(&store, "meetings").await.unwrap();
        assert!(table.header.is_empty());
        assert!(table.is_empty());
        assert!(matches!(
            store.fetch_all("meetings").await,
            Err(SheetError::WorksheetNotFound(_))
        ));
    }

    #[test]
    fn empty_values_give_empty_table() {
        let table = Table::from_values(Vec::new());
        assert!(table.header.is_empty());
        assert!(table.is_empty());
    }
}
