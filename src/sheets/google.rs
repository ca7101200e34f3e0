use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use super::auth::TokenSource;
use super::{first_row_with_id, row_range, SheetStore, Table};
use crate::config::ServiceAccountKey;
use crate::error::SheetError;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Google Sheets v4 backend, authenticated as a service account.
pub struct GoogleSheetsStore {
    client: Client,
    tokens: TokenSource,
    spreadsheet_id: String,
}

impl GoogleSheetsStore {
    /// Resolves the spreadsheet either from an explicit id (or sheet URL) or
    /// by searching Drive for a spreadsheet with `name`.
    pub async fn open(
        key: ServiceAccountKey,
        spreadsheet_id: Option<&str>,
        name: &str,
        timeout: Duration,
    ) -> Result<Self, SheetError> {
        let client = Client::builder().timeout(timeout).build()?;
        let tokens = TokenSource::new(key, client.clone());

        let spreadsheet_id = match spreadsheet_id {
            Some(raw) => extract_spreadsheet_id(raw)
                .ok_or_else(|| SheetError::SpreadsheetNotFound(raw.to_string()))?,
            None => find_by_name(&client, &tokens, name).await?,
        };
        info!("Using spreadsheet {}", spreadsheet_id);

        Ok(Self {
            client,
            tokens,
            spreadsheet_id,
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/{}/values/{}", SHEETS_API, self.spreadsheet_id, range)
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, SheetError> {
        let bearer = self.tokens.bearer().await?;
        Ok(self.client.request(method, url).bearer_auth(bearer))
    }

    async fn batch_update(&self, sheet: &str, request: Value) -> Result<(), SheetError> {
        let url = format!("{}/{}:batchUpdate", SHEETS_API, self.spreadsheet_id);
        let response = self
            .request(Method::POST, &url)
            .await?
            .json(&json!({ "requests": [request] }))
            .send()
            .await?;
        let _: Value = parse_response(response, sheet).await?;
        Ok(())
    }

    /// Numeric id of a worksheet, which structural edits address it by.
    async fn sheet_id(&self, sheet: &str) -> Result<i64, SheetError> {
        let url = format!("{}/{}", SHEETS_API, self.spreadsheet_id);
        let response = self
            .request(Method::GET, &url)
            .await?
            .query(&[("fields", "sheets.properties(sheetId,title)")])
            .send()
            .await?;
        let meta: SpreadsheetMeta = parse_response(response, sheet).await?;
        meta.sheets
            .into_iter()
            .find(|s| s.properties.title == sheet)
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| SheetError::WorksheetNotFound(sheet.to_string()))
    }

    async fn read_range(&self, range: &str, sheet: &str) -> Result<Vec<Vec<String>>, SheetError> {
        let response = self
            .request(Method::GET, &self.values_url(range))
            .await?
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await?;
        let body: ValueRange = parse_response(response, sheet).await?;
        Ok(body.values.into_iter().map(|row| row.into_iter().map(cell_text).collect()).collect())
    }
}

#[async_trait]
impl SheetStore for GoogleSheetsStore {
    fn backend_tag(&self) -> &'static str {
        "google"
    }

    async fn fetch_all(&self, sheet: &str) -> Result<Table, SheetError> {
        let values = self.read_range(sheet, sheet).await?;
        Ok(Table::from_values(values))
    }

    async fn create_sheet(&self, sheet: &str) -> Result<(), SheetError> {
        self.batch_update(sheet, json!({ "addSheet": { "properties": { "title": sheet } } }))
            .await?;
        info!("Created worksheet '{}'", sheet);
        Ok(())
    }

    async fn append_row(&self, sheet: &str, cells: Vec<String>) -> Result<(), SheetError> {
        let url = self.values_url(&format!("{}!A1:append", sheet));
        let response = self
            .request(Method::POST, &url)
            .await?
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "majorDimension": "ROWS", "values": [cells] }))
            .send()
            .await?;
        let body: Value = parse_response(response, sheet).await?;
        debug!(
            sheet,
            range = body["updates"]["updatedRange"].as_str().unwrap_or(""),
            "appended row"
        );
        Ok(())
    }

    async fn find_row(&self, sheet: &str, id: &str) -> Result<Option<usize>, SheetError> {
        if id.is_empty() {
            return Ok(None);
        }
        let column = self.read_range(&format!("{}!A:A", sheet), sheet).await?;
        Ok(first_row_with_id(&column, id))
    }

    async fn update_cells(
        &self,
        sheet: &str,
        row: usize,
        first_column: usize,
        cells: Vec<String>,
    ) -> Result<(), SheetError> {
        let range = row_range(sheet, row, first_column, cells.len());
        let response = self
            .request(Method::PUT, &self.values_url(&range))
            .await?
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": [cells] }))
            .send()
            .await?;
        let _: Value = parse_response(response, sheet).await?;
        debug!(%range, "updated cells");
        Ok(())
    }

    async fn delete_row(&self, sheet: &str, row: usize) -> Result<(), SheetError> {
        if row < 2 {
            return Err(SheetError::Malformed(format!(
                "row {} is not a data row of '{}'",
                row, sheet
            )));
        }
        let sheet_id = self.sheet_id(sheet).await?;
        self.batch_update(sheet, delete_row_request(sheet_id, row)).await?;
        debug!(sheet, row, "deleted row");
        Ok(())
    }
}

/// `deleteDimension` takes a zero-based, end-exclusive row span.
fn delete_row_request(sheet_id: i64, row: usize) -> Value {
    json!({
        "deleteDimension": {
            "range": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "startIndex": row - 1,
                "endIndex": row
            }
        }
    })
}

async fn find_by_name(client: &Client, tokens: &TokenSource, name: &str) -> Result<String, SheetError> {
    let query = format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        name.replace('\'', "\\'"),
        SPREADSHEET_MIME
    );
    let response = client
        .get(DRIVE_FILES_API)
        .bearer_auth(tokens.bearer().await?)
        .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
        .send()
        .await?;
    let list: DriveFileList = parse_response(response, name).await?;
    list.files
        .into_iter()
        .find(|f| f.name == name)
        .map(|f| f.id)
        .ok_or_else(|| SheetError::SpreadsheetNotFound(name.to_string()))
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    sheet: &str,
) -> Result<T, SheetError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .unwrap_or(text);
        if status.as_u16() == 400 && message.contains("Unable to parse range") {
            return Err(SheetError::WorksheetNotFound(sheet.to_string()));
        }
        return Err(SheetError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| SheetError::Malformed(e.to_string()))
}

/// Cells come back as strings for RAW input, but formulas and numbers typed
/// by hand can surface as other JSON scalars.
fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Accepts a bare spreadsheet id or any Google Sheets URL that contains one.
pub fn extract_spreadsheet_id(raw: &str) -> Option<String> {
    static URL_ID: OnceLock<Option<Regex>> = OnceLock::new();
    static BARE_ID: OnceLock<Option<Regex>> = OnceLock::new();

    let raw = raw.trim();
    let url_id = URL_ID
        .get_or_init(|| Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").ok())
        .as_ref()?;
    if let Some(caps) = url_id.captures(raw) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    let bare_id = BARE_ID
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{25,}$").ok())
        .as_ref()?;
    bare_id.is_match(raw).then(|| raw.to_string())
}
