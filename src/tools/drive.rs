//! Google 云端硬盘工具（只读）：按名称 / 全文搜索，或列出最近修改的文件

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::integrations::google::{require_token, GoogleApi};
use crate::integrations::Scope;
use crate::tools::schema::{arg_str, arg_usize, ArgKind, Args, ToolSchema};
use crate::tools::{Tool, ToolContext, ToolError, ToolItem, ToolOutput};

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SERVICE: &str = "Google Drive";

pub struct GoogleDriveTool {
    api: GoogleApi,
    max_results: usize,
}

impl GoogleDriveTool {
    pub fn new(max_results: usize, timeout: Duration) -> Self {
        Self {
            api: GoogleApi::new(SERVICE, timeout),
            max_results: max_results.clamp(1, 25),
        }
    }
}

#[async_trait]
impl Tool for GoogleDriveTool {
    fn name(&self) -> &str {
        "google_drive"
    }

    fn label(&self) -> &str {
        SERVICE
    }

    fn description(&self) -> &str {
        "Search Google Drive files by name or content (operation=search with query) or list recently modified files (operation=list_recent)."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .optional("operation", ArgKind::one_of(&["search", "list_recent"]), "search or list_recent")
            .optional("query", ArgKind::String, "Words to look for")
            .optional("max_results", ArgKind::Integer, "Number of files")
    }

    fn required_scope(&self) -> Option<Scope> {
        Some(Scope::Drive)
    }

    async fn invoke(&self, ctx: &ToolContext, args: &Args) -> Result<ToolOutput, ToolError> {
        let token = require_token(ctx, SERVICE)?;
        let query = match arg_str(args, "operation") {
            Some("list_recent") => None,
            _ => arg_str(args, "query"),
        };
        let max_results = arg_usize(args, "max_results").unwrap_or(self.max_results).clamp(1, 25);

        let params = [
            ("pageSize", max_results.to_string()),
            ("fields", "files(id,name,mimeType,modifiedTime,webViewLink,owners(displayName))".to_string()),
            ("orderBy", "modifiedTime desc".to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
            ("q", drive_query(query)),
        ];
        let payload = self.api.get_json(FILES_URL, token, &params).await?;
        Ok(ToolOutput::items(parse_files(&payload)))
    }
}

pub fn drive_query(query: Option<&str>) -> String {
    match query {
        Some(q) => {
            let escaped = q.replace('\\', "\\\\").replace('\'', "\\'");
            format!("trashed = false and (name contains '{escaped}' or fullText contains '{escaped}')")
        }
        None => "trashed = false".to_string(),
    }
}

fn friendly_type(mime: &str) -> &str {
    match mime {
        "application/vnd.google-apps.document" => "Google Doc",
        "application/vnd.google-apps.spreadsheet" => "Google Sheet",
        "application/vnd.google-apps.presentation" => "Google Slides",
        "application/vnd.google-apps.folder" => "Folder",
        m if m.starts_with("application/vnd.google-apps") => "Google File",
        "" => "Unknown",
        m => m,
    }
}

pub fn parse_files(payload: &Value) -> Vec<ToolItem> {
    let Some(rows) = payload.get("files").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            let field = |key: &str| row.get(key).and_then(Value::as_str).unwrap_or_default().trim();
            let id = field("id");
            let name = Some(field("name")).filter(|n| !n.is_empty()).unwrap_or("Untitled");
            let url = match field("webViewLink") {
                "" if id.is_empty() => "https://drive.google.com/drive/my-drive".to_string(),
                "" => format!("https://drive.google.com/file/d/{id}/view"),
                link => link.to_string(),
            };

            let mut parts = vec![format!("Type: {}", friendly_type(field("mimeType")))];
            if let Some(owner) = row.pointer("/owners/0/displayName").and_then(Value::as_str) {
                parts.push(format!("Owner: {owner}"));
            }
            if !field("modifiedTime").is_empty() {
                parts.push(format!("Updated: {}", field("modifiedTime")));
            }
            ToolItem::new(name, url, parts.join(" | "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drive_query_escapes_quotes() {
        assert_eq!(drive_query(None), "trashed = false");
        assert_eq!(
            drive_query(Some("Bob's plan")),
            "trashed = false and (name contains 'Bob\\'s plan' or fullText contains 'Bob\\'s plan')"
        );
    }

    #[test]
    fn test_parse_files() {
        let payload = json!({"files": [
            {"id": "f1", "name": "Roadmap", "mimeType": "application/vnd.google-apps.document",
             "webViewLink": "https://docs.google.com/document/d/f1", "owners": [{"displayName": "Kim"}],
             "modifiedTime": "2026-10-01T10:00:00Z"},
            {"id": "f2", "mimeType": "application/pdf"}
        ]});
        let items = parse_files(&payload);
        assert_eq!(items[0].snippet, "Type: Google Doc | Owner: Kim | Updated: 2026-10-01T10:00:00Z");
        assert_eq!(items[1].title, "Untitled");
        assert_eq!(items[1].url, "https://drive.google.com/file/d/f2/view");
        assert_eq!(items[1].snippet, "Type: application/pdf");
    }
}
