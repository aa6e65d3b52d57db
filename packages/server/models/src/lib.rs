#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Wire types for the Azubiheft tool server.
//!
//! The server speaks JSON-RPC 2.0, one message per line, using the
//! tool-calling conventions of the Model Context Protocol (`initialize`,
//! `tools/list`, `tools/call`). These types are separate from the scraper's
//! domain types so the protocol can evolve independently.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision announced in the `initialize` response.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;
/// The JSON is not a valid request object.
pub const INVALID_REQUEST: i32 = -32600;
/// The method (or tool) does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// The server failed to produce a response.
pub const INTERNAL_ERROR: i32 = -32603;

/// An incoming request or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Whether this is a notification (no response expected).
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// One of the `*_ERROR`/`*_NOT_FOUND`/`INVALID_*` codes.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

/// A response carrying either a result or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request this answers; `null` if it could not be read.
    pub id: Value,
    /// Successful result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Name and version of the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// Marker object announcing tool support.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsCapability {}

/// Capabilities announced in the `initialize` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tool support.
    pub tools: ToolsCapability,
}

/// Result of `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision.
    pub protocol_version: String,
    /// Supported capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identity.
    pub server_info: ServerInfo,
}

/// Description of one callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub input_schema: Value,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolList {
    /// All available tools.
    pub tools: Vec<ToolDefinition>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Tool to invoke.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Value,
}

/// One content block of a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

/// Result of `tools/call`.
///
/// Tool failures are reported here with `is_error` set, not as JSON-RPC
/// errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Result content.
    pub content: Vec<ContentItem>,
    /// Whether the tool failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result with a single text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// A failed result with a single text block.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Concatenated text of all content blocks.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|ContentItem::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Every tool the server exposes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display, EnumIter,
)]
pub enum ToolName {
    /// Log in and register a new session.
    #[strum(serialize = "azubiheft_login")]
    Login,
    /// Log out and drop a session.
    #[strum(serialize = "azubiheft_logout")]
    Logout,
    /// Check whether a session is still logged in.
    #[strum(serialize = "azubiheft_is_logged_in")]
    IsLoggedIn,
    /// List built-in and custom subjects.
    #[strum(serialize = "azubiheft_get_subjects")]
    GetSubjects,
    /// Add a custom subject.
    #[strum(serialize = "azubiheft_add_subject")]
    AddSubject,
    /// Delete a custom subject.
    #[strum(serialize = "azubiheft_delete_subject")]
    DeleteSubject,
    /// Read the entries of one day.
    #[strum(serialize = "azubiheft_get_report")]
    GetReport,
    /// Write one entry.
    #[strum(serialize = "azubiheft_write_report")]
    WriteReport,
    /// Delete one or all entries of a day.
    #[strum(serialize = "azubiheft_delete_report")]
    DeleteReport,
    /// Look up the report id of a week.
    #[strum(serialize = "azubiheft_get_week_id")]
    GetWeekId,
}

/// Arguments of `azubiheft_login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginParams {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// Arguments of tools that only need a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Session handle; the default session if omitted.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Arguments of `azubiheft_add_subject`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSubjectParams {
    /// Session handle; the default session if omitted.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Name of the new subject.
    pub subject_name: String,
}

/// Arguments of `azubiheft_delete_subject`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSubjectParams {
    /// Session handle; the default session if omitted.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Id of the subject to delete.
    pub subject_id: String,
}

/// Arguments of `azubiheft_get_report`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReportParams {
    /// Session handle; the default session if omitted.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Day to read (`YYYY-MM-DD`).
    pub date: NaiveDate,
    /// Keep the entry markup instead of plain text.
    #[serde(default)]
    pub include_formatting: bool,
}

/// Arguments of `azubiheft_write_report`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReportParams {
    /// Session handle; the default session if omitted.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Day to write (`YYYY-MM-DD`).
    pub date: NaiveDate,
    /// Entry text; lines separated by `\n`.
    pub message: String,
    /// Duration as `HH:MM`.
    pub time_spent: String,
    /// Subject id the entry is filed under.
    pub entry_type: u64,
}

/// Arguments of `azubiheft_delete_report`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReportParams {
    /// Session handle; the default session if omitted.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Day to delete from (`YYYY-MM-DD`).
    pub date: NaiveDate,
    /// 1-based entry to delete; all entries if omitted.
    #[serde(default)]
    pub entry_number: Option<usize>,
}

/// Arguments of `azubiheft_get_week_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekIdParams {
    /// Session handle; the default session if omitted.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Any day of the week (`YYYY-MM-DD`).
    pub date: NaiveDate,
}

fn schema(properties: &Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

const SESSION_ID_DESCRIPTION: &str =
    "Session ID returned by azubiheft_login (uses the default session if omitted)";
const DATE_DESCRIPTION: &str = "Date in YYYY-MM-DD format";

impl ToolName {
    /// What the tool does, as shown to the client.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Login => "Log in to Azubiheft and return a session ID for later calls",
            Self::Logout => "Log out of Azubiheft and discard the session",
            Self::IsLoggedIn => "Check whether a session is still logged in",
            Self::GetSubjects => "List all subjects (built-in and custom) as JSON",
            Self::AddSubject => "Add a custom subject",
            Self::DeleteSubject => "Delete a custom subject by its ID",
            Self::GetReport => "Read all report entries of a day as JSON",
            Self::WriteReport => "Write a report entry for a day",
            Self::DeleteReport => "Delete one report entry of a day, or all of them",
            Self::GetWeekId => "Look up the internal report ID of the week containing a date",
        }
    }

    /// JSON Schema of the tool's arguments.
    #[must_use]
    pub fn input_schema(self) -> Value {
        let session = serde_json::json!({ "type": "string", "description": SESSION_ID_DESCRIPTION });
        let date = serde_json::json!({ "type": "string", "description": DATE_DESCRIPTION });

        match self {
            Self::Login => schema(
                &serde_json::json!({
                    "username": { "type": "string", "description": "Azubiheft username" },
                    "password": { "type": "string", "description": "Azubiheft password" }
                }),
                &["username", "password"],
            ),
            Self::Logout | Self::IsLoggedIn | Self::GetSubjects => {
                schema(&serde_json::json!({ "session_id": session }), &[])
            }
            Self::AddSubject => schema(
                &serde_json::json!({
                    "session_id": session,
                    "subject_name": { "type": "string", "description": "Name of the new subject" }
                }),
                &["subject_name"],
            ),
            Self::DeleteSubject => schema(
                &serde_json::json!({
                    "session_id": session,
                    "subject_id": { "type": "string", "description": "ID of the subject to delete" }
                }),
                &["subject_id"],
            ),
            Self::GetReport => schema(
                &serde_json::json!({
                    "session_id": session,
                    "date": date,
                    "include_formatting": { "type": "boolean", "description": "Keep HTML formatting (default false)" }
                }),
                &["date"],
            ),
            Self::WriteReport => schema(
                &serde_json::json!({
                    "session_id": session,
                    "date": date,
                    "message": { "type": "string", "description": "Entry text; lines separated by \\n" },
                    "time_spent": { "type": "string", "description": "Duration in HH:MM format" },
                    "entry_type": { "type": "number", "description": "Subject ID (1 Betrieb, 2 Schule, 3 ÜBA, 4 Urlaub, 5 Feiertag, 6 Arbeitsunfähig, 7 Frei, or a custom ID)" }
                }),
                &["date", "message", "time_spent", "entry_type"],
            ),
            Self::DeleteReport => schema(
                &serde_json::json!({
                    "session_id": session,
                    "date": date,
                    "entry_number": { "type": "number", "description": "1-based entry to delete (all entries if omitted)" }
                }),
                &["date"],
            ),
            Self::GetWeekId => schema(
                &serde_json::json!({ "session_id": session, "date": date }),
                &["date"],
            ),
        }
    }

    /// Full definition as returned by `tools/list`.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Returns the definitions of all tools, in catalogue order.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    use strum::IntoEnumIterator as _;

    ToolName::iter().map(ToolName::definition).collect()
}
