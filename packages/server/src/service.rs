//! Tool handlers on top of the session registry.
//!
//! Each tool decodes its arguments, resolves the session and calls one
//! [`Session`] operation. Failures never escape as protocol errors: they
//! become a [`ToolResult`] with `isError` set.

use std::sync::Arc;

use azubiheft_scraper::{AzubiheftError, Session};
use azubiheft_scraper_models::Credentials;
use azubiheft_server_models::{
    AddSubjectParams, DeleteReportParams, DeleteSubjectParams, GetReportParams, LoginParams,
    SessionParams, ToolName, ToolResult, WeekIdParams, WriteReportParams,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::registry::{DEFAULT_HANDLE, RegistryError, SessionRegistry, SessionFactory};

/// Errors from tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A tool argument is missing or has the wrong type.
    #[error("Invalid arguments: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// The session could not be opened or resolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The scraping operation failed.
    #[error("Failed to {operation}: {source}")]
    Azubiheft {
        /// The operation that was attempted.
        operation: &'static str,
        /// Underlying error.
        #[source]
        source: AzubiheftError,
    },

    /// A result could not be rendered as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

trait Operation<T> {
    fn during(self, operation: &'static str) -> Result<T, ServiceError>;
}

impl<T> Operation<T> for Result<T, AzubiheftError> {
    fn during(self, operation: &'static str) -> Result<T, ServiceError> {
        self.map_err(|source| ServiceError::Azubiheft { operation, source })
    }
}

fn arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, ServiceError> {
    let arguments = if arguments.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| ServiceError::InvalidArgument {
        message: e.to_string(),
    })
}

/// Executes tools against the sessions of one registry.
#[derive(Debug)]
pub struct AzubiheftService {
    registry: SessionRegistry,
}

impl AzubiheftService {
    /// Creates a service with an empty registry.
    #[must_use]
    pub fn new(factory: impl SessionFactory + 'static) -> Self {
        Self {
            registry: SessionRegistry::new(factory),
        }
    }

    /// The underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Logs in with `credentials` and registers the result as the default
    /// session.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the login fails.
    pub async fn login_default(&self, credentials: &Credentials) -> Result<(), RegistryError> {
        self.registry
            .create_with_handle(DEFAULT_HANDLE, credentials)
            .await
    }

    /// Runs `tool` and renders the outcome as a tool result.
    pub async fn call(&self, tool: ToolName, arguments: Value) -> ToolResult {
        match self.execute(tool, arguments).await {
            Ok(text) => ToolResult::text(text),
            Err(e) => {
                log::warn!("{tool} failed: {e}");
                ToolResult::error(format!("Error: {e}"))
            }
        }
    }

    /// Runs `tool` and returns its success text.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the arguments are invalid, the session
    /// cannot be resolved or the operation fails.
    pub async fn execute(&self, tool: ToolName, args: Value) -> Result<String, ServiceError> {
        log::debug!("Executing {tool}");

        match tool {
            ToolName::Login => self.login(arguments(args)?).await,
            ToolName::Logout => self.logout(arguments(args)?).await,
            ToolName::IsLoggedIn => self.is_logged_in(arguments(args)?).await,
            ToolName::GetSubjects => self.subjects(arguments(args)?).await,
            ToolName::AddSubject => self.add_subject(arguments(args)?).await,
            ToolName::DeleteSubject => self.delete_subject(arguments(args)?).await,
            ToolName::GetReport => self.report(arguments(args)?).await,
            ToolName::WriteReport => self.write_report(arguments(args)?).await,
            ToolName::DeleteReport => self.delete_report(arguments(args)?).await,
            ToolName::GetWeekId => self.week_id(arguments(args)?).await,
        }
    }

    fn session(&self, handle: Option<&str>) -> Result<Arc<Session>, ServiceError> {
        Ok(self.registry.resolve(handle)?)
    }

    async fn login(&self, params: LoginParams) -> Result<String, ServiceError> {
        let handle = self
            .registry
            .create(&Credentials::new(params.username, params.password))
            .await?;
        Ok(format!("Login successful. Session ID: {handle}"))
    }

    async fn logout(&self, params: SessionParams) -> Result<String, ServiceError> {
        let handle = params
            .session_id
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HANDLE.to_string());
        let session = self.session(Some(&handle))?;

        session.logout().await.during("log out")?;
        self.registry.remove(&handle);
        Ok("Logout successful".to_string())
    }

    async fn is_logged_in(&self, params: SessionParams) -> Result<String, ServiceError> {
        let session = self.session(params.session_id.as_deref())?;
        Ok(format!("Logged in: {}", session.is_logged_in().await))
    }

    async fn subjects(&self, params: SessionParams) -> Result<String, ServiceError> {
        let session = self.session(params.session_id.as_deref())?;
        let subjects = session.subjects().await.during("get subjects")?;
        Ok(serde_json::to_string_pretty(&subjects)?)
    }

    async fn add_subject(&self, params: AddSubjectParams) -> Result<String, ServiceError> {
        let session = self.session(params.session_id.as_deref())?;
        session
            .add_subject(&params.subject_name)
            .await
            .during("add subject")?;
        Ok(format!(
            "Subject '{}' added successfully",
            params.subject_name.trim()
        ))
    }

    async fn delete_subject(&self, params: DeleteSubjectParams) -> Result<String, ServiceError> {
        let session = self.session(params.session_id.as_deref())?;
        session
            .delete_subject(&params.subject_id)
            .await
            .during("delete subject")?;
        Ok(format!(
            "Subject with ID '{}' deleted successfully",
            params.subject_id
        ))
    }

    async fn report(&self, params: GetReportParams) -> Result<String, ServiceError> {
        let session = self.session(params.session_id.as_deref())?;
        let entries = session
            .report(params.date, params.include_formatting)
            .await
            .during("get report")?;
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    async fn write_report(&self, params: WriteReportParams) -> Result<String, ServiceError> {
        let session = self.session(params.session_id.as_deref())?;
        session
            .write_report(
                params.date,
                &params.message,
                &params.time_spent,
                params.entry_type,
            )
            .await
            .during("write report")?;
        Ok(format!("Report for {} written successfully", params.date))
    }

    async fn delete_report(&self, params: DeleteReportParams) -> Result<String, ServiceError> {
        let session = self.session(params.session_id.as_deref())?;
        let deleted = session
            .delete_report(params.date, params.entry_number)
            .await
            .during("delete report")?;
        if deleted == 0 {
            return Ok(format!("No reports found for {}", params.date));
        }
        Ok(format!("Report(s) for {} deleted successfully", params.date))
    }

    async fn week_id(&self, params: WeekIdParams) -> Result<String, ServiceError> {
        let session = self.session(params.session_id.as_deref())?;
        let week_id = session
            .report_week_id(params.date)
            .await
            .during("get week ID")?;
        Ok(format!("Week ID for {}: {week_id}", params.date))
    }
}

#[cfg(test)]
mod tests {
    use azubiheft_scraper::fake::FakeAzubiheft;
    use azubiheft_scraper_models::ReportEntry;
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    fn service(server: &FakeAzubiheft) -> AzubiheftService {
        let server = server.clone();
        AzubiheftService::new(move || Ok(server.session().0))
    }

    fn server() -> FakeAzubiheft {
        FakeAzubiheft::new()
            .with_user("azubi", "geheim")
            .with_week(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(), "4711")
    }

    async fn login(service: &AzubiheftService) -> String {
        let text = service
            .execute(
                ToolName::Login,
                json!({ "username": "azubi", "password": "geheim" }),
            )
            .await
            .unwrap();
        text.strip_prefix("Login successful. Session ID: ")
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn login_returns_resolvable_handle() {
        let service = service(&server());
        let handle = login(&service).await;

        let text = service
            .execute(ToolName::IsLoggedIn, json!({ "session_id": handle }))
            .await
            .unwrap();
        assert_eq!(text, "Logged in: true");
    }

    #[tokio::test]
    async fn missing_argument_is_invalid_argument() {
        let service = service(&server());

        let err = service
            .execute(ToolName::Login, json!({ "username": "azubi" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument { .. }));

        let err = service
            .execute(ToolName::GetReport, json!({ "date": "gestern" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn unknown_session_is_error_result() {
        let service = service(&server());

        let result = service
            .call(ToolName::GetSubjects, json!({ "session_id": "nope" }))
            .await;
        assert!(result.is_error);
        assert!(result.joined_text().contains("Invalid session ID 'nope'"));
    }

    #[tokio::test]
    async fn default_session_serves_calls_without_handle() {
        let service = service(&server());
        service
            .login_default(&Credentials::new("azubi", "geheim"))
            .await
            .unwrap();

        let text = service
            .execute(ToolName::IsLoggedIn, Value::Null)
            .await
            .unwrap();
        assert_eq!(text, "Logged in: true");
    }

    #[tokio::test]
    async fn write_read_delete_through_tools() {
        let service = service(&server());
        let handle = login(&service).await;

        let text = service
            .execute(
                ToolName::WriteReport,
                json!({
                    "session_id": handle,
                    "date": "2026-10-14",
                    "message": "hello\nworld",
                    "time_spent": "01:30",
                    "entry_type": 2
                }),
            )
            .await
            .unwrap();
        assert_eq!(text, "Report for 2026-10-14 written successfully");

        let text = service
            .execute(
                ToolName::GetReport,
                json!({ "session_id": handle, "date": "2026-10-14" }),
            )
            .await
            .unwrap();
        let entries: Vec<ReportEntry> = serde_json::from_str(&text).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, "Schule");
        assert_eq!(entries[0].text, "hello\nworld");

        let text = service
            .execute(
                ToolName::DeleteReport,
                json!({ "session_id": handle, "date": "2026-10-14", "entry_number": 1 }),
            )
            .await
            .unwrap();
        assert_eq!(text, "Report(s) for 2026-10-14 deleted successfully");
    }

    #[tokio::test]
    async fn invalid_entry_number_is_reported_as_failure() {
        let server = server().with_entry(
            "azubi",
            NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
            1,
            "1",
            "02:00",
            "eins",
        );
        let service = service(&server);
        let handle = login(&service).await;

        let err = service
            .execute(
                ToolName::DeleteReport,
                json!({ "session_id": handle, "date": "2026-10-14", "entry_number": 2 }),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Azubiheft {
                operation: "delete report",
                source: AzubiheftError::Validation { .. }
            }
        ));
    }

    #[tokio::test]
    async fn logout_drops_handle() {
        let service = service(&server());
        let handle = login(&service).await;

        let text = service
            .execute(ToolName::Logout, json!({ "session_id": handle }))
            .await
            .unwrap();
        assert_eq!(text, "Logout successful");
        assert!(service.registry().is_empty());

        let err = service
            .execute(ToolName::IsLoggedIn, json!({ "session_id": handle }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Registry(RegistryError::InvalidHandle { .. })
        ));
    }

    #[tokio::test]
    async fn subjects_and_week_id_render_text() {
        let service = service(&server());
        let handle = login(&service).await;

        service
            .execute(
                ToolName::AddSubject,
                json!({ "session_id": handle, "subject_name": " Projektarbeit " }),
            )
            .await
            .unwrap();

        let text = service
            .execute(ToolName::GetSubjects, json!({ "session_id": handle }))
            .await
            .unwrap();
        let subjects: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(subjects[0], json!({ "id": "1", "name": "Betrieb" }));
        assert_eq!(subjects[7]["name"], "Projektarbeit");

        let text = service
            .execute(
                ToolName::GetWeekId,
                json!({ "session_id": handle, "date": "2026-10-16" }),
            )
            .await
            .unwrap();
        assert_eq!(text, "Week ID for 2026-10-16: 4711");
    }
}
