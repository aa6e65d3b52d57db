#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Domain types for the Azubiheft apprenticeship report book.
//!
//! These are the values the scraping client reads from and writes to the
//! remote application: activity subjects, the per-week report identifier,
//! single report entries and login credentials.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Duration value the remote application uses for an empty report slot.
///
/// Entries with this duration are never written and never returned.
pub const EMPTY_DURATION: &str = "00:00";

/// The fixed activity subjects every report book has, regardless of what
/// the user configured.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum BuiltinSubject {
    /// Work at the training company.
    #[strum(serialize = "Betrieb")]
    Betrieb = 1,
    /// Vocational school.
    #[strum(serialize = "Schule")]
    Schule = 2,
    /// Inter-company training.
    #[strum(serialize = "ÜBA")]
    Uba = 3,
    /// Vacation.
    #[strum(serialize = "Urlaub")]
    Urlaub = 4,
    /// Public holiday.
    #[strum(serialize = "Feiertag")]
    Feiertag = 5,
    /// Sick / unable to work.
    #[strum(serialize = "Arbeitsunfähig")]
    Arbeitsunfaehig = 6,
    /// Day off.
    #[strum(serialize = "Frei")]
    Frei = 7,
}

impl BuiltinSubject {
    /// Returns the server-assigned numeric id of this subject.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Returns all built-in subjects as [`Subject`] values, in id order.
    #[must_use]
    pub fn all() -> Vec<Subject> {
        Self::iter().map(Subject::from).collect()
    }
}

impl From<BuiltinSubject> for Subject {
    fn from(value: BuiltinSubject) -> Self {
        Self {
            id: value.id().to_string(),
            name: value.to_string(),
        }
    }
}

/// An activity category a report entry can be filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// Server-assigned id for built-ins, timestamp-derived for custom ones.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Subject {
    /// Creates a subject from an id and a display name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Whether this is one of the seven fixed subjects.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        BuiltinSubject::iter().any(|b| b.id().to_string() == self.id)
    }
}

/// One row of a day's report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Server-assigned sequence number; the negated value deletes the entry.
    pub seq: String,
    /// Type label as displayed by the remote page (mirrors the subject name).
    #[serde(rename = "type")]
    pub entry_type: String,
    /// Duration in `HH:MM`.
    pub duration: String,
    /// Body text, either raw markup or plain text depending on the read mode.
    pub text: String,
}

/// Opaque identifier of one calendar week's report on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekId(String);

impl WeekId {
    /// Wraps a raw identifier as read from a week tile.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as it is sent back to the server.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Username/password pair used once to open a session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Password. Never logged.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
