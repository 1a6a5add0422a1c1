//! Request and response documents exchanged with callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::listing::{EntryProjection, GroupProjection, Projection};
use crate::query::TargetKind;
use credvault_common::{Error, Secret};

/// State the caller wants the target to end up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedState {
    Create,
    Touch,
    Find,
    Delete,
}

/// Filter fields of a request. Absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestFilters {
    /// Entry title; ignored for groups, which use `group_name`.
    pub title_or_name: Option<String>,
    pub notes: Option<String>,
    pub identifier: Option<String>,
    pub path: Option<String>,
    pub url: Option<String>,
    /// Tags separated by `,` or `;`.
    pub tags: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One request against one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub path: PathBuf,
    #[serde(default, skip_serializing)]
    pub passphrase: Secret,
    #[serde(default)]
    pub target: Option<TargetKind>,
    #[serde(default)]
    pub state: Option<RequestedState>,
    #[serde(default)]
    pub filters: RequestFilters,
    /// Report only the first match.
    #[serde(default = "default_true")]
    pub first: bool,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub secret: Option<Secret>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Create the entry's group when it does not exist.
    #[serde(default)]
    pub always_create: bool,
    #[serde(default = "default_true")]
    pub list_groups: bool,
    #[serde(default = "default_true")]
    pub list_entries: bool,
    #[serde(default)]
    pub hide_secret: bool,
    /// Run everything except the final save.
    #[serde(default)]
    pub dry_run: bool,
}

impl Request {
    /// Listing-only request with default flags.
    pub fn new(path: impl Into<PathBuf>, passphrase: Secret) -> Self {
        Self {
            path: path.into(),
            passphrase,
            target: None,
            state: None,
            filters: RequestFilters::default(),
            first: true,
            recursive: true,
            regex: false,
            group_name: None,
            username: None,
            secret: None,
            icon: None,
            expires_at: None,
            always_create: false,
            list_groups: true,
            list_entries: true,
            hide_secret: false,
            dry_run: false,
        }
    }
}

/// Nodes reported by find or touch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Found {
    One(Projection),
    Many(Vec<Projection>),
}

impl Found {
    /// Number of reported nodes.
    pub fn len(&self) -> usize {
        match self {
            Found::One(_) => 1,
            Found::Many(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Report returned for every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Response {
    pub changed: bool,
    pub groups: Vec<GroupProjection>,
    pub entries: Vec<EntryProjection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub find: Option<Found>,
}

/// A request that ended in an error.
///
/// Carries whatever listings were built before the error. Nothing was
/// saved, so `changed` is always false.
#[derive(Debug)]
pub struct Failure {
    pub error: Error,
    pub response: Response,
}

impl Failure {
    pub fn new(error: Error, mut response: Response) -> Self {
        response.changed = false;
        Self { error, response }
    }

    /// JSON report: the partial response plus `failed`, `msg` and `kind`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = match serde_json::to_value(&self.response) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        map.insert("failed".to_string(), serde_json::Value::Bool(true));
        map.insert("msg".to_string(), serde_json::Value::String(self.error.to_string()));
        map.insert(
            "kind".to_string(),
            serde_json::Value::String(self.error.kind().to_string()),
        );
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
