//! Filter resolution over the vault tree.
//!
//! A [`Query`] names a search root, a set of optional filters and the
//! regex/recursive flags. Running it walks the candidates in pre-order,
//! depth first, and keeps those matching every filter that is present.
//!
//! # Matching
//! - Exact mode compares strings for case-sensitive equality. Paths are
//!   normalized first (`a/b`, `/a/b` and `/a/b/` are the same path),
//!   identifiers compare as UUIDs in any formatting (a value that is not a
//!   UUID matches nothing), and tags compare as sets.
//! - Regex mode compiles each filter as a pattern and accepts a candidate
//!   when the pattern matches anywhere in the attribute (unanchored). Use
//!   `^...$` for a full match. Paths match against their `/a/b` rendering
//!   and tags against the entry's tags joined with `;`.
//! - A filter on an attribute the candidate does not have (no notes, or a
//!   url filter on a group) never matches.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;

use crate::tree::{split_tags, Entry, Group, Vault};
use credvault_common::{Error, Identifier, NodePath, Result};

/// Kind of node a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Group,
    Entry,
}

/// How many matches a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Only the first match in traversal order; no match is an error.
    First,
    /// Every match in traversal order, possibly none.
    All,
}

impl Selection {
    pub fn from_first(first: bool) -> Self {
        if first {
            Selection::First
        } else {
            Selection::All
        }
    }
}

/// A resolved node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Group(Identifier),
    Entry(Identifier),
}

impl NodeRef {
    pub fn id(&self) -> Identifier {
        match self {
            NodeRef::Group(id) | NodeRef::Entry(id) => *id,
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            NodeRef::Group(_) => TargetKind::Group,
            NodeRef::Entry(_) => TargetKind::Entry,
        }
    }
}

/// Optional filter values. `None` fields do not constrain the match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Group name or entry title.
    pub name: Option<String>,
    pub notes: Option<String>,
    pub identifier: Option<String>,
    pub path: Option<String>,
    pub url: Option<String>,
    pub tags: Option<String>,
}

impl Filters {
    /// Filter on name/title only.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Check whether no filter is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.notes.is_none()
            && self.identifier.is_none()
            && self.path.is_none()
            && self.url.is_none()
            && self.tags.is_none()
    }

    fn fields(&self) -> impl Iterator<Item = (Field, &str)> {
        [
            (Field::Name, &self.name),
            (Field::Notes, &self.notes),
            (Field::Identifier, &self.identifier),
            (Field::Path, &self.path),
            (Field::Url, &self.url),
            (Field::Tags, &self.tags),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|v| (field, v)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Notes,
    Identifier,
    Path,
    Url,
    Tags,
}

#[derive(Debug)]
enum Pattern {
    Exact(String),
    Regex(Regex),
}

#[derive(Debug)]
struct Check {
    field: Field,
    pattern: Pattern,
}

/// Filters compiled once per query run.
#[derive(Debug)]
struct Matcher {
    checks: Vec<Check>,
}

impl Matcher {
    fn compile(filters: &Filters, regex: bool) -> Result<Self> {
        let mut checks = Vec::new();
        for (field, raw) in filters.fields() {
            let pattern = if regex {
                let compiled = Regex::new(raw).map_err(|e| {
                    Error::Validation(format!("Invalid pattern '{}': {}", raw, e))
                })?;
                Pattern::Regex(compiled)
            } else {
                Pattern::Exact(canonical_filter(field, raw))
            };
            checks.push(Check { field, pattern });
        }
        Ok(Self { checks })
    }

    fn accepts<'v, F>(&self, value_of: F) -> Result<bool>
    where
        F: Fn(Field, bool) -> Result<Option<Cow<'v, str>>>,
    {
        for check in &self.checks {
            let canonical = matches!(check.pattern, Pattern::Exact(_));
            let value = value_of(check.field, canonical)?;
            let hit = match (&check.pattern, value) {
                (_, None) => false,
                (Pattern::Exact(expected), Some(actual)) => expected.as_str() == actual.as_ref(),
                (Pattern::Regex(re), Some(actual)) => re.is_match(&actual),
            };
            if !hit {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn accepts_group(&self, vault: &Vault, group: &Group) -> Result<bool> {
        self.accepts(|field, _| {
            Ok(match field {
                Field::Name => Some(Cow::Borrowed(group.name.as_str())),
                Field::Notes => group.notes.as_deref().map(Cow::Borrowed),
                Field::Identifier => Some(Cow::Owned(group.id.to_string())),
                Field::Path => Some(Cow::Owned(vault.group_path(group.id)?.to_string_path())),
                Field::Url | Field::Tags => None,
            })
        })
    }

    fn accepts_entry(&self, vault: &Vault, entry: &Entry) -> Result<bool> {
        self.accepts(|field, canonical| {
            Ok(match field {
                Field::Name => Some(Cow::Borrowed(entry.title.as_str())),
                Field::Notes => entry.notes.as_deref().map(Cow::Borrowed),
                Field::Identifier => Some(Cow::Owned(entry.id.to_string())),
                Field::Path => Some(Cow::Owned(vault.entry_path(entry.id)?.to_string_path())),
                Field::Url => entry.url.as_deref().map(Cow::Borrowed),
                Field::Tags if canonical => Some(Cow::Owned(canonical_tags(entry.tags.iter()))),
                Field::Tags => Some(Cow::Owned(entry.tags.join(";"))),
            })
        })
    }
}

/// Normalize an exact-mode filter value to the form attributes are compared in.
/// An identifier that is not a UUID is kept as typed, so it matches nothing.
fn canonical_filter(field: Field, raw: &str) -> String {
    match field {
        Field::Identifier => Identifier::parse(raw)
            .map(|id| id.to_string())
            .unwrap_or_else(|_| raw.to_string()),
        Field::Path => NodePath::parse(raw).to_string_path(),
        Field::Tags => canonical_tags(split_tags(raw).iter()),
        Field::Name | Field::Notes | Field::Url => raw.to_string(),
    }
}

fn canonical_tags<'a>(tags: impl Iterator<Item = &'a String>) -> String {
    let set: BTreeSet<&str> = tags.map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
    set.into_iter().collect::<Vec<_>>().join(";")
}

/// A filter query over groups or entries.
#[derive(Debug, Clone)]
pub struct Query {
    /// Group to search under; the vault root when `None`.
    pub search_root: Option<Identifier>,
    pub filters: Filters,
    pub regex: bool,
    /// Search the whole subtree instead of direct children only.
    pub recursive: bool,
}

impl Query {
    /// Recursive, exact-match query from the vault root.
    pub fn new(filters: Filters) -> Self {
        Self {
            search_root: None,
            filters,
            regex: false,
            recursive: true,
        }
    }

    pub fn within(mut self, root: Identifier) -> Self {
        self.search_root = Some(root);
        self
    }

    pub fn regex(mut self, regex: bool) -> Self {
        self.regex = regex;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    fn root(&self, vault: &Vault) -> Identifier {
        self.search_root.unwrap_or_else(|| vault.root_id())
    }

    /// Matching groups in pre-order. The search root itself is never a candidate.
    fn scan_groups(&self, vault: &Vault, limit: Option<usize>) -> Result<Vec<Identifier>> {
        let matcher = Matcher::compile(&self.filters, self.regex)?;
        let root = self.root(vault);
        let candidates = if self.recursive {
            let mut all = vault.walk_groups(root)?;
            all.remove(0);
            all
        } else {
            vault.child_groups(root)?
        };

        let mut found = Vec::new();
        for group in candidates {
            if limit.is_some_and(|n| found.len() >= n) {
                break;
            }
            if matcher.accepts_group(vault, group)? {
                found.push(group.id);
            }
        }
        Ok(found)
    }

    /// Matching entries in pre-order of their groups, then insertion order.
    fn scan_entries(&self, vault: &Vault, limit: Option<usize>) -> Result<Vec<Identifier>> {
        let matcher = Matcher::compile(&self.filters, self.regex)?;
        let root = self.root(vault);
        let candidates = if self.recursive {
            vault.subtree_entries(root)?
        } else {
            vault.group_entries(root)?
        };

        let mut found = Vec::new();
        for entry in candidates {
            if limit.is_some_and(|n| found.len() >= n) {
                break;
            }
            if matcher.accepts_entry(vault, entry)? {
                found.push(entry.id);
            }
        }
        Ok(found)
    }

    /// Every matching group.
    pub fn all_groups(&self, vault: &Vault) -> Result<Vec<Identifier>> {
        self.scan_groups(vault, None)
    }

    /// Every matching entry.
    pub fn all_entries(&self, vault: &Vault) -> Result<Vec<Identifier>> {
        self.scan_entries(vault, None)
    }

    /// The first matching group in pre-order.
    ///
    /// # Errors
    /// - `NotFound` when nothing matches
    pub fn first_group(&self, vault: &Vault) -> Result<Identifier> {
        self.scan_groups(vault, Some(1))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("No group matches {}", self.describe())))
    }

    /// The first matching entry in pre-order.
    ///
    /// # Errors
    /// - `NotFound` when nothing matches
    pub fn first_entry(&self, vault: &Vault) -> Result<Identifier> {
        self.scan_entries(vault, Some(1))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("No entry matches {}", self.describe())))
    }

    /// Resolve nodes of `kind` with the given selection mode.
    ///
    /// `First` yields exactly one node or `NotFound`; `All` may be empty.
    pub fn select(&self, vault: &Vault, kind: TargetKind, selection: Selection) -> Result<Vec<NodeRef>> {
        Ok(match (kind, selection) {
            (TargetKind::Group, Selection::First) => vec![NodeRef::Group(self.first_group(vault)?)],
            (TargetKind::Entry, Selection::First) => vec![NodeRef::Entry(self.first_entry(vault)?)],
            (TargetKind::Group, Selection::All) => {
                self.all_groups(vault)?.into_iter().map(NodeRef::Group).collect()
            }
            (TargetKind::Entry, Selection::All) => {
                self.all_entries(vault)?.into_iter().map(NodeRef::Entry).collect()
            }
        })
    }

    /// Human-readable summary of the filters, for error messages.
    fn describe(&self) -> String {
        let parts: Vec<String> = self
            .filters
            .fields()
            .map(|(field, value)| format!("{}={:?}", format!("{:?}", field).to_lowercase(), value))
            .collect();
        if parts.is_empty() {
            "(no filters)".to_string()
        } else {
            parts.join(", ")
        }
    }
}
