//! Idempotent touch and query-then-remove delete.
//!
//! Every operation returns an [`Outcome`] value instead of writing into a
//! shared result. Nothing here persists anything; the caller decides
//! whether the mutated tree is saved or discarded.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::query::{Filters, NodeRef, Query, TargetKind};
use crate::tree::{NewEntry, NewGroup, Vault};
use credvault_common::{Error, Identifier, Result, Secret};

/// Result of a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Whether the tree was modified.
    pub changed: bool,
    /// Nodes created (touch) or removed (delete), in the order it happened.
    pub nodes: Vec<NodeRef>,
}

impl Outcome {
    pub fn unchanged() -> Self {
        Self::default()
    }

    fn record(&mut self, node: NodeRef) {
        self.changed = true;
        self.nodes.push(node);
    }
}

/// Optional attributes for a group created by touch.
#[derive(Debug, Clone, Default)]
pub struct GroupAttributes {
    pub notes: Option<String>,
    pub identifier: Option<Identifier>,
}

/// How touch-entry finds the group the entry goes in.
#[derive(Debug, Clone, Default)]
pub struct GroupTarget {
    /// Group name; the vault root when `None`.
    pub name: Option<String>,
    pub regex: bool,
    pub recursive: bool,
    /// Create the group under the root when it does not resolve.
    pub always_create: bool,
}

/// Entry fields as supplied by a request. Title, username and secret are
/// mandatory; everything else falls back to empty.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub title: Option<String>,
    pub username: Option<String>,
    pub secret: Option<Secret>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub icon: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub identifier: Option<Identifier>,
}

impl EntryDraft {
    /// Check mandatory fields and turn the draft into entry attributes.
    ///
    /// # Errors
    /// - `Validation` naming every missing mandatory field
    pub fn validate(self) -> Result<NewEntry> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push("title");
        }
        if self.username.is_none() {
            missing.push("username");
        }
        if self.secret.is_none() {
            missing.push("secret");
        }

        match (self.title, self.username, self.secret) {
            (Some(title), Some(username), Some(secret)) => Ok(NewEntry {
                title,
                username,
                secret,
                url: self.url,
                notes: self.notes,
                tags: self.tags,
                icon: self.icon,
                expires_at: self.expires_at,
                identifier: self.identifier,
            }),
            _ => Err(Error::Validation(format!(
                "Touching an entry requires {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Group names become path segments, so they may not contain `/`.
fn check_group_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("Group name cannot be empty".to_string()));
    }
    if name.contains('/') {
        return Err(Error::Validation(format!(
            "Group name '{}' cannot contain '/'",
            name
        )));
    }
    Ok(())
}

/// Ensure a group called `name` exists under `search_root`.
///
/// An existing group with that exact name among the search root's children
/// (or its whole subtree when `recursive`) makes this a no-op. Otherwise a
/// new group is attached directly under the search root.
///
/// # Errors
/// - `Validation` if `name` is empty or contains `/`, or the requested
///   identifier is taken
/// - `NotFound` if `search_root` is not a group of this vault
pub fn touch_group(
    vault: &mut Vault,
    search_root: Option<Identifier>,
    name: &str,
    attributes: GroupAttributes,
    recursive: bool,
) -> Result<Outcome> {
    check_group_name(name)?;

    let parent = search_root.unwrap_or_else(|| vault.root_id());
    let existing = Query::new(Filters::named(name))
        .within(parent)
        .recursive(recursive)
        .all_groups(vault)?;
    if !existing.is_empty() {
        debug!(group = name, "Group already present");
        return Ok(Outcome::unchanged());
    }

    let id = vault.add_group(
        parent,
        NewGroup {
            name: name.to_string(),
            notes: attributes.notes,
            identifier: attributes.identifier,
        },
    )?;
    info!(group = name, id = %id, "Group created");

    let mut outcome = Outcome::unchanged();
    outcome.record(NodeRef::Group(id));
    Ok(outcome)
}

/// Ensure an entry with the draft's title exists in the target group.
///
/// The draft is validated before anything is touched. An entry with the
/// same title directly in the target group makes the entry part a no-op;
/// its fields are not updated. When `always_create` brings a missing group
/// into existence, that group is reported even if the entry then exists.
///
/// # Errors
/// - `Validation` for a missing title, username or secret
/// - `NotFound` if the group does not resolve and `always_create` is unset
pub fn touch_entry(vault: &mut Vault, target: &GroupTarget, draft: EntryDraft) -> Result<Outcome> {
    let new_entry = draft.validate()?;
    let mut outcome = Outcome::unchanged();

    let group = match &target.name {
        None => vault.root_id(),
        Some(name) => {
            let query = Query::new(Filters::named(name.as_str()))
                .regex(target.regex)
                .recursive(target.recursive);
            match query.first_group(vault) {
                Ok(id) => id,
                Err(Error::NotFound(_)) if target.always_create => {
                    check_group_name(name)?;
                    let root = vault.root_id();
                    let id = vault.add_group(root, NewGroup::named(name.as_str()))?;
                    info!(group = %name, id = %id, "Group created for entry");
                    outcome.record(NodeRef::Group(id));
                    id
                }
                Err(Error::NotFound(_)) => {
                    return Err(Error::NotFound(format!("Group '{}' doesn't exist", name)));
                }
                Err(e) => return Err(e),
            }
        }
    };

    let exists = vault
        .group_entries(group)?
        .iter()
        .any(|e| e.title == new_entry.title);
    if exists {
        debug!(title = %new_entry.title, "Entry already present");
        return Ok(outcome);
    }

    let title = new_entry.title.clone();
    let id = vault.add_entry(group, new_entry)?;
    info!(title = %title, id = %id, "Entry created");
    outcome.record(NodeRef::Entry(id));
    Ok(outcome)
}

/// Remove the first node of `kind` matching `query`.
///
/// Removing a group removes its whole subtree. Either exactly one node
/// (with its subtree) is removed or the vault is left untouched.
///
/// # Errors
/// - `NotFound` when nothing matches
pub fn delete(vault: &mut Vault, query: &Query, kind: TargetKind) -> Result<Outcome> {
    let node = match kind {
        TargetKind::Group => NodeRef::Group(query.first_group(vault)?),
        TargetKind::Entry => NodeRef::Entry(query.first_entry(vault)?),
    };

    let detached = match node {
        NodeRef::Group(id) => vault.remove_group(id)?,
        NodeRef::Entry(id) => vault.remove_entry(id)?,
    };
    info!(
        path = %detached.path,
        groups = detached.groups,
        entries = detached.entries,
        "Subtree removed"
    );

    let mut outcome = Outcome::unchanged();
    outcome.record(node);
    Ok(outcome)
}
