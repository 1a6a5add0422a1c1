//! Outward-facing projections of groups and entries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::query::NodeRef;
use crate::tree::{Entry, Group, HistoryRecord, Vault};
use credvault_common::{Error, Identifier, Result, Secret};

/// Listing view of a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupProjection {
    pub name: String,
    pub path: String,
    pub notes: Option<String>,
    pub identifier: Identifier,
    /// Titles of the group's direct entries.
    pub entries: Vec<String>,
}

/// Listing view of a prior entry version. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryProjection {
    pub title: String,
    pub username: String,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub updated: DateTime<Utc>,
}

impl From<&HistoryRecord> for HistoryProjection {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            title: record.title.clone(),
            username: record.username.clone(),
            url: record.url.clone(),
            notes: record.notes.clone(),
            updated: record.updated,
        }
    }
}

/// Listing view of an entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryProjection {
    pub title: String,
    pub username: String,
    /// Absent from the serialized form when secrets are hidden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub expires: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub icon: Option<String>,
    pub history: Vec<HistoryProjection>,
    pub identifier: Identifier,
    /// Path of the owning group.
    pub parent_group: String,
}

/// Either kind of projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Projection {
    Group(GroupProjection),
    Entry(EntryProjection),
}

/// Which listings to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingOptions {
    pub groups: bool,
    pub entries: bool,
    pub hide_secret: bool,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            groups: true,
            entries: true,
            hide_secret: false,
        }
    }
}

/// Snapshot of the vault's contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub groups: Vec<GroupProjection>,
    pub entries: Vec<EntryProjection>,
}

impl Listing {
    /// Project every group below the root and every entry, in pre-order.
    ///
    /// The root group itself is not listed; entries held directly by the
    /// root report `/` as their parent group.
    pub fn build(vault: &Vault, options: &ListingOptions) -> Result<Self> {
        let walk = vault.walk_groups(vault.root_id())?;

        let groups = if options.groups {
            walk.iter()
                .filter(|g| !g.is_root())
                .map(|g| group_projection(vault, g))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let entries = if options.entries {
            let mut out = Vec::with_capacity(vault.entry_count());
            for group in &walk {
                let parent_group = vault.group_path(group.id)?.to_string_path();
                for entry in vault.group_entries(group.id)? {
                    out.push(entry_projection(entry, parent_group.clone(), options.hide_secret));
                }
            }
            out
        } else {
            Vec::new()
        };

        Ok(Self { groups, entries })
    }
}

fn group_projection(vault: &Vault, group: &Group) -> Result<GroupProjection> {
    Ok(GroupProjection {
        name: group.name.clone(),
        path: vault.group_path(group.id)?.to_string_path(),
        notes: group.notes.clone(),
        identifier: group.id,
        entries: vault
            .group_entries(group.id)?
            .iter()
            .map(|e| e.title.clone())
            .collect(),
    })
}

fn entry_projection(entry: &Entry, parent_group: String, hide_secret: bool) -> EntryProjection {
    EntryProjection {
        title: entry.title.clone(),
        username: entry.username.clone(),
        secret: (!hide_secret).then(|| entry.secret.clone()),
        url: entry.url.clone(),
        notes: entry.notes.clone(),
        tags: entry.tags.clone(),
        expires: entry.times.expires,
        expires_at: entry.times.expires_at,
        created: entry.times.created,
        updated: entry.times.updated,
        accessed: entry.times.accessed,
        icon: entry.icon.clone(),
        history: entry.history.iter().map(HistoryProjection::from).collect(),
        identifier: entry.id,
        parent_group,
    }
}

/// Project a single resolved node.
pub fn project(vault: &Vault, node: NodeRef, hide_secret: bool) -> Result<Projection> {
    match node {
        NodeRef::Group(id) => {
            let group = vault
                .group(id)
                .ok_or_else(|| Error::NotFound(format!("Group {} not found", id)))?;
            Ok(Projection::Group(group_projection(vault, group)?))
        }
        NodeRef::Entry(id) => {
            let entry = vault
                .entry(id)
                .ok_or_else(|| Error::NotFound(format!("Entry {} not found", id)))?;
            let parent_group = vault.group_path(entry.group())?.to_string_path();
            Ok(Projection::Entry(entry_projection(entry, parent_group, hide_secret)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NewEntry, NewGroup};

    fn sample() -> Vault {
        let mut vault = Vault::new();
        let root = vault.root_id();
        let email = vault.add_group(root, NewGroup::named("email")).unwrap();
        vault.add_group(email, NewGroup::named("work")).unwrap();
        vault
            .add_entry(
                email,
                NewEntry {
                    title: "gmail".to_string(),
                    username: "u".to_string(),
                    secret: Secret::new("p"),
                    tags: vec!["mail".to_string()],
                    ..NewEntry::default()
                },
            )
            .unwrap();
        vault
            .add_entry(
                root,
                NewEntry {
                    title: "router".to_string(),
                    username: "admin".to_string(),
                    secret: Secret::new("admin"),
                    ..NewEntry::default()
                },
            )
            .unwrap();
        vault
    }

    #[test]
    fn test_groups_listing_excludes_root() {
        let listing = Listing::build(&sample(), &ListingOptions::default()).unwrap();

        let paths: Vec<&str> = listing.groups.iter().map(|g| g.path.as_str()).collect();
        assert_eq!(paths, vec!["/email", "/email/work"]);
        assert_eq!(listing.groups[0].entries, vec!["gmail"]);
        assert!(listing.groups[1].entries.is_empty());
    }

    #[test]
    fn test_entries_listing_in_preorder_with_parent_path() {
        let listing = Listing::build(&sample(), &ListingOptions::default()).unwrap();

        let rows: Vec<(&str, &str)> = listing
            .entries
            .iter()
            .map(|e| (e.title.as_str(), e.parent_group.as_str()))
            .collect();
        assert_eq!(rows, vec![("router", "/"), ("gmail", "/email")]);
        assert_eq!(listing.entries[1].secret.as_ref().unwrap().expose(), "p");
    }

    #[test]
    fn test_hidden_secret_is_omitted_not_blanked() {
        let options = ListingOptions {
            hide_secret: true,
            ..ListingOptions::default()
        };
        let listing = Listing::build(&sample(), &options).unwrap();

        for entry in &listing.entries {
            let value = serde_json::to_value(entry).unwrap();
            assert!(value.get("secret").is_none());
            assert!(value.get("username").is_some());
        }
    }

    #[test]
    fn test_listings_can_be_disabled() {
        let options = ListingOptions {
            groups: false,
            entries: false,
            hide_secret: false,
        };
        let listing = Listing::build(&sample(), &options).unwrap();
        assert!(listing.groups.is_empty());
        assert!(listing.entries.is_empty());
    }

    #[test]
    fn test_project_single_node() {
        let vault = sample();
        let email = vault.child_groups(vault.root_id()).unwrap()[0].id;

        match project(&vault, NodeRef::Group(email), false).unwrap() {
            Projection::Group(g) => assert_eq!(g.name, "email"),
            other => panic!("unexpected projection: {other:?}"),
        }

        let gmail = vault.group_entries(email).unwrap()[0].id;
        match project(&vault, NodeRef::Entry(gmail), true).unwrap() {
            Projection::Entry(e) => {
                assert_eq!(e.parent_group, "/email");
                assert!(e.secret.is_none());
            }
            other => panic!("unexpected projection: {other:?}"),
        }
    }
}
