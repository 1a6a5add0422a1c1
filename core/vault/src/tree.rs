//! In-memory credential tree.
//!
//! The vault is a single-rooted tree of groups. Each group owns its child
//! groups and its entries; an entry points back at its group by identifier
//! only. Nodes live in identifier-keyed tables and every ownership edge is
//! an ordered list of identifiers on the owning group, so traversal order
//! is stable and a node has exactly one owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use credvault_common::{Error, Identifier, NodePath, Result, Secret};

/// Name given to the root group of a new vault.
pub const ROOT_GROUP_NAME: &str = "Root";

/// A named node that holds entries and child groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Vault-unique identifier.
    pub id: Identifier,
    /// Display name. Not required to be unique.
    pub name: String,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last time a child was attached or detached.
    pub modified_at: DateTime<Utc>,
    parent: Option<Identifier>,
    children: Vec<Identifier>,
    entries: Vec<Identifier>,
}

impl Group {
    fn new(id: Identifier, name: String, notes: Option<String>, parent: Option<Identifier>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            notes,
            created_at: now,
            modified_at: now,
            parent,
            children: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Parent group, `None` only for the root.
    pub fn parent(&self) -> Option<Identifier> {
        self.parent
    }

    /// Identifiers of direct child groups, in insertion order.
    pub fn child_ids(&self) -> &[Identifier] {
        &self.children
    }

    /// Identifiers of direct entries, in insertion order.
    pub fn entry_ids(&self) -> &[Identifier] {
        &self.entries
    }

    /// Check if this is the root group.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Timestamps carried by an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryTimes {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    /// Whether `expires_at` is in force.
    pub expires: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl EntryTimes {
    fn now(expires_at: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            created: now,
            updated: now,
            accessed: now,
            expires: expires_at.is_some(),
            expires_at,
        }
    }
}

/// A prior version of an entry. Loaded and saved as-is, never edited here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub title: String,
    pub username: String,
    pub secret: Secret,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub updated: DateTime<Utc>,
}

/// A credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Identifier,
    pub title: String,
    pub username: String,
    pub secret: Secret,
    pub url: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub icon: Option<String>,
    pub times: EntryTimes,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    group: Identifier,
}

impl Entry {
    /// Identifier of the group this entry belongs to.
    pub fn group(&self) -> Identifier {
        self.group
    }
}

/// Attributes for a group about to be attached.
#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub name: String,
    pub notes: Option<String>,
    /// Requested identifier; a fresh one is generated when absent.
    pub identifier: Option<Identifier>,
}

impl NewGroup {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Attributes for an entry about to be attached.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub title: String,
    pub username: String,
    pub secret: Secret,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub icon: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Requested identifier; a fresh one is generated when absent.
    pub identifier: Option<Identifier>,
}

/// Summary of a detached subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detached {
    /// Path the detached node had before removal.
    pub path: NodePath,
    pub groups: usize,
    pub entries: usize,
}

/// Split a tag string on `,` or `;`, trimming blanks and dropping empties.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// The credential tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "StoredVault", try_from = "StoredVault")]
pub struct Vault {
    root: Identifier,
    groups: HashMap<Identifier, Group>,
    entries: HashMap<Identifier, Entry>,
    /// Identifiers of deleted nodes. Never handed out again.
    retired: HashSet<Identifier>,
}

impl Vault {
    /// Create an empty vault holding only the root group.
    pub fn new() -> Self {
        let root = Group::new(Identifier::generate(), ROOT_GROUP_NAME.to_string(), None, None);
        let root_id = root.id;
        let mut groups = HashMap::new();
        groups.insert(root_id, root);

        Self {
            root: root_id,
            groups,
            entries: HashMap::new(),
            retired: HashSet::new(),
        }
    }

    /// Identifier of the root group.
    pub fn root_id(&self) -> Identifier {
        self.root
    }

    /// Get the root group.
    pub fn root(&self) -> &Group {
        &self.groups[&self.root]
    }

    /// Look up a group.
    pub fn group(&self, id: Identifier) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Look up an entry.
    pub fn entry(&self, id: Identifier) -> Option<&Entry> {
        self.entries.get(&id)
    }

    fn require_group(&self, id: Identifier) -> Result<&Group> {
        self.groups
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("Group {} not found", id)))
    }

    fn require_entry(&self, id: Identifier) -> Result<&Entry> {
        self.entries
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("Entry {} not found", id)))
    }

    /// Number of groups, root included.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Check whether an identifier is live or retired anywhere in the vault.
    pub fn is_identifier_used(&self, id: Identifier) -> bool {
        self.groups.contains_key(&id) || self.entries.contains_key(&id) || self.retired.contains(&id)
    }

    /// Direct child groups of `id`.
    pub fn child_groups(&self, id: Identifier) -> Result<Vec<&Group>> {
        let group = self.require_group(id)?;
        Ok(group.children.iter().map(|c| &self.groups[c]).collect())
    }

    /// Direct entries of `id`.
    pub fn group_entries(&self, id: Identifier) -> Result<Vec<&Entry>> {
        let group = self.require_group(id)?;
        Ok(group.entries.iter().map(|e| &self.entries[e]).collect())
    }

    /// The subtree rooted at `id` in pre-order, depth first, `id` first.
    pub fn walk_groups(&self, id: Identifier) -> Result<Vec<&Group>> {
        let start = self.require_group(id)?;
        let mut visited = Vec::with_capacity(self.groups.len());
        let mut stack = vec![start];

        while let Some(group) = stack.pop() {
            visited.push(group);
            for child in group.children.iter().rev() {
                stack.push(&self.groups[child]);
            }
        }

        Ok(visited)
    }

    /// Every entry in the subtree rooted at `id`, group by group in pre-order.
    pub fn subtree_entries(&self, id: Identifier) -> Result<Vec<&Entry>> {
        Ok(self
            .walk_groups(id)?
            .into_iter()
            .flat_map(|g| g.entries.iter().map(|e| &self.entries[e]))
            .collect())
    }

    /// Path of a group: the names of its ancestors below the root, then its own.
    pub fn group_path(&self, id: Identifier) -> Result<NodePath> {
        let mut names = Vec::new();
        let mut current = self.require_group(id)?;

        while let Some(parent) = current.parent {
            names.push(current.name.clone());
            current = self.require_group(parent)?;
        }

        names.reverse();
        Ok(NodePath::from_components(names))
    }

    /// Path of an entry: its group's path followed by its title.
    pub fn entry_path(&self, id: Identifier) -> Result<NodePath> {
        let entry = self.require_entry(id)?;
        Ok(self.group_path(entry.group)?.child(&entry.title))
    }

    fn allocate_identifier(&self, requested: Option<Identifier>) -> Result<Identifier> {
        match requested {
            Some(id) if self.is_identifier_used(id) => Err(Error::Validation(format!(
                "Identifier {} is already in use",
                id
            ))),
            Some(id) => Ok(id),
            None => loop {
                let id = Identifier::generate();
                if !self.is_identifier_used(id) {
                    return Ok(id);
                }
            },
        }
    }

    /// Attach a new group under `parent`.
    ///
    /// # Errors
    /// - Parent not found
    /// - Requested identifier already used
    pub fn add_group(&mut self, parent: Identifier, new: NewGroup) -> Result<Identifier> {
        self.require_group(parent)?;
        let id = self.allocate_identifier(new.identifier)?;

        self.groups
            .insert(id, Group::new(id, new.name, new.notes, Some(parent)));

        let owner = self
            .groups
            .get_mut(&parent)
            .ok_or_else(|| Error::NotFound(format!("Group {} not found", parent)))?;
        owner.children.push(id);
        owner.modified_at = Utc::now();

        Ok(id)
    }

    /// Attach a new entry to `group`.
    ///
    /// # Errors
    /// - Group not found
    /// - Requested identifier already used
    pub fn add_entry(&mut self, group: Identifier, new: NewEntry) -> Result<Identifier> {
        self.require_group(group)?;
        let id = self.allocate_identifier(new.identifier)?;

        let entry = Entry {
            id,
            title: new.title,
            username: new.username,
            secret: new.secret,
            url: new.url,
            notes: new.notes,
            tags: new.tags,
            icon: new.icon,
            times: EntryTimes::now(new.expires_at),
            history: Vec::new(),
            group,
        };
        self.entries.insert(id, entry);

        let owner = self
            .groups
            .get_mut(&group)
            .ok_or_else(|| Error::NotFound(format!("Group {} not found", group)))?;
        owner.entries.push(id);
        owner.modified_at = Utc::now();

        Ok(id)
    }

    /// Detach a group together with every descendant group and entry.
    ///
    /// # Errors
    /// - Group not found
    /// - `id` is the root group
    pub fn remove_group(&mut self, id: Identifier) -> Result<Detached> {
        let parent = self
            .require_group(id)?
            .parent
            .ok_or_else(|| Error::Validation("Cannot remove the root group".to_string()))?;
        let path = self.group_path(id)?;

        let group_ids: Vec<Identifier> = self.walk_groups(id)?.iter().map(|g| g.id).collect();
        let entry_ids: Vec<Identifier> = self.subtree_entries(id)?.iter().map(|e| e.id).collect();

        if let Some(owner) = self.groups.get_mut(&parent) {
            owner.children.retain(|c| *c != id);
            owner.modified_at = Utc::now();
        }
        for gid in &group_ids {
            self.groups.remove(gid);
            self.retired.insert(*gid);
        }
        for eid in &entry_ids {
            self.entries.remove(eid);
            self.retired.insert(*eid);
        }

        Ok(Detached {
            path,
            groups: group_ids.len(),
            entries: entry_ids.len(),
        })
    }

    /// Detach a single entry.
    pub fn remove_entry(&mut self, id: Identifier) -> Result<Detached> {
        let path = self.entry_path(id)?;
        let entry = self
            .entries
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("Entry {} not found", id)))?;

        if let Some(owner) = self.groups.get_mut(&entry.group) {
            owner.entries.retain(|e| *e != id);
            owner.modified_at = Utc::now();
        }
        self.retired.insert(id);

        Ok(Detached {
            path,
            groups: 0,
            entries: 1,
        })
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized shape of a vault: flat node lists in pre-order.
#[derive(Serialize, Deserialize)]
struct StoredVault {
    root: Identifier,
    groups: Vec<Group>,
    entries: Vec<Entry>,
    #[serde(default)]
    retired: Vec<Identifier>,
}

impl From<Vault> for StoredVault {
    fn from(vault: Vault) -> Self {
        let order: Vec<Identifier> = vault
            .walk_groups(vault.root)
            .map(|gs| gs.iter().map(|g| g.id).collect())
            .unwrap_or_default();
        let entry_order: Vec<Identifier> = order
            .iter()
            .flat_map(|g| vault.groups[g].entries.clone())
            .collect();

        let mut groups = vault.groups;
        let mut entries = vault.entries;
        let mut retired: Vec<Identifier> = vault.retired.into_iter().collect();
        retired.sort();

        StoredVault {
            root: vault.root,
            groups: order.iter().filter_map(|id| groups.remove(id)).collect(),
            entries: entry_order.iter().filter_map(|id| entries.remove(id)).collect(),
            retired,
        }
    }
}

impl TryFrom<StoredVault> for Vault {
    type Error = Error;

    /// Rebuild the tables, rejecting anything that is not a single-rooted,
    /// acyclic tree with consistent back-references and unique identifiers.
    fn try_from(stored: StoredVault) -> Result<Self> {
        let corrupt = |msg: String| Error::Serialization(format!("Corrupt vault tree: {}", msg));

        let mut seen = HashSet::new();
        let mut groups = HashMap::new();
        for group in stored.groups {
            if !seen.insert(group.id) {
                return Err(corrupt(format!("duplicate identifier {}", group.id)));
            }
            groups.insert(group.id, group);
        }
        let mut entries = HashMap::new();
        for entry in stored.entries {
            if !seen.insert(entry.id) {
                return Err(corrupt(format!("duplicate identifier {}", entry.id)));
            }
            entries.insert(entry.id, entry);
        }
        let retired: HashSet<Identifier> = stored.retired.into_iter().collect();
        if let Some(id) = retired.iter().find(|id| seen.contains(*id)) {
            return Err(corrupt(format!("retired identifier {} is still live", id)));
        }

        match groups.get(&stored.root) {
            Some(root) if root.parent.is_none() => {}
            Some(_) => return Err(corrupt("root group has a parent".to_string())),
            None => return Err(corrupt("root group missing".to_string())),
        }

        let mut claimed = HashSet::new();
        for group in groups.values() {
            for child in &group.children {
                match groups.get(child) {
                    Some(c) if c.parent == Some(group.id) => {}
                    _ => return Err(corrupt(format!("bad child link {} -> {}", group.id, child))),
                }
            }
            for eid in &group.entries {
                if !claimed.insert(*eid) {
                    return Err(corrupt(format!("entry {} listed twice", eid)));
                }
                match entries.get(eid) {
                    Some(e) if e.group == group.id => {}
                    _ => return Err(corrupt(format!("bad entry link {} -> {}", group.id, eid))),
                }
            }
        }
        for entry in entries.values() {
            let listed = groups
                .get(&entry.group)
                .map(|g| g.entries.contains(&entry.id))
                .unwrap_or(false);
            if !listed {
                return Err(corrupt(format!("entry {} is not owned by its group", entry.id)));
            }
        }

        // Reachability from the root with a visited set catches cycles and
        // orphans, and duplicate child links.
        let mut reached = HashSet::new();
        let mut stack = vec![stored.root];
        while let Some(id) = stack.pop() {
            if !reached.insert(id) {
                return Err(corrupt(format!("group {} reached twice", id)));
            }
            stack.extend(groups[&id].children.iter().copied());
        }
        if reached.len() != groups.len() {
            return Err(corrupt("groups unreachable from root".to_string()));
        }

        Ok(Vault {
            root: stored.root,
            groups,
            entries,
            retired,
        })
    }
}
