//! Request orchestration.
//!
//! A request moves through fixed stages:
//!
//! ```text
//! OpenOrCreate -> ListBefore -> Dispatch -> ListAfter -> PersistOrDiscard -> Done
//! ```
//!
//! The container is owned by the orchestrator for the whole request and is
//! either saved once at the end or dropped unsaved. Any error drops it.

use std::fmt;
use tracing::{debug, info, warn};

use crate::codec::{Container, VaultCodec};
use crate::listing::{project, Listing, ListingOptions};
use crate::mutation::{self, EntryDraft, GroupAttributes, GroupTarget, Outcome};
use crate::query::{Filters, Query, Selection, TargetKind};
use crate::request::{Found, Failure, Request, RequestedState, Response};
use crate::tree::{split_tags, Vault};
use credvault_common::{Error, Identifier, Result};

/// Processing stage of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    OpenOrCreate,
    ListBefore,
    Dispatch,
    ListAfter,
    PersistOrDiscard,
    Done,
}

/// Engine operation selected by target kind and requested state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    TouchGroup,
    FindGroup,
    DeleteGroup,
    TouchEntry,
    FindEntry,
    DeleteEntry,
}

impl Operation {
    /// Map a (target, state) pair to an operation.
    ///
    /// `Ok(None)` means the request only lists the vault: no state, or
    /// `create`, which works on the container rather than on a node.
    ///
    /// # Errors
    /// - `Validation` when a target comes without a state or a node
    ///   state comes without a target
    pub fn resolve(target: Option<TargetKind>, state: Option<RequestedState>) -> Result<Option<Self>> {
        use RequestedState::{Create, Delete, Find, Touch};

        match (target, state) {
            (_, Some(Create)) | (None, None) => Ok(None),
            (Some(kind), None) => Err(Error::Validation(format!(
                "Target '{}' requires a state (touch, find or delete)",
                kind_name(kind)
            ))),
            (None, Some(state)) => Err(Error::Validation(format!(
                "State '{:?}' requires a target (group or entry)",
                state
            ))),
            (Some(TargetKind::Group), Some(Touch)) => Ok(Some(Operation::TouchGroup)),
            (Some(TargetKind::Group), Some(Find)) => Ok(Some(Operation::FindGroup)),
            (Some(TargetKind::Group), Some(Delete)) => Ok(Some(Operation::DeleteGroup)),
            (Some(TargetKind::Entry), Some(Touch)) => Ok(Some(Operation::TouchEntry)),
            (Some(TargetKind::Entry), Some(Find)) => Ok(Some(Operation::FindEntry)),
            (Some(TargetKind::Entry), Some(Delete)) => Ok(Some(Operation::DeleteEntry)),
        }
    }
}

fn kind_name(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Group => "group",
        TargetKind::Entry => "entry",
    }
}

/// How the container was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    Opened,
    Created,
}

impl fmt::Display for Acquired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acquired::Opened => write!(f, "opened"),
            Acquired::Created => write!(f, "created"),
        }
    }
}

/// What the dispatch stage produced.
#[derive(Debug, Default)]
struct Dispatched {
    changed: bool,
    find: Option<Found>,
}

/// Runs requests against containers provided by a [`VaultCodec`].
#[derive(Debug, Clone)]
pub struct Orchestrator<C: VaultCodec> {
    codec: C,
}

impl<C: VaultCodec> Orchestrator<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Handle one request.
    ///
    /// # Preconditions
    /// - For any state other than `create`, a container must exist at
    ///   `request.path` and open with `request.passphrase`
    ///
    /// # Postconditions
    /// - On success the container has been saved, unless `dry_run` is set
    /// - On failure nothing has been saved
    ///
    /// # Errors
    /// Returns a [`Failure`] carrying the error and the listings built
    /// before it occurred.
    pub fn handle(&self, request: &Request) -> std::result::Result<Response, Failure> {
        info!(
            path = %request.path.display(),
            target = ?request.target,
            state = ?request.state,
            dry_run = request.dry_run,
            "Handling request"
        );

        let operation = Operation::resolve(request.target, request.state)
            .map_err(|e| fail(e, Response::default()))?;

        enter(Stage::OpenOrCreate);
        let (mut container, acquired) =
            self.acquire(request).map_err(|e| fail(e, Response::default()))?;

        let options = ListingOptions {
            groups: request.list_groups,
            entries: request.list_entries,
            hide_secret: request.hide_secret,
        };

        enter(Stage::ListBefore);
        let before = Listing::build(container.vault(), &options)
            .map_err(|e| fail(e, Response::default()))?;
        let before = Response {
            changed: false,
            groups: before.groups,
            entries: before.entries,
            find: None,
        };

        enter(Stage::Dispatch);
        let dispatched = match operation {
            Some(operation) => {
                debug!(?operation, "Dispatching");
                dispatch(container.vault_mut(), operation, request)
            }
            None => Ok(Dispatched::default()),
        }
        .map_err(|e| fail(e, before.clone()))?;

        enter(Stage::ListAfter);
        let after = Listing::build(container.vault(), &options).map_err(|e| fail(e, before))?;
        let response = Response {
            changed: acquired == Acquired::Created || dispatched.changed,
            groups: after.groups,
            entries: after.entries,
            find: dispatched.find,
        };

        enter(Stage::PersistOrDiscard);
        if request.dry_run {
            info!(path = %request.path.display(), "Dry run, container not saved");
        } else {
            self.codec
                .save(&mut container)
                .map_err(|e| fail(e, response.clone()))?;
        }

        enter(Stage::Done);
        info!(changed = response.changed, acquired = %acquired, "Request complete");
        Ok(response)
    }

    /// Open the container, or create it for a `create` request when
    /// nothing exists at the path yet. An existing container that fails
    /// to open is never replaced.
    fn acquire(&self, request: &Request) -> Result<(Container, Acquired)> {
        let creating = request.state == Some(RequestedState::Create);
        if creating && !self.codec.exists(&request.path) {
            let container = self.codec.create(&request.path, &request.passphrase)?;
            return Ok((container, Acquired::Created));
        }

        let container = self.codec.open(&request.path, &request.passphrase)?;
        Ok((container, Acquired::Opened))
    }
}

fn enter(stage: Stage) {
    debug!(stage = ?stage, "Entering stage");
}

fn fail(error: Error, response: Response) -> Failure {
    warn!(kind = error.kind(), error = %error, "Request failed");
    Failure::new(error, response)
}

fn dispatch(vault: &mut Vault, operation: Operation, request: &Request) -> Result<Dispatched> {
    match operation {
        Operation::TouchGroup => {
            let name = required_group_name(request)?;
            let attributes = GroupAttributes {
                notes: request.filters.notes.clone(),
                identifier: identifier_seed(request)?,
            };
            let outcome = mutation::touch_group(vault, None, name, attributes, request.recursive)?;
            touched(vault, outcome, request)
        }
        Operation::TouchEntry => {
            let target = GroupTarget {
                name: request.group_name.clone(),
                regex: request.regex,
                recursive: request.recursive,
                always_create: request.always_create,
            };
            let draft = EntryDraft {
                title: request.filters.title_or_name.clone(),
                username: request.username.clone(),
                secret: request.secret.clone(),
                url: request.filters.url.clone(),
                notes: request.filters.notes.clone(),
                tags: request.filters.tags.as_deref().map(split_tags).unwrap_or_default(),
                icon: request.icon.clone(),
                expires_at: request.expires_at,
                identifier: identifier_seed(request)?,
            };
            let outcome = mutation::touch_entry(vault, &target, draft)?;
            touched(vault, outcome, request)
        }
        Operation::FindGroup => {
            let query = group_query(request)?;
            find(vault, &query, TargetKind::Group, request)
        }
        Operation::FindEntry => {
            if entry_filters(request).is_empty() && request.group_name.is_none() {
                return Err(Error::Validation(
                    "Finding an entry requires a filter or a group name".to_string(),
                ));
            }
            let query = entry_query(vault, request)?;
            find(vault, &query, TargetKind::Entry, request)
        }
        Operation::DeleteGroup => {
            let query = group_query(request)?;
            let outcome = mutation::delete(vault, &query, TargetKind::Group)?;
            Ok(Dispatched {
                changed: outcome.changed,
                find: None,
            })
        }
        Operation::DeleteEntry => {
            if entry_filters(request).is_empty() {
                return Err(Error::Validation(
                    "Deleting an entry requires at least one filter".to_string(),
                ));
            }
            let query = entry_query(vault, request)?;
            let outcome = mutation::delete(vault, &query, TargetKind::Entry)?;
            Ok(Dispatched {
                changed: outcome.changed,
                find: None,
            })
        }
    }
}

/// Report nodes created by a touch; nothing is reported for a no-op.
fn touched(vault: &Vault, outcome: Outcome, request: &Request) -> Result<Dispatched> {
    let find = if outcome.nodes.is_empty() {
        None
    } else {
        let projections = outcome
            .nodes
            .iter()
            .map(|node| project(vault, *node, request.hide_secret))
            .collect::<Result<Vec<_>>>()?;
        Some(Found::Many(projections))
    };
    Ok(Dispatched {
        changed: outcome.changed,
        find,
    })
}

fn find(vault: &Vault, query: &Query, kind: TargetKind, request: &Request) -> Result<Dispatched> {
    let selection = Selection::from_first(request.first);
    let nodes = query.select(vault, kind, selection)?;

    let mut projections = nodes
        .into_iter()
        .map(|node| project(vault, node, request.hide_secret))
        .collect::<Result<Vec<_>>>()?;
    debug!(matches = projections.len(), "Find resolved");

    if projections.is_empty() {
        return Err(Error::NotFound(format!(
            "No {} matches the given filters",
            kind_name(kind)
        )));
    }
    let found = match selection {
        Selection::First => Found::One(projections.swap_remove(0)),
        Selection::All => Found::Many(projections),
    };
    Ok(Dispatched {
        changed: false,
        find: Some(found),
    })
}

fn required_group_name(request: &Request) -> Result<&str> {
    match request.group_name.as_deref() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(Error::Validation(
            "Group operations require a group name".to_string(),
        )),
    }
}

fn identifier_seed(request: &Request) -> Result<Option<Identifier>> {
    request
        .filters
        .identifier
        .as_deref()
        .map(Identifier::parse)
        .transpose()
}

fn group_query(request: &Request) -> Result<Query> {
    let name = required_group_name(request)?;
    let filters = Filters {
        name: Some(name.to_string()),
        notes: request.filters.notes.clone(),
        identifier: request.filters.identifier.clone(),
        path: request.filters.path.clone(),
        url: None,
        tags: None,
    };
    Ok(Query::new(filters)
        .regex(request.regex)
        .recursive(request.recursive))
}

fn entry_filters(request: &Request) -> Filters {
    Filters {
        name: request.filters.title_or_name.clone(),
        notes: request.filters.notes.clone(),
        identifier: request.filters.identifier.clone(),
        path: request.filters.path.clone(),
        url: request.filters.url.clone(),
        tags: request.filters.tags.clone(),
    }
}

/// Entry query, scoped to the request's group when one is named.
fn entry_query(vault: &Vault, request: &Request) -> Result<Query> {
    let mut query = Query::new(entry_filters(request))
        .regex(request.regex)
        .recursive(request.recursive);

    if let Some(name) = request.group_name.as_deref() {
        let scope = Query::new(Filters::named(name))
            .regex(request.regex)
            .recursive(request.recursive)
            .first_group(vault)
            .map_err(|_| Error::NotFound(format!("Group '{}' doesn't exist", name)))?;
        query = query.within(scope);
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FileCodec;
    use crate::listing::Projection;
    use crate::tree::NewGroup;
    use credvault_common::Secret;
    use credvault_crypto::KdfParams;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        path: PathBuf,
        engine: Orchestrator<FileCodec>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("v.kdbx");
            Self {
                _dir: dir,
                path,
                engine: Orchestrator::new(FileCodec::with_kdf_params(KdfParams::minimal())),
            }
        }

        /// Fixture with an already created container.
        fn created() -> Self {
            let fixture = Self::new();
            fixture
                .engine
                .handle(&fixture.request(None, Some(RequestedState::Create)))
                .unwrap();
            fixture
        }

        fn request(&self, target: Option<TargetKind>, state: Option<RequestedState>) -> Request {
            let mut request = Request::new(&self.path, Secret::new("pw"));
            request.target = target;
            request.state = state;
            request
        }

        fn touch_group(&self, name: &str) -> Request {
            let mut request = self.request(Some(TargetKind::Group), Some(RequestedState::Touch));
            request.group_name = Some(name.to_string());
            request
        }

        fn touch_entry(&self, title: &str, group: Option<&str>) -> Request {
            let mut request = self.request(Some(TargetKind::Entry), Some(RequestedState::Touch));
            request.filters.title_or_name = Some(title.to_string());
            request.username = Some("u".to_string());
            request.secret = Some(Secret::new("p"));
            request.group_name = group.map(String::from);
            request
        }

        fn find_entry(&self, title: &str) -> Request {
            let mut request = self.request(Some(TargetKind::Entry), Some(RequestedState::Find));
            request.filters.title_or_name = Some(title.to_string());
            request
        }

        fn run(&self, request: &Request) -> Response {
            self.engine.handle(request).unwrap()
        }

        fn bytes(&self) -> Vec<u8> {
            fs::read(&self.path).unwrap()
        }
    }

    fn found_entry(response: &Response) -> &crate::listing::EntryProjection {
        match response.find.as_ref().unwrap() {
            Found::One(Projection::Entry(entry)) => entry,
            other => panic!("unexpected find: {other:?}"),
        }
    }

    #[test]
    fn test_operation_routing() {
        use RequestedState::*;

        assert_eq!(Operation::resolve(None, None).unwrap(), None);
        assert_eq!(Operation::resolve(None, Some(Create)).unwrap(), None);
        assert_eq!(
            Operation::resolve(Some(TargetKind::Entry), Some(Delete)).unwrap(),
            Some(Operation::DeleteEntry)
        );
        assert!(matches!(
            Operation::resolve(None, Some(Touch)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            Operation::resolve(Some(TargetKind::Group), None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_create_then_recreate() {
        let fixture = Fixture::new();
        let create = fixture.request(None, Some(RequestedState::Create));

        let first = fixture.run(&create);
        assert!(first.changed);
        assert!(first.groups.is_empty());
        assert!(first.entries.is_empty());
        assert!(fixture.path.exists());

        let second = fixture.run(&create);
        assert!(!second.changed);
    }

    #[test]
    fn test_create_never_overwrites_with_wrong_passphrase() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("email"));
        let before = fixture.bytes();

        let mut create = fixture.request(None, Some(RequestedState::Create));
        create.passphrase = Secret::new("other");
        let failure = fixture.engine.handle(&create).unwrap_err();

        assert!(matches!(failure.error, Error::Open(_)));
        assert_eq!(fixture.bytes(), before);
    }

    #[test]
    fn test_open_missing_container_fails() {
        let fixture = Fixture::new();
        let failure = fixture.engine.handle(&fixture.touch_group("email")).unwrap_err();

        assert!(matches!(failure.error, Error::Open(_)));
        assert!(!failure.response.changed);
        assert!(!fixture.path.exists());
    }

    #[test]
    fn test_touch_group_reports_created_group() {
        let fixture = Fixture::created();

        let response = fixture.run(&fixture.touch_group("email"));
        assert!(response.changed);
        assert_eq!(response.groups.len(), 1);
        assert_eq!(response.groups[0].name, "email");
        assert!(response.groups[0].entries.is_empty());
        assert_eq!(response.find.as_ref().map(Found::len), Some(1));

        let again = fixture.run(&fixture.touch_group("email"));
        assert!(!again.changed);
        assert!(again.find.is_none());
        assert_eq!(again.groups, response.groups);
    }

    #[test]
    fn test_touch_entry_is_idempotent() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("email"));

        let response = fixture.run(&fixture.touch_entry("gmail", Some("email")));
        assert!(response.changed);
        assert_eq!(response.entries.len(), 1);
        assert_eq!(response.entries[0].title, "gmail");
        assert_eq!(response.entries[0].username, "u");
        assert_eq!(response.entries[0].parent_group, "/email");
        assert_eq!(response.groups[0].entries, vec!["gmail"]);

        let again = fixture.run(&fixture.touch_entry("gmail", Some("email")));
        assert!(!again.changed);
        assert_eq!(again.entries, response.entries);
    }

    #[test]
    fn test_touch_entry_without_secret_is_validation_error() {
        let fixture = Fixture::created();
        let before = fixture.bytes();

        let mut request = fixture.touch_entry("gmail", None);
        request.secret = None;
        let failure = fixture.engine.handle(&request).unwrap_err();

        assert!(matches!(failure.error, Error::Validation(_)));
        assert_eq!(fixture.bytes(), before);
    }

    #[test]
    fn test_touch_entry_in_missing_group() {
        let fixture = Fixture::created();

        let failure = fixture
            .engine
            .handle(&fixture.touch_entry("gmail", Some("email")))
            .unwrap_err();
        assert!(matches!(failure.error, Error::NotFound(_)));

        let mut request = fixture.touch_entry("gmail", Some("email"));
        request.always_create = true;
        let response = fixture.run(&request);
        assert!(response.changed);
        assert_eq!(response.groups[0].name, "email");
        assert_eq!(response.find.as_ref().map(Found::len), Some(2));
    }

    #[test]
    fn test_find_entry_first() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("email"));
        fixture.run(&fixture.touch_entry("gmail", Some("email")));

        let response = fixture.run(&fixture.find_entry("gmail"));
        assert!(!response.changed);
        let entry = found_entry(&response);
        assert_eq!(entry.title, "gmail");
        assert_eq!(entry.username, "u");
        assert_eq!(entry.secret.as_ref().map(Secret::expose), Some("p"));
    }

    #[test]
    fn test_find_all_returns_sequence() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("a"));
        fixture.run(&fixture.touch_entry("gmail", Some("a")));
        fixture.run(&fixture.touch_entry("gmail", None));

        let mut request = fixture.find_entry("gmail");
        request.first = false;
        let response = fixture.run(&request);

        match response.find.unwrap() {
            Found::Many(nodes) => assert_eq!(nodes.len(), 2),
            other => panic!("unexpected find: {other:?}"),
        }
    }

    #[test]
    fn test_find_all_without_match_is_not_found() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("email"));
        fixture.run(&fixture.touch_entry("outlook", Some("email")));

        let mut group = fixture.request(Some(TargetKind::Group), Some(RequestedState::Find));
        group.group_name = Some("nonexistent".to_string());
        group.first = false;
        let failure = fixture.engine.handle(&group).unwrap_err();
        assert!(matches!(failure.error, Error::NotFound(_)));
        assert!(!failure.response.changed);
        assert!(failure.response.find.is_none());
        assert_eq!(failure.response.groups.len(), 1);
        assert_eq!(failure.response.entries.len(), 1);

        let mut entry = fixture.find_entry("gmail");
        entry.first = false;
        let failure = fixture.engine.handle(&entry).unwrap_err();
        assert!(matches!(failure.error, Error::NotFound(_)));
        assert_eq!(failure.response.groups[0].name, "email");
        assert_eq!(failure.response.entries[0].title, "outlook");
    }

    #[test]
    fn test_find_entry_regex_is_unanchored() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_entry("mygmail", None));

        let exact = fixture.engine.handle(&fixture.find_entry("gmail")).unwrap_err();
        assert!(matches!(exact.error, Error::NotFound(_)));

        let mut request = fixture.find_entry("gmail");
        request.regex = true;
        let response = fixture.run(&request);
        assert_eq!(found_entry(&response).title, "mygmail");
    }

    #[test]
    fn test_find_entry_scoped_to_group() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("work"));
        fixture.run(&fixture.touch_group("home"));
        fixture.run(&fixture.touch_entry("mail", Some("work")));
        fixture.run(&fixture.touch_entry("mail", Some("home")));

        let mut request = fixture.find_entry("mail");
        request.group_name = Some("home".to_string());
        let response = fixture.run(&request);
        assert_eq!(found_entry(&response).parent_group, "/home");

        request.group_name = Some("office".to_string());
        let failure = fixture.engine.handle(&request).unwrap_err();
        assert!(matches!(failure.error, Error::NotFound(_)));
    }

    #[test]
    fn test_find_entry_requires_criteria() {
        let fixture = Fixture::created();
        let request = fixture.request(Some(TargetKind::Entry), Some(RequestedState::Find));

        let failure = fixture.engine.handle(&request).unwrap_err();
        assert!(matches!(failure.error, Error::Validation(_)));
    }

    #[test]
    fn test_group_operation_requires_name() {
        let fixture = Fixture::created();
        let request = fixture.request(Some(TargetKind::Group), Some(RequestedState::Find));

        let failure = fixture.engine.handle(&request).unwrap_err();
        assert!(matches!(failure.error, Error::Validation(_)));
    }

    #[test]
    fn test_first_match_is_preorder_first() {
        let fixture = Fixture::created();
        let codec = fixture.engine.codec();
        let mut container = codec.open(&fixture.path, &Secret::new("pw")).unwrap();
        let vault = container.vault_mut();
        let root = vault.root_id();
        vault.add_group(root, NewGroup::named("a")).unwrap();
        let b = vault.add_group(root, NewGroup::named("b")).unwrap();
        vault.add_group(b, NewGroup::named("a")).unwrap();
        codec.save(&mut container).unwrap();

        let mut find = fixture.request(Some(TargetKind::Group), Some(RequestedState::Find));
        find.group_name = Some("a".to_string());
        for _ in 0..3 {
            match fixture.run(&find).find.unwrap() {
                Found::One(Projection::Group(group)) => assert_eq!(group.path, "/a"),
                other => panic!("unexpected find: {other:?}"),
            }
        }

        find.first = false;
        match fixture.run(&find).find.unwrap() {
            Found::Many(nodes) => assert_eq!(nodes.len(), 2),
            other => panic!("unexpected find: {other:?}"),
        }
    }

    #[test]
    fn test_find_missing_group_is_not_found() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("email"));

        let mut request = fixture.request(Some(TargetKind::Group), Some(RequestedState::Find));
        request.group_name = Some("nonexistent".to_string());
        let failure = fixture.engine.handle(&request).unwrap_err();

        assert!(matches!(failure.error, Error::NotFound(_)));
        assert!(!failure.response.changed);
        assert_eq!(failure.response.groups.len(), 1);
        assert_eq!(failure.to_json()["failed"], true);
    }

    #[test]
    fn test_delete_group_cascades() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("email"));
        fixture.run(&fixture.touch_entry("gmail", Some("email")));
        fixture.run(&fixture.touch_entry("router", None));

        let mut delete = fixture.request(Some(TargetKind::Group), Some(RequestedState::Delete));
        delete.group_name = Some("email".to_string());
        let response = fixture.run(&delete);

        assert!(response.changed);
        assert!(response.find.is_none());
        assert!(response.groups.is_empty());
        let titles: Vec<&str> = response.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["router"]);

        let failure = fixture.engine.handle(&fixture.find_entry("gmail")).unwrap_err();
        assert!(matches!(failure.error, Error::NotFound(_)));

        let failure = fixture.engine.handle(&delete).unwrap_err();
        assert!(matches!(failure.error, Error::NotFound(_)));
    }

    #[test]
    fn test_delete_entry() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_entry("gmail", None));

        let unfiltered = fixture.request(Some(TargetKind::Entry), Some(RequestedState::Delete));
        let failure = fixture.engine.handle(&unfiltered).unwrap_err();
        assert!(matches!(failure.error, Error::Validation(_)));

        let mut delete = unfiltered.clone();
        delete.filters.title_or_name = Some("gmail".to_string());
        let response = fixture.run(&delete);
        assert!(response.changed);
        assert!(response.entries.is_empty());
    }

    #[test]
    fn test_hide_secret_everywhere() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_entry("gmail", None));

        let mut request = fixture.find_entry("gmail");
        request.hide_secret = true;
        let response = fixture.run(&request);

        let value = serde_json::to_value(&response).unwrap();
        for entry in value["entries"].as_array().unwrap() {
            assert!(entry.get("secret").is_none());
        }
        assert!(value["find"].get("secret").is_none());
        assert!(value["find"].get("username").is_some());
    }

    #[test]
    fn test_dry_run_leaves_container_untouched() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("email"));
        fixture.run(&fixture.touch_entry("gmail", Some("email")));
        let before = fixture.bytes();

        let mut touch = fixture.touch_entry("outlook", Some("email"));
        touch.dry_run = true;
        let response = fixture.run(&touch);
        assert!(response.changed);
        assert_eq!(response.entries.len(), 2);
        assert_eq!(fixture.bytes(), before);

        let mut delete = fixture.request(Some(TargetKind::Group), Some(RequestedState::Delete));
        delete.group_name = Some("email".to_string());
        delete.dry_run = true;
        let response = fixture.run(&delete);
        assert!(response.changed);
        assert!(response.groups.is_empty());
        assert_eq!(fixture.bytes(), before);

        // The same touch without dry run reports the same listing.
        touch.dry_run = false;
        let real = fixture.run(&touch);
        let titles = |r: &Response| r.entries.iter().map(|e| e.title.clone()).collect::<Vec<_>>();
        assert_eq!(titles(&real), vec!["gmail", "outlook"]);
        assert_ne!(fixture.bytes(), before);
    }

    #[test]
    fn test_round_trip_after_reopen() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_group("email"));

        let engine = Orchestrator::new(FileCodec::new());
        let response = engine.handle(&fixture.request(None, None)).unwrap();
        assert!(!response.changed);
        assert_eq!(response.groups.len(), 1);
        assert_eq!(response.groups[0].name, "email");
        assert!(response.groups[0].entries.is_empty());
    }

    #[test]
    fn test_listing_flags() {
        let fixture = Fixture::created();
        fixture.run(&fixture.touch_entry("gmail", None));

        let mut request = fixture.request(None, None);
        request.list_groups = false;
        request.list_entries = false;
        let response = fixture.run(&request);
        assert!(response.groups.is_empty());
        assert!(response.entries.is_empty());
    }

    #[test]
    fn test_identifier_seed() {
        let fixture = Fixture::created();
        let seed = "6f1c1f4e-2a51-4e5b-9b9b-0c6a0f4b7d10";

        let mut request = fixture.touch_group("email");
        request.filters.identifier = Some(seed.to_string());
        let response = fixture.run(&request);
        assert_eq!(response.groups[0].identifier.to_string(), seed);

        let mut bad = fixture.touch_group("other");
        bad.filters.identifier = Some("not-a-uuid".to_string());
        let failure = fixture.engine.handle(&bad).unwrap_err();
        assert!(matches!(failure.error, Error::Validation(_)));
    }

    #[test]
    fn test_save_failure_is_io_error() {
        let fixture = Fixture::new();
        let missing_dir = fixture.path.with_file_name("missing");
        let mut request = Request::new(missing_dir.join("v.kdbx"), Secret::new("pw"));
        request.state = Some(RequestedState::Create);

        let failure = fixture.engine.handle(&request).unwrap_err();
        assert!(matches!(failure.error, Error::Io(_)));
        assert!(!failure.response.changed);
    }
}
