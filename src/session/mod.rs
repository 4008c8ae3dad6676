//! The search session: the reactive query pipeline.
//!
//! A session is an actor. One tokio task owns every piece of mutable state
//! (connection, catalog, selection, filter drafts, active request, results)
//! and handles discrete events from a single channel:
//!
//! ```text
//!  SessionHandle ──commands──▶ ┌──────────────┐ ──state()───▶ SessionSnapshot
//!  debounce timers ──fired──▶  │ SessionActor │
//!  search tasks ──finished──▶  │  (one task)  │ ──results()─▶ CurrentResults
//!  catalog loads ──loaded───▶  └──────────────┘
//! ```
//!
//! Operator edits arrive through [`SessionHandle`]; every change publishes a
//! fresh immutable snapshot on a `watch` channel. Each dispatched search
//! gets a [`QueryGeneration`]; a response is applied only if its generation
//! is still the latest, so a slow answer to an old query can never
//! overwrite a newer one.
//!
//! | Input | Debounced | Page reset | Dispatch |
//! |-------|-----------|------------|----------|
//! | text query | yes | yes | on settle, if changed |
//! | raw filter (raw mode) | yes | yes | on settle, if changed |
//! | structured field | no | yes | if compiled filter changed |
//! | sort, `query_by` | no | yes | if changed |
//! | index selection | flushes pending | yes | always |
//! | page, navigation | no | no | if page changed |
//! | page size | no | yes | always |
//! | document mutation | no | no | on success |

mod actor;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::debounce::DebounceState;
use ts_lens_core::alias::AliasTable;
use ts_lens_core::backend::SearchBackend;
use ts_lens_core::error::{BackendError, FilterError, SearchError};
use ts_lens_core::filter::{FieldCatalog, FilterDrafts, FilterMode, RawDraft};
use ts_lens_core::generation::QueryGeneration;
use ts_lens_core::models::{Alias, Document, Hit, IndexSchema, SearchRequest, SearchResponse};
use ts_lens_core::pagination::{PageNav, Pagination};

use self::actor::SessionActor;

/// Operator state, as last published by the session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Connected and the catalog for this connection has loaded.
    pub ready: bool,
    pub connected: bool,
    pub catalog_loading: bool,
    pub catalog_error: Option<BackendError>,
    pub indexes: Vec<IndexSchema>,
    pub aliases: AliasTable,
    /// The name the operator selected (index or alias).
    pub selected: Option<String>,
    /// `selected` after alias resolution.
    pub resolved_index: Option<String>,
    /// Field classes of the resolved index, when its schema is known.
    pub fields: Option<FieldCatalog>,
    /// Values driving the next dispatch.
    pub request: SearchRequest,
    /// Text typed but not yet settled.
    pub pending_text: Option<String>,
    pub text_debounce: DebounceState,
    pub raw_filter_debounce: DebounceState,
    pub drafts: FilterDrafts,
    /// The structured draft compiled against `fields`.
    pub compiled_filter: Option<String>,
    /// Why the last structured edit was rejected.
    pub filter_error: Option<FilterError>,
    /// Why the last document mutation failed.
    pub mutation_error: Option<SearchError>,
}

impl SessionSnapshot {
    fn empty(request: SearchRequest) -> Self {
        Self {
            ready: false,
            connected: false,
            catalog_loading: false,
            catalog_error: None,
            indexes: Vec::new(),
            aliases: AliasTable::default(),
            selected: None,
            resolved_index: None,
            fields: None,
            request,
            pending_text: None,
            text_debounce: DebounceState::Idle,
            raw_filter_debounce: DebounceState::Idle,
            drafts: FilterDrafts::default(),
            compiled_filter: None,
            filter_error: None,
            mutation_error: None,
        }
    }

    /// Display name of the selected index (its first alias, if any).
    pub fn display_name(&self) -> Option<&str> {
        self.resolved_index
            .as_deref()
            .map(|index| self.aliases.display_name_for(index))
    }
}

/// The `currentResults` read model.
#[derive(Debug, Clone, Default)]
pub struct CurrentResults {
    /// Index the hits came from.
    pub index: Option<String>,
    pub found: u64,
    pub out_of: u64,
    pub hits: Vec<Hit>,
    pub elapsed_ms: u64,
    pub is_loading: bool,
    pub error: Option<SearchError>,
    /// Generation of the response the hits came from.
    pub generation: Option<QueryGeneration>,
    /// Text query the hits answer, for client-side highlighting.
    pub text: String,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl CurrentResults {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.per_page, self.found)
    }

    fn apply(
        &mut self,
        generation: QueryGeneration,
        index: &str,
        request: &SearchRequest,
        resp: SearchResponse,
    ) {
        self.index = Some(index.to_string());
        self.found = resp.found;
        self.out_of = resp.out_of;
        self.hits = resp.hits;
        self.elapsed_ms = resp.search_time_ms;
        self.error = None;
        self.generation = Some(generation);
        self.text = request.text.clone();
        self.page = request.page;
        self.per_page = request.per_page;
        self.total_pages = self.pagination().total_pages();
    }
}

/// Operator commands accepted by the session.
pub enum SessionCommand {
    Connect(Arc<dyn SearchBackend>),
    Disconnect,
    ReloadCatalog,
    SelectIndex(String),
    SetQueryBy(Vec<String>),
    SetTextQuery(String),
    SetNumericRange {
        field: String,
        min: String,
        max: String,
    },
    SetStringPrefix {
        field: String,
        value: String,
    },
    ClearFilters,
    SetMode(FilterMode),
    SetRawDraft(RawDraft),
    /// Edit the raw draft in place, against its latest value.
    EditRawDraft(Box<dyn FnOnce(&mut RawDraft) + Send>),
    SetRawFilter(String),
    ApplyRaw,
    SetSortField(Option<String>),
    SetPage(u32),
    Navigate(PageNav),
    SetPerPage(u32),
    Refresh,
    UpsertDocument(Document),
    DeleteDocument(String),
    Shutdown,
}

pub(crate) enum Event {
    Command(SessionCommand),
    TextSettled(u64),
    RawFilterSettled(u64),
    SearchFinished {
        generation: QueryGeneration,
        index: String,
        request: SearchRequest,
        result: Result<SearchResponse, SearchError>,
    },
    CatalogLoaded {
        seq: u64,
        result: Result<(Vec<IndexSchema>, Vec<Alias>), BackendError>,
    },
    MutationFinished {
        index: String,
        result: Result<Document, BackendError>,
    },
}

/// Cheap, cloneable handle to a running session. All operations are
/// fire-and-forget; observe their effect through [`state`](Self::state)
/// and [`results`](Self::results).
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<Arc<SessionSnapshot>>,
    results: watch::Receiver<Arc<CurrentResults>>,
}

/// Start a session on the current tokio runtime. The session stops on
/// [`SessionHandle::shutdown`] or once every handle is dropped.
pub fn spawn(settings: Settings) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (actor, state, results) = SessionActor::new(settings, tx.downgrade(), rx);
    let task = tokio::spawn(actor.run());
    (SessionHandle { tx, state, results }, task)
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) {
        if self.tx.send(Event::Command(command)).is_err() {
            tracing::debug!("session is shut down; command dropped");
        }
    }

    pub fn state(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.state.clone()
    }

    pub fn results(&self) -> watch::Receiver<Arc<CurrentResults>> {
        self.results.clone()
    }

    pub fn connect(&self, backend: Arc<dyn SearchBackend>) {
        self.send(SessionCommand::Connect(backend));
    }

    pub fn disconnect(&self) {
        self.send(SessionCommand::Disconnect);
    }

    pub fn reload_catalog(&self) {
        self.send(SessionCommand::ReloadCatalog);
    }

    pub fn select_index(&self, name: impl Into<String>) {
        self.send(SessionCommand::SelectIndex(name.into()));
    }

    pub fn set_query_by(&self, fields: Vec<String>) {
        self.send(SessionCommand::SetQueryBy(fields));
    }

    pub fn set_text_query(&self, text: impl Into<String>) {
        self.send(SessionCommand::SetTextQuery(text.into()));
    }

    pub fn set_numeric_range(&self, field: &str, min: &str, max: &str) {
        self.send(SessionCommand::SetNumericRange {
            field: field.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }

    pub fn set_string_prefix(&self, field: &str, value: &str) {
        self.send(SessionCommand::SetStringPrefix {
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    pub fn clear_filters(&self) {
        self.send(SessionCommand::ClearFilters);
    }

    pub fn set_mode(&self, mode: FilterMode) {
        self.send(SessionCommand::SetMode(mode));
    }

    pub fn set_raw_draft(&self, draft: RawDraft) {
        self.send(SessionCommand::SetRawDraft(draft));
    }

    pub fn edit_raw_draft(&self, edit: impl FnOnce(&mut RawDraft) + Send + 'static) {
        self.send(SessionCommand::EditRawDraft(Box::new(edit)));
    }

    pub fn set_raw_filter(&self, filter: impl Into<String>) {
        self.send(SessionCommand::SetRawFilter(filter.into()));
    }

    pub fn apply_raw(&self) {
        self.send(SessionCommand::ApplyRaw);
    }

    pub fn set_sort_field(&self, sort: Option<String>) {
        self.send(SessionCommand::SetSortField(sort));
    }

    pub fn set_page(&self, page: u32) {
        self.send(SessionCommand::SetPage(page));
    }

    pub fn navigate(&self, nav: PageNav) {
        self.send(SessionCommand::Navigate(nav));
    }

    pub fn set_per_page(&self, per_page: u32) {
        self.send(SessionCommand::SetPerPage(per_page));
    }

    pub fn refresh(&self) {
        self.send(SessionCommand::Refresh);
    }

    pub fn upsert_document(&self, document: Document) {
        self.send(SessionCommand::UpsertDocument(document));
    }

    pub fn delete_document(&self, id: impl Into<String>) {
        self.send(SessionCommand::DeleteDocument(id.into()));
    }

    pub fn shutdown(&self) {
        self.send(SessionCommand::Shutdown);
    }
}
