use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{CurrentResults, Event, SessionCommand, SessionSnapshot};
use crate::config::Settings;
use crate::debounce::Debouncer;
use ts_lens_core::alias::AliasTable;
use ts_lens_core::backend::SearchBackend;
use ts_lens_core::error::{BackendError, FilterError, SearchError, ValidationError};
use ts_lens_core::execute::{execute, validate};
use ts_lens_core::filter::{non_empty, FieldCatalog, FilterDrafts, FilterMode};
use ts_lens_core::generation::{GenerationTracker, QueryGeneration};
use ts_lens_core::models::{Alias, Document, IndexSchema, SearchRequest, SearchResponse};
use ts_lens_core::pagination::{PageNav, Pagination};

enum Mutation {
    Upsert(Document),
    Delete(String),
}

pub(super) struct SessionActor {
    settings: Settings,
    events: mpsc::WeakUnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    state_tx: watch::Sender<Arc<SessionSnapshot>>,
    results_tx: watch::Sender<Arc<CurrentResults>>,

    backend: Option<Arc<dyn SearchBackend>>,
    catalog_seq: u64,
    catalog_loaded: bool,
    catalog_loading: bool,
    catalog_error: Option<BackendError>,
    indexes: Vec<IndexSchema>,
    aliases: AliasTable,

    selected: Option<String>,
    resolved: Option<String>,
    fields: Option<FieldCatalog>,
    query_by_explicit: bool,

    request: SearchRequest,
    drafts: FilterDrafts,
    filter_error: Option<FilterError>,
    mutation_error: Option<SearchError>,
    text: Debouncer<String>,
    raw_filter: Debouncer<String>,

    generations: GenerationTracker,
    awaiting: Option<QueryGeneration>,
    inflight: Option<JoinHandle<()>>,
    results: CurrentResults,
    /// The request `results` answers.
    answered: Option<SearchRequest>,
}

impl SessionActor {
    pub(super) fn new(
        settings: Settings,
        events: mpsc::WeakUnboundedSender<Event>,
        rx: mpsc::UnboundedReceiver<Event>,
    ) -> (
        Self,
        watch::Receiver<Arc<SessionSnapshot>>,
        watch::Receiver<Arc<CurrentResults>>,
    ) {
        let request = SearchRequest::new(Vec::new(), settings.default_page_size);
        let results = empty_results(settings.default_page_size);
        let (state_tx, state) = watch::channel(Arc::new(SessionSnapshot::empty(request.clone())));
        let (results_tx, results_rx) = watch::channel(Arc::new(results.clone()));
        let debounce = settings.debounce();
        let actor = Self {
            settings,
            events,
            rx,
            state_tx,
            results_tx,
            backend: None,
            catalog_seq: 0,
            catalog_loaded: false,
            catalog_loading: false,
            catalog_error: None,
            indexes: Vec::new(),
            aliases: AliasTable::default(),
            selected: None,
            resolved: None,
            fields: None,
            query_by_explicit: false,
            request,
            drafts: FilterDrafts::default(),
            filter_error: None,
            mutation_error: None,
            text: Debouncer::new(debounce),
            raw_filter: Debouncer::new(debounce),
            generations: GenerationTracker::new(),
            awaiting: None,
            inflight: None,
            results,
            answered: None,
        };
        (actor, state, results_rx)
    }

    pub(super) async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            match event {
                Event::Command(SessionCommand::Shutdown) => break,
                Event::Command(command) => self.handle_command(command),
                Event::TextSettled(ticket) => self.on_text_settled(ticket),
                Event::RawFilterSettled(ticket) => self.on_raw_filter_settled(ticket),
                Event::SearchFinished {
                    generation,
                    index,
                    request,
                    result,
                } => self.on_search_finished(generation, &index, &request, result),
                Event::CatalogLoaded { seq, result } => self.on_catalog_loaded(seq, result),
                Event::MutationFinished { index, result } => {
                    self.on_mutation_finished(&index, result)
                }
            }
            self.publish_state();
        }
        self.abort_inflight();
        tracing::debug!("session stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect(backend) => self.connect(backend),
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::ReloadCatalog => self.load_catalog(),
            SessionCommand::SelectIndex(name) => self.select_index(name),
            SessionCommand::SetQueryBy(fields) => self.set_query_by(fields),
            SessionCommand::SetTextQuery(text) => self.set_text_query(text),
            SessionCommand::SetNumericRange { field, min, max } => {
                let result = match self.fields.as_ref() {
                    Some(catalog) => {
                        self.drafts
                            .structured
                            .set_numeric_range(catalog, &field, &min, &max)
                    }
                    None => Err(FilterError::UnknownField { field }),
                };
                self.after_structured_edit(result);
            }
            SessionCommand::SetStringPrefix { field, value } => {
                let result = match self.fields.as_ref() {
                    Some(catalog) => self
                        .drafts
                        .structured
                        .set_string_prefix(catalog, &field, &value),
                    None => Err(FilterError::UnknownField { field }),
                };
                self.after_structured_edit(result);
            }
            SessionCommand::ClearFilters => {
                self.drafts.structured.clear();
                self.after_structured_edit(Ok(()));
            }
            SessionCommand::SetMode(mode) => self.set_mode(mode),
            SessionCommand::SetRawDraft(draft) => self.drafts.raw = draft,
            SessionCommand::EditRawDraft(edit) => edit(&mut self.drafts.raw),
            SessionCommand::SetRawFilter(filter) => self.set_raw_filter(filter),
            SessionCommand::ApplyRaw => self.apply_raw(),
            SessionCommand::SetSortField(sort) => {
                let sort = sort.as_deref().and_then(non_empty);
                if sort != self.request.sort {
                    self.request.sort = sort;
                    self.request.page = 1;
                    self.dispatch();
                }
            }
            SessionCommand::SetPage(page) => self.go_to(PageNav::Goto(page)),
            SessionCommand::Navigate(nav) => self.go_to(nav),
            SessionCommand::SetPerPage(per_page) => {
                if per_page == 0 {
                    tracing::warn!("ignoring page size of 0");
                    return;
                }
                self.request.per_page = per_page;
                self.request.page = 1;
                self.dispatch();
            }
            SessionCommand::Refresh => {
                self.flush_pending();
                self.dispatch();
            }
            SessionCommand::UpsertDocument(document) => self.mutate(Mutation::Upsert(document)),
            SessionCommand::DeleteDocument(id) => self.mutate(Mutation::Delete(id)),
            SessionCommand::Shutdown => {}
        }
    }

    // Connection and catalog

    fn connect(&mut self, backend: Arc<dyn SearchBackend>) {
        tracing::debug!("connecting");
        self.supersede_inflight();
        self.backend = Some(backend);
        self.reset_catalog();
        self.clear_selection();
        self.load_catalog();
    }

    fn disconnect(&mut self) {
        tracing::debug!("disconnecting");
        self.supersede_inflight();
        self.abort_inflight();
        self.backend = None;
        self.catalog_seq += 1;
        self.reset_catalog();
        self.clear_selection();
    }

    fn reset_catalog(&mut self) {
        self.catalog_loaded = false;
        self.catalog_loading = false;
        self.catalog_error = None;
        self.indexes.clear();
        self.aliases = AliasTable::default();
    }

    fn clear_selection(&mut self) {
        self.text.cancel();
        self.raw_filter.cancel();
        self.selected = None;
        self.resolved = None;
        self.fields = None;
        self.query_by_explicit = false;
        self.request = SearchRequest::new(Vec::new(), self.request.per_page);
        self.drafts = FilterDrafts::default();
        self.filter_error = None;
        self.mutation_error = None;
        self.results = empty_results(self.request.per_page);
        self.answered = None;
        self.publish_results();
    }

    fn load_catalog(&mut self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let Some(events) = self.events.upgrade() else {
            return;
        };
        self.catalog_seq += 1;
        let seq = self.catalog_seq;
        self.catalog_loading = true;
        tokio::spawn(async move {
            let result = async {
                let indexes = backend.list_indexes().await?;
                let aliases = backend.list_aliases().await?;
                Ok::<_, BackendError>((indexes, aliases))
            }
            .await;
            let _ = events.send(Event::CatalogLoaded { seq, result });
        });
    }

    fn on_catalog_loaded(
        &mut self,
        seq: u64,
        result: Result<(Vec<IndexSchema>, Vec<Alias>), BackendError>,
    ) {
        if seq != self.catalog_seq {
            tracing::debug!(seq, latest = self.catalog_seq, "discarding stale catalog load");
            return;
        }
        self.catalog_loading = false;
        match result {
            Ok((indexes, aliases)) => {
                tracing::debug!(
                    indexes = indexes.len(),
                    aliases = aliases.len(),
                    "catalog loaded"
                );
                self.indexes = indexes;
                self.aliases = AliasTable::new(aliases);
                self.catalog_loaded = true;
                self.catalog_error = None;
                if self.selected.is_some() {
                    self.resolve_selection();
                    if self.drafts.mode == FilterMode::Structured {
                        self.request.filter = self.compiled();
                    }
                    self.dispatch();
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load indexes and aliases");
                self.results.is_loading = false;
                if !self.catalog_loaded && self.selected.is_some() {
                    self.results.error = Some(SearchError::Transport {
                        message: format!("failed to load indexes: {}", err),
                    });
                }
                self.catalog_error = Some(err);
                self.publish_results();
            }
        }
    }

    // Selection

    fn select_index(&mut self, name: String) {
        self.flush_pending();
        tracing::debug!(index = %name, "selecting index");
        self.selected = Some(name);
        if self.drafts.mode == FilterMode::Structured {
            self.drafts.structured.clear();
            self.request.sort = None;
        }
        self.filter_error = None;
        self.resolve_selection();
        if self.drafts.mode == FilterMode::Structured {
            self.request.filter = self.compiled();
        }
        self.request.page = 1;
        self.dispatch();
    }

    /// Resolve the selected name against the current alias and index lists.
    fn resolve_selection(&mut self) {
        let Some(selected) = self.selected.as_deref() else {
            self.resolved = None;
            self.fields = None;
            return;
        };
        let resolved = self.aliases.resolve_to_index(selected).to_string();
        let schema = self.indexes.iter().find(|s| s.name == resolved);
        self.fields = schema.map(FieldCatalog::from_schema);
        if !self.query_by_explicit {
            self.request.query_by = schema.map(IndexSchema::default_query_by).unwrap_or_default();
        }
        self.resolved = Some(resolved);
    }

    fn set_query_by(&mut self, fields: Vec<String>) {
        let fields: Vec<String> = fields
            .iter()
            .filter_map(|f| non_empty(f))
            .collect();
        self.query_by_explicit = true;
        if fields != self.request.query_by {
            self.request.query_by = fields;
            self.request.page = 1;
            self.dispatch();
        }
    }

    // Text and filters

    fn set_text_query(&mut self, text: String) {
        let Some(events) = self.events.upgrade() else {
            return;
        };
        self.text.schedule(text, move |ticket| {
            let _ = events.send(Event::TextSettled(ticket));
        });
    }

    fn on_text_settled(&mut self, ticket: u64) {
        let Some(text) = self.text.fire(ticket) else {
            return;
        };
        tracing::debug!(text = %text, "text query settled");
        if text != self.request.text {
            self.request.text = text;
            self.request.page = 1;
            self.dispatch();
        }
    }

    fn compiled(&self) -> Option<String> {
        self.fields
            .as_ref()
            .and_then(|catalog| self.drafts.compiled(catalog))
    }

    /// Make the active filter match the structured draft. Returns `true`
    /// when it changed.
    fn apply_structured_filter(&mut self) -> bool {
        let compiled = self.compiled();
        if compiled == self.request.filter {
            return false;
        }
        self.request.filter = compiled;
        self.request.page = 1;
        true
    }

    fn after_structured_edit(&mut self, result: Result<(), FilterError>) {
        match result {
            Ok(()) => {
                self.filter_error = None;
                if self.drafts.mode == FilterMode::Structured && self.apply_structured_filter() {
                    self.dispatch();
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "rejected filter edit");
                self.filter_error = Some(err);
            }
        }
    }

    fn set_mode(&mut self, mode: FilterMode) {
        match mode {
            FilterMode::Raw => {
                let mut active = self.request.clone();
                if let Some(text) = self.text.pending() {
                    active.text = text.clone();
                }
                self.drafts.enter_raw(&active);
            }
            FilterMode::Structured => {
                if self.drafts.mode == FilterMode::Structured {
                    return;
                }
                self.raw_filter.cancel();
                self.drafts.enter_structured();
                if self.apply_structured_filter() {
                    self.dispatch();
                }
            }
        }
    }

    fn set_raw_filter(&mut self, filter: String) {
        self.drafts.raw.filter_by = filter.clone();
        if self.drafts.mode != FilterMode::Raw {
            return;
        }
        let Some(events) = self.events.upgrade() else {
            return;
        };
        self.raw_filter.schedule(filter, move |ticket| {
            let _ = events.send(Event::RawFilterSettled(ticket));
        });
    }

    fn on_raw_filter_settled(&mut self, ticket: u64) {
        let Some(filter) = self.raw_filter.fire(ticket) else {
            return;
        };
        if self.drafts.mode != FilterMode::Raw {
            return;
        }
        let filter = non_empty(&filter);
        tracing::debug!(filter = ?filter, "raw filter settled");
        if filter != self.request.filter {
            self.request.filter = filter;
            self.request.page = 1;
            self.dispatch();
        }
    }

    fn apply_raw(&mut self) {
        if self.drafts.mode != FilterMode::Raw {
            tracing::debug!("apply_raw outside raw mode ignored");
            return;
        }
        self.text.cancel();
        self.raw_filter.cancel();
        let raw = self.drafts.raw.clone();
        self.request.text = raw.text.trim().to_string();
        self.request.query_by = raw.query_by_fields();
        self.request.filter = raw.filter();
        self.request.sort = raw.sort();
        self.query_by_explicit = true;
        self.request.page = 1;
        self.dispatch();
    }

    /// Apply debounced values immediately.
    fn flush_pending(&mut self) {
        if let Some(text) = self.text.flush() {
            if text != self.request.text {
                self.request.text = text;
                self.request.page = 1;
            }
        }
        if let Some(filter) = self.raw_filter.flush() {
            let filter = non_empty(&filter);
            if self.drafts.mode == FilterMode::Raw && filter != self.request.filter {
                self.request.filter = filter;
                self.request.page = 1;
            }
        }
    }

    /// Whether the displayed results answer the request being built, apart
    /// from its page. Their `found` bounds navigation only then.
    fn results_are_current(&self) -> bool {
        if self.results.is_loading || self.results.index != self.resolved {
            return false;
        }
        self.answered.as_ref().is_some_and(|answered| {
            SearchRequest {
                page: self.request.page,
                ..answered.clone()
            } == self.request
        })
    }

    fn go_to(&mut self, nav: PageNav) {
        if !self.results_are_current() {
            tracing::debug!(?nav, "page count unknown until results land; ignoring navigation");
            return;
        }
        let page = Pagination::new(self.request.page, self.request.per_page, self.results.found)
            .navigate(nav);
        if page != self.request.page {
            self.request.page = page;
            self.dispatch();
        }
    }

    // Mutations

    fn mutate(&mut self, mutation: Mutation) {
        let Some(backend) = self.backend.clone() else {
            self.mutation_error = Some(ValidationError::NotConnected.into());
            return;
        };
        let Some(index) = self.resolved.clone() else {
            self.mutation_error = Some(ValidationError::NoIndexSelected.into());
            return;
        };
        let Some(events) = self.events.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let result = match mutation {
                Mutation::Upsert(document) => backend.upsert_document(&index, &document).await,
                Mutation::Delete(id) => backend.delete_document(&index, &id).await,
            };
            let _ = events.send(Event::MutationFinished { index, result });
        });
    }

    fn on_mutation_finished(&mut self, index: &str, result: Result<Document, BackendError>) {
        match result {
            Ok(_) => {
                tracing::debug!(index, "document mutation succeeded; refreshing");
                self.mutation_error = None;
                self.dispatch();
            }
            Err(err) => {
                tracing::warn!(index, error = %err, "document mutation failed");
                self.mutation_error = Some(SearchError::classify(index, err));
            }
        }
    }

    // Dispatch

    fn dispatch(&mut self) {
        let Some(backend) = self.backend.clone() else {
            self.skip(ValidationError::NotConnected);
            return;
        };
        if !self.catalog_loaded {
            // The catalog load dispatches once it lands.
            self.results.is_loading = self.catalog_loading;
            self.publish_results();
            return;
        }
        if let Err(err) = validate(self.resolved.as_deref(), &self.request) {
            self.skip(err);
            return;
        }
        let Some(events) = self.events.upgrade() else {
            return;
        };
        if self.settings.cancel_superseded {
            self.abort_inflight();
        }
        let generation = self.generations.next();
        let index = self.resolved.clone().unwrap_or_default();
        let request = self.request.clone();
        tracing::debug!(
            %generation,
            index = %index,
            q = %request.text,
            filter = ?request.filter,
            sort = ?request.sort,
            page = request.page,
            "dispatching search"
        );
        self.awaiting = Some(generation);
        self.inflight = Some(tokio::spawn(async move {
            let result = execute(backend.as_ref(), Some(index.as_str()), &request).await;
            let _ = events.send(Event::SearchFinished {
                generation,
                index,
                request,
                result,
            });
        }));
        self.results.is_loading = true;
        self.publish_results();
    }

    /// Record a local validation failure. Nothing is sent, and any
    /// in-flight response no longer applies.
    fn skip(&mut self, err: ValidationError) {
        tracing::debug!(error = %err, "search not dispatched");
        self.supersede_inflight();
        self.results.is_loading = false;
        self.results.error = Some(err.into());
        self.publish_results();
    }

    fn on_search_finished(
        &mut self,
        generation: QueryGeneration,
        index: &str,
        request: &SearchRequest,
        result: Result<SearchResponse, SearchError>,
    ) {
        if self.awaiting != Some(generation) || !self.generations.is_latest(generation) {
            tracing::debug!(%generation, "discarding stale response");
            return;
        }
        self.awaiting = None;
        self.inflight = None;
        self.results.is_loading = false;
        match result {
            Ok(resp) => {
                let last = Pagination::new(request.page, request.per_page, resp.found)
                    .total_pages()
                    .max(1);
                if request.page > last && *request == self.request {
                    tracing::debug!(%generation, page = request.page, last, "page past the end; clamping");
                    self.request.page = last;
                    self.dispatch();
                    return;
                }
                tracing::debug!(%generation, found = resp.found, "applying results");
                self.results.apply(generation, index, request, resp);
                self.answered = Some(request.clone());
            }
            Err(err) => {
                tracing::warn!(%generation, error = %err, "search failed");
                self.results.error = Some(err);
            }
        }
        self.publish_results();
    }

    fn supersede_inflight(&mut self) {
        self.awaiting = None;
        if self.settings.cancel_superseded {
            self.abort_inflight();
        }
    }

    fn abort_inflight(&mut self) {
        if let Some(task) = self.inflight.take() {
            task.abort();
        }
    }

    // Read models

    fn publish_state(&self) {
        let snapshot = SessionSnapshot {
            ready: self.backend.is_some() && self.catalog_loaded,
            connected: self.backend.is_some(),
            catalog_loading: self.catalog_loading,
            catalog_error: self.catalog_error.clone(),
            indexes: self.indexes.clone(),
            aliases: self.aliases.clone(),
            selected: self.selected.clone(),
            resolved_index: self.resolved.clone(),
            fields: self.fields.clone(),
            request: self.request.clone(),
            pending_text: self.text.pending().cloned(),
            text_debounce: self.text.state(),
            raw_filter_debounce: self.raw_filter.state(),
            drafts: self.drafts.clone(),
            compiled_filter: self.compiled(),
            filter_error: self.filter_error.clone(),
            mutation_error: self.mutation_error.clone(),
        };
        self.state_tx.send_replace(Arc::new(snapshot));
    }

    fn publish_results(&self) {
        self.results_tx.send_replace(Arc::new(self.results.clone()));
    }
}

fn empty_results(per_page: u32) -> CurrentResults {
    CurrentResults {
        page: 1,
        per_page,
        ..Default::default()
    }
}
