//! Interactive browsing (`tsl browse`).
//!
//! Reads one command per line from stdin and feeds it to a running
//! [`session`](crate::session). Every settled result page is printed as
//! it arrives, so rapid typing only ever shows the answer to the latest
//! query. Piped input works too: at end of input the pending edits are
//! flushed and the final page is printed before exit.
//!
//! ```text
//! > q river
//! > range year=1990..2000
//! > sort year:desc
//! > next
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;

use crate::config::Settings;
use crate::render::print_results;
use crate::search::{parse_range, split_assignment};
use crate::session::{self, CurrentResults, SessionHandle, SessionSnapshot};
use ts_lens_core::backend::SearchBackend;
use ts_lens_core::error::SearchError;
use ts_lens_core::filter::{non_empty, FilterMode};
use ts_lens_core::generation::QueryGeneration;
use ts_lens_core::models::Document;
use ts_lens_core::pagination::PageNav;

/// Upper bound on waiting for the last page at end of input.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

const HELP: &str = "\
Commands:
  q <text>                 set the text query (empty lists everything)
  range <field>=<min>..<max>
  prefix <field>=<value>   structured filters; empty value clears the field
  clear                    clear structured filters
  sort [<field>:<dir>]     set or clear the sort
  query-by <f1,f2>         fields to search
  raw | structured         switch filter mode
  filter <expr>            edit the raw filter (raw mode)
  draft <text|query_by|sort> <value>
                           edit the raw draft (raw mode)
  apply                    apply the raw draft
  next | prev | first | last | page <n> | per-page <n>
  index <name>             switch index or alias
  upsert <json> | delete <id>
  refresh | help | quit";

/// Which slot of the raw draft a `draft` line edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftSlot {
    Text,
    QueryBy,
    Sort,
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowseInput {
    Empty,
    Text(String),
    Range {
        field: String,
        min: String,
        max: String,
    },
    Prefix {
        field: String,
        value: String,
    },
    Clear,
    Sort(Option<String>),
    QueryBy(Vec<String>),
    Mode(FilterMode),
    RawFilter(String),
    Draft(DraftSlot, String),
    Apply,
    Navigate(PageNav),
    PerPage(u32),
    Index(String),
    Upsert(Document),
    Delete(String),
    Refresh,
    Help,
    Quit,
}

fn number(command: &str, arg: &str) -> Result<u32> {
    arg.parse()
        .map_err(|_| anyhow!("{} expects a number, got '{}'", command, arg))
}

pub fn parse_line(line: &str) -> Result<BrowseInput> {
    let line = line.trim();
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };
    let input = match command {
        "" => BrowseInput::Empty,
        "q" | "query" => BrowseInput::Text(arg.to_string()),
        "range" => {
            let (field, min, max) = parse_range(arg)?;
            BrowseInput::Range {
                field: field.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            }
        }
        "prefix" => {
            let (field, value) = split_assignment("prefix", arg)?;
            BrowseInput::Prefix {
                field: field.to_string(),
                value: value.to_string(),
            }
        }
        "clear" => BrowseInput::Clear,
        "sort" => BrowseInput::Sort(non_empty(arg)),
        "query-by" => BrowseInput::QueryBy(arg.split(',').filter_map(non_empty).collect()),
        "raw" => BrowseInput::Mode(FilterMode::Raw),
        "structured" => BrowseInput::Mode(FilterMode::Structured),
        "filter" => BrowseInput::RawFilter(arg.to_string()),
        "draft" => {
            let (slot, value) = arg.split_once(char::is_whitespace).unwrap_or((arg, ""));
            let slot = match slot {
                "text" => DraftSlot::Text,
                "query_by" | "query-by" => DraftSlot::QueryBy,
                "sort" => DraftSlot::Sort,
                other => bail!("unknown draft slot '{}'", other),
            };
            BrowseInput::Draft(slot, value.trim().to_string())
        }
        "apply" => BrowseInput::Apply,
        "next" | "n" => BrowseInput::Navigate(PageNav::Next),
        "prev" | "p" => BrowseInput::Navigate(PageNav::Prev),
        "first" => BrowseInput::Navigate(PageNav::First),
        "last" => BrowseInput::Navigate(PageNav::Last),
        "page" => BrowseInput::Navigate(PageNav::Goto(number(command, arg)?)),
        "per-page" => BrowseInput::PerPage(number(command, arg)?),
        "index" | "use" => match non_empty(arg) {
            Some(name) => BrowseInput::Index(name),
            None => bail!("index expects a name"),
        },
        "upsert" => BrowseInput::Upsert(
            serde_json::from_str(arg).map_err(|e| anyhow!("upsert expects a JSON object: {}", e))?,
        ),
        "delete" => match non_empty(arg) {
            Some(id) => BrowseInput::Delete(id),
            None => bail!("delete expects a document id"),
        },
        "refresh" | "r" => BrowseInput::Refresh,
        "help" | "?" => BrowseInput::Help,
        "quit" | "exit" => BrowseInput::Quit,
        other => bail!("unknown command '{}' (try 'help')", other),
    };
    Ok(input)
}

/// Send `input` to the session. `Help`, `Quit` and `Empty` are handled by
/// the caller.
pub fn apply(handle: &SessionHandle, input: BrowseInput) {
    match input {
        BrowseInput::Text(text) => handle.set_text_query(text),
        BrowseInput::Range { field, min, max } => handle.set_numeric_range(&field, &min, &max),
        BrowseInput::Prefix { field, value } => handle.set_string_prefix(&field, &value),
        BrowseInput::Clear => handle.clear_filters(),
        BrowseInput::Sort(sort) => handle.set_sort_field(sort),
        BrowseInput::QueryBy(fields) => handle.set_query_by(fields),
        BrowseInput::Mode(mode) => handle.set_mode(mode),
        BrowseInput::RawFilter(filter) => handle.set_raw_filter(filter),
        BrowseInput::Draft(slot, value) => handle.edit_raw_draft(move |draft| match slot {
            DraftSlot::Text => draft.text = value,
            DraftSlot::QueryBy => draft.query_by = value,
            DraftSlot::Sort => draft.sort_by = value,
        }),
        BrowseInput::Apply => handle.apply_raw(),
        BrowseInput::Navigate(nav) => handle.navigate(nav),
        BrowseInput::PerPage(n) => handle.set_per_page(n),
        BrowseInput::Index(name) => handle.select_index(name),
        BrowseInput::Upsert(document) => handle.upsert_document(document),
        BrowseInput::Delete(id) => handle.delete_document(id),
        BrowseInput::Refresh => handle.refresh(),
        BrowseInput::Empty | BrowseInput::Help | BrowseInput::Quit => {}
    }
}

type Shown = (Option<QueryGeneration>, Option<SearchError>);

/// Print `current` unless it is still loading or was already printed.
fn show_page(snapshot: &SessionSnapshot, current: &CurrentResults, shown: &mut Shown) {
    let key = (current.generation, current.error.clone());
    if current.is_loading || key == *shown {
        return;
    }
    *shown = key;
    let schema = snapshot
        .indexes
        .iter()
        .find(|i| current.index.as_deref() == Some(i.name.as_str()));
    if let Some(name) = snapshot.display_name() {
        println!("-- {} --", name);
    }
    print_results(current, schema);
}

/// Print each settled result page and any rejected edit. Ends once the
/// session has stopped, after printing its last page.
async fn print_updates(
    mut state: watch::Receiver<Arc<SessionSnapshot>>,
    mut results: watch::Receiver<Arc<CurrentResults>>,
) {
    let mut shown: Shown = (None, None);
    let mut filter_error = None;
    let mut mutation_error = None;
    let mut catalog_error = None;
    loop {
        tokio::select! {
            changed = results.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = results.borrow_and_update().clone();
                let snapshot = state.borrow().clone();
                show_page(&snapshot, &current, &mut shown);
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                if snapshot.filter_error != filter_error {
                    if let Some(err) = &snapshot.filter_error {
                        eprintln!("Filter rejected: {}", err);
                    }
                    filter_error = snapshot.filter_error.clone();
                }
                if snapshot.mutation_error != mutation_error {
                    if let Some(err) = &snapshot.mutation_error {
                        eprintln!("Document change failed: {}", err);
                    }
                    mutation_error = snapshot.mutation_error.clone();
                }
                if snapshot.catalog_error != catalog_error {
                    if let Some(err) = &snapshot.catalog_error {
                        eprintln!("Could not load indexes: {}", err);
                    }
                    catalog_error = snapshot.catalog_error.clone();
                }
            }
        }
    }
    let current = results.borrow().clone();
    let snapshot = state.borrow().clone();
    show_page(&snapshot, &current, &mut shown);
}

/// Wait until a page published after `results` was last seen has finished
/// loading.
async fn settle(mut results: watch::Receiver<Arc<CurrentResults>>) {
    let wait = async {
        while results.changed().await.is_ok() {
            if !results.borrow().is_loading {
                break;
            }
        }
    };
    if tokio::time::timeout(SETTLE_TIMEOUT, wait).await.is_err() {
        tracing::warn!("gave up waiting for the last search");
    }
}

pub async fn run_browse(
    backend: Arc<dyn SearchBackend>,
    settings: Settings,
    index: &str,
) -> Result<()> {
    let (handle, task) = session::spawn(settings);
    let printer = tokio::spawn(print_updates(handle.state(), handle.results()));
    handle.connect(backend);
    handle.select_index(index);

    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        println!("Type 'help' for commands.");
    }
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match parse_line(&line) {
            Ok(BrowseInput::Quit) => break,
            Ok(BrowseInput::Help) => println!("{}", HELP),
            Ok(input) => apply(&handle, input),
            Err(e) => eprintln!("{}", e),
        }
    }

    let mut results = handle.results();
    results.borrow_and_update();
    handle.refresh();
    settle(results).await;
    handle.shutdown();
    let _ = task.await;
    let _ = printer.await;
    Ok(())
}
