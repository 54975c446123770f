//! Search, filter and pagination state of the service list, and the view
//! that turns it into queries.

use crate::core::cache::{ActiveQuery, QueryKey};
use crate::core::client::QueryClient;
use crate::core::ent::*;
use crate::core::error::{ApiError, ApiResult, StateError};
use crate::core::notify::Toaster;
use crate::core::subscription::{Generation, Ticket};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// Filter value meaning "no constraint".
pub const ALL: &str = "all";

fn parse_filter<T: FromStr>(field: &'static str, value: &str) -> Result<Option<T>, StateError> {
    if value.is_empty() || value == ALL {
        return Ok(None);
    }
    value
        .parse::<T>()
        .map(Some)
        .map_err(|_| StateError::UnknownFilter {
            field,
            value: value.to_string(),
        })
}

#[derive(Debug, Clone)]
pub struct ListState {
    search_term: String,
    debounced_search_term: String,
    last_input: Option<Instant>,
    debounce: Duration,
    status_filter: Option<ServiceStatus>,
    type_filter: Option<ServiceType>,
    page: u32,
    limit: u32,
}

impl ListState {
    pub fn new(limit: u32, debounce: Duration) -> ListState {
        ListState {
            search_term: String::new(),
            debounced_search_term: String::new(),
            last_input: None,
            debounce,
            status_filter: None,
            type_filter: None,
            page: 1,
            limit: limit.max(1),
        }
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn debounced_search_term(&self) -> &str {
        &self.debounced_search_term
    }

    /// Records a keystroke. The query only sees it once input has paused for
    /// the debounce interval.
    pub fn set_search_term(&mut self, term: impl Into<String>, now: Instant) {
        self.search_term = term.into();
        self.last_input = Some(now);
    }

    /// When the pending search term settles, if one is pending.
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.last_input.map(|at| at + self.debounce)
    }

    /// Promotes the search term once the debounce interval has elapsed.
    /// Returns true when the effective term changed.
    pub fn poll_debounce(&mut self, now: Instant) -> bool {
        match self.debounce_deadline() {
            Some(deadline) if now >= deadline => {
                self.last_input = None;
                if self.debounced_search_term != self.search_term {
                    self.debounced_search_term = self.search_term.clone();
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    pub fn set_status_filter(&mut self, value: &str) -> Result<(), StateError> {
        self.status_filter = parse_filter("status", value)?;
        Ok(())
    }

    pub fn set_type_filter(&mut self, value: &str) -> Result<(), StateError> {
        self.type_filter = parse_filter("type", value)?;
        Ok(())
    }

    pub fn status_filter(&self) -> &str {
        self.status_filter.map_or(ALL, |status| status.as_str())
    }

    pub fn type_filter(&self) -> &str {
        self.type_filter.map_or(ALL, |kind| kind.as_str())
    }

    pub fn filters(&self) -> ServiceFilters {
        ServiceFilters {
            status: self.status_filter,
            name_like: Some(self.debounced_search_term.clone()).filter(|term| !term.is_empty()),
            service_type: self.type_filter,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn can_go_next(&self, total_pages: u32) -> bool {
        self.page < total_pages
    }

    pub fn can_go_prev(&self) -> bool {
        self.page > 1
    }

    pub fn next_page(&mut self, total_pages: u32) -> bool {
        if !self.can_go_next(total_pages) {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn prev_page(&mut self) -> bool {
        if !self.can_go_prev() {
            return false;
        }
        self.page -= 1;
        true
    }

    pub fn query_key(&self) -> QueryKey {
        QueryKey::services(self.page, self.limit, self.filters())
    }
}

/// What the list should display right now.
#[derive(Debug, PartialEq)]
pub enum ListRender<'a> {
    Loading,
    Error(&'a ApiError),
    Ready {
        page: &'a Page<Service>,
        /// The page belongs to a previous key while the current one loads.
        is_placeholder: bool,
    },
}

#[derive(Debug)]
pub struct PendingList {
    ticket: Ticket,
    seq: u64,
    key: QueryKey,
}

impl PendingList {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

#[derive(Debug)]
pub struct ServiceListView {
    client: QueryClient,
    toaster: Toaster,
    pub state: ListState,
    generation: Generation,
    // sequence numbers of the newest request and of the page on screen
    requested: u64,
    shown_seq: u64,
    shown: Option<(QueryKey, Page<Service>)>,
    error: Option<ApiError>,
    fetching: bool,
    active: Option<ActiveQuery>,
}

impl ServiceListView {
    pub fn new(client: QueryClient, toaster: Toaster, state: ListState) -> ServiceListView {
        ServiceListView {
            client,
            toaster,
            state,
            generation: Generation::default(),
            requested: 0,
            shown_seq: 0,
            shown: None,
            error: None,
            fetching: false,
            active: None,
        }
    }

    pub fn render(&self) -> ListRender<'_> {
        if let Some(error) = &self.error {
            return ListRender::Error(error);
        }
        match &self.shown {
            None => ListRender::Loading,
            Some((key, page)) => ListRender::Ready {
                page,
                is_placeholder: *key != self.state.query_key(),
            },
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.shown.as_ref().map(|(_, page)| page.total_pages)
    }

    /// Forward navigation is disabled until a page has been seen and while on
    /// the last one.
    pub fn next_page(&mut self) -> bool {
        match self.total_pages() {
            Some(total) => self.state.next_page(total),
            None => false,
        }
    }

    pub fn prev_page(&mut self) -> bool {
        self.state.prev_page()
    }

    /// Marks the current key as requested. Data already on screen stays there
    /// until [`ServiceListView::finish`] delivers the new page.
    pub fn begin(&mut self) -> PendingList {
        let key = self.state.query_key();
        if self.active.as_ref().map(|active| active.key()) != Some(&key) {
            self.active = Some(self.client.cache().observe(key.clone()));
        }
        self.fetching = true;
        self.requested += 1;
        PendingList {
            ticket: self.generation.ticket(),
            seq: self.requested,
            key,
        }
    }

    /// Applies a completed request; returns whether it applied. Completions
    /// from before the last [`ServiceListView::unmount`], for a key the list
    /// has moved away from, or older than the page on screen are dropped.
    pub fn finish(&mut self, pending: PendingList, result: ApiResult<Page<Service>>) -> bool {
        if !self.generation.is_current(pending.ticket) {
            tracing::debug!("dropping stale result for {}", pending.key);
            return false;
        }
        if pending.seq == self.requested {
            self.fetching = false;
        }
        if pending.key != self.state.query_key() || pending.seq < self.shown_seq {
            tracing::debug!("dropping superseded result for {}", pending.key);
            return false;
        }
        self.shown_seq = pending.seq;
        match result {
            Ok(page) => {
                self.error = None;
                self.shown = Some((pending.key, page));
            }
            Err(error) => {
                tracing::warn!("loading {} failed: {}", pending.key, error);
                self.error = Some(error);
            }
        }
        true
    }

    pub async fn refresh(&mut self) -> ApiResult<()> {
        let pending = self.begin();
        let result = match pending.key() {
            QueryKey::Services {
                page,
                limit,
                filters,
            } => self.client.fetch_services(*page, *limit, filters).await,
            other => Err(ApiError::Decode(format!("not a list key: {}", other))),
        };
        let outcome = result.as_ref().map(|_| ()).map_err(|err| err.clone());
        self.finish(pending, result);
        outcome
    }

    /// Feeds one keystroke into the search box.
    pub fn type_search(&mut self, term: impl Into<String>) {
        self.state.set_search_term(term, Instant::now());
    }

    /// Waits out the debounce interval and refreshes if the effective search
    /// term changed. Returns whether a query was issued.
    pub async fn settle_search(&mut self) -> ApiResult<bool> {
        let Some(deadline) = self.state.debounce_deadline() else {
            return Ok(false);
        };
        tokio::time::sleep_until(deadline).await;
        if !self.state.poll_debounce(Instant::now()) {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    pub async fn delete(&mut self, id: &str) -> ApiResult<ServiceId> {
        match self.client.delete_service(id).await {
            Ok(deleted) => {
                self.toaster.success("Service deleted successfully");
                if let Err(err) = self.refresh().await {
                    tracing::warn!("reload after delete failed: {}", err);
                }
                Ok(deleted)
            }
            Err(error) => {
                self.toaster
                    .error(format!("Failed to delete service: {}", error));
                Err(error)
            }
        }
    }

    /// Tears the view down: outstanding requests no longer update it and its
    /// key leaves background revalidation.
    pub fn unmount(&mut self) {
        self.generation.bump();
        self.fetching = false;
        self.active = None;
    }
}
