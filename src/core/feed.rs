//! Append-only event history of one service, loaded page by page as the end
//! of the list comes into view.

use crate::core::client::QueryClient;
use crate::core::ent::*;
use crate::core::error::{ApiError, ApiResult};
use crate::core::subscription::{Generation, Ticket};

/// Edge detector for the marker at the end of the rendered list.
#[derive(Debug, Default)]
pub struct Sentinel {
    visible: bool,
}

impl Sentinel {
    /// Reports the marker's visibility; true only when it just became visible.
    pub fn observe(&mut self, visible: bool) -> bool {
        let rising = visible && !self.visible;
        self.visible = visible;
        rising
    }

    /// Forgets the last reading so a marker that is still on screen fires again.
    pub fn rearm(&mut self) {
        self.visible = false;
    }
}

#[derive(Debug)]
pub struct PendingPage {
    page: u32,
    ticket: Ticket,
}

impl PendingPage {
    pub fn page(&self) -> u32 {
        self.page
    }
}

#[derive(Debug)]
pub struct HistoryFeed {
    client: QueryClient,
    service_id: String,
    limit: u32,
    pages: Vec<Page<Event>>,
    in_flight: Option<u32>,
    generation: Generation,
    sentinel: Sentinel,
    error: Option<ApiError>,
}

impl HistoryFeed {
    pub fn new(client: QueryClient, service_id: impl Into<String>, limit: u32) -> HistoryFeed {
        HistoryFeed {
            client,
            service_id: service_id.into(),
            limit: limit.max(1),
            pages: Vec::new(),
            in_flight: None,
            generation: Generation::default(),
            sentinel: Sentinel::default(),
            error: None,
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn has_next_page(&self) -> bool {
        match self.pages.last() {
            None => true,
            Some(last) => (self.pages.len() as u32).saturating_mul(self.limit) < last.total_items,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.pages.iter().flat_map(|page| page.data.iter())
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages.len()
    }

    /// First page still loading.
    pub fn is_loading(&self) -> bool {
        self.pages.is_empty() && self.in_flight.is_some()
    }

    pub fn is_fetching_next_page(&self) -> bool {
        !self.pages.is_empty() && self.in_flight.is_some()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Claims the next page. `None` while a page is in flight or when the
    /// history is exhausted.
    pub fn begin_next(&mut self) -> Option<PendingPage> {
        if self.in_flight.is_some() || !self.has_next_page() {
            return None;
        }
        let page = self.pages.len() as u32 + 1;
        self.in_flight = Some(page);
        Some(PendingPage {
            page,
            ticket: self.generation.ticket(),
        })
    }

    /// Appends a completed page; returns whether it was applied.
    pub fn finish(&mut self, pending: PendingPage, result: ApiResult<Page<Event>>) -> bool {
        if !self.generation.is_current(pending.ticket) || self.in_flight != Some(pending.page) {
            return false;
        }
        self.in_flight = None;
        match result {
            Ok(page) => {
                self.error = None;
                self.pages.push(page);
                self.sentinel.rearm();
            }
            Err(error) => {
                tracing::warn!(
                    "loading page {} of {} events failed: {}",
                    pending.page,
                    self.service_id,
                    error
                );
                self.error = Some(error);
            }
        }
        true
    }

    /// Loads the next page if one can be claimed. Returns whether a request
    /// was made.
    pub async fn load_next(&mut self) -> ApiResult<bool> {
        let Some(pending) = self.begin_next() else {
            return Ok(false);
        };
        let result = self
            .client
            .fetch_service_events(&self.service_id, pending.page, self.limit)
            .await;
        let outcome = result.as_ref().map(|_| true).map_err(|err| err.clone());
        self.finish(pending, result);
        outcome
    }

    /// Visibility callback of the end-of-list marker.
    pub async fn on_sentinel(&mut self, visible: bool) -> ApiResult<bool> {
        if !self.sentinel.observe(visible) {
            return Ok(false);
        }
        self.load_next().await
    }

    pub fn unmount(&mut self) {
        self.generation.bump();
        self.in_flight = None;
    }
}
