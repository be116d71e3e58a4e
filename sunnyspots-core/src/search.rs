//! Search-as-you-type.
//!
//! Every input gets a ticket from a [`RequestSequence`]. A scheduled search
//! only runs if no newer input arrived during the quiet period, and its
//! results are only published if it is still the newest when the fetch
//! completes. A slow early response can no longer overwrite a fast later one.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::watch;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Monotonic tokens for one logical stream of queries.
#[derive(Debug, Default)]
pub struct RequestSequence {
    latest: AtomicU64,
}

impl RequestSequence {
    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_latest(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults<T> {
    pub query: String,
    pub items: Vec<T>,
}

type SearchFuture<T> = Pin<Box<dyn Future<Output = Vec<T>> + Send>>;
type SearchFn<T> = Arc<dyn Fn(String) -> SearchFuture<T> + Send + Sync>;

/// Debounced wrapper around any async search.
///
/// `None` on the results channel means "nothing to show" (no query yet or the
/// input was cleared).
pub struct DebouncedSearch<T> {
    quiet: Duration,
    fetch: SearchFn<T>,
    sequence: Arc<RequestSequence>,
    results: Arc<watch::Sender<Option<SearchResults<T>>>>,
}

impl<T: Send + Sync + 'static> DebouncedSearch<T> {
    pub fn new<F, Fut>(quiet: Duration, fetch: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<T>> + Send + 'static,
    {
        let (tx, _) = watch::channel(None);
        Self {
            quiet,
            fetch: Arc::new(move |query| -> SearchFuture<T> { Box::pin(fetch(query)) }),
            sequence: Arc::new(RequestSequence::default()),
            results: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SearchResults<T>>> {
        self.results.subscribe()
    }

    /// Schedule a search for `input`, superseding anything scheduled before.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, input: &str) -> Ticket {
        let ticket = self.sequence.issue();
        let query = input.trim().to_string();

        if query.is_empty() {
            self.results.send_replace(None);
            return ticket;
        }

        let quiet = self.quiet;
        let fetch = Arc::clone(&self.fetch);
        let sequence = Arc::clone(&self.sequence);
        let results = Arc::clone(&self.results);

        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            if !sequence.is_latest(ticket) {
                return;
            }

            let items = fetch(query.clone()).await;
            if sequence.is_latest(ticket) {
                results.send_replace(Some(SearchResults { query, items }));
            } else {
                log::debug!("discarding stale results for {query:?}");
            }
        });

        ticket
    }
}
