use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::language::{LanguageCode, LanguagePreference};
use super::batch;
use super::cache::TranslationCache;
use super::view::{ResolutionState, ResolutionView};
use super::TranslationOracle;

/// Abort flag shared by every batch of one generation
#[derive(Clone)]
struct AbortSignal(Arc<watch::Sender<bool>>);

impl AbortSignal {
    fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self(Arc::new(sender))
    }

    fn abort(&self) {
        self.0.send_replace(true);
    }

    fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }

    async fn aborted(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives as long as `self`, so this only returns on abort
        let _ = rx.wait_for(|aborted| *aborted).await;
    }
}

/// How an in-flight batch ended, as seen by generations waiting on it
#[derive(Clone, Debug, PartialEq, Eq)]
enum BatchOutcome {
    Pending,
    Resolved,
    Failed(String),
    /// Abandoned before a reply arrived
    Dropped,
}

struct InFlightEntry {
    batch: u64,
    done: watch::Receiver<BatchOutcome>,
    abort: AbortSignal,
}

/// Strings with a request outstanding, per language
#[derive(Default)]
struct InFlight {
    next_batch: u64,
    entries: HashMap<LanguageCode, HashMap<String, InFlightEntry>>,
}

/// Ownership of one batch's strings in the in-flight registry. The strings
/// are released when the ticket settles or is dropped, whichever is first.
struct BatchTicket {
    id: u64,
    language: LanguageCode,
    texts: Vec<String>,
    done: watch::Sender<BatchOutcome>,
    in_flight: Arc<Mutex<InFlight>>,
}

impl BatchTicket {
    /// Release the strings, then wake waiters. Results must already be
    /// merged so waiters find them in the cache.
    fn settle(&self, outcome: BatchOutcome) {
        self.release();
        self.done.send_replace(outcome);
    }

    fn release(&self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = in_flight.entries.get_mut(&self.language) else {
            return;
        };
        for text in &self.texts {
            if entries.get(text).is_some_and(|entry| entry.batch == self.id) {
                entries.remove(text);
            }
        }
        if entries.is_empty() {
            in_flight.entries.remove(&self.language);
        }
    }
}

impl Drop for BatchTicket {
    fn drop(&mut self) {
        if *self.done.borrow() == BatchOutcome::Pending {
            self.settle(BatchOutcome::Dropped);
        }
    }
}

/// Strings another batch is already fetching
struct SharedWait {
    done: watch::Receiver<BatchOutcome>,
    texts: Vec<String>,
}

/// One oracle request in flight
struct PendingBatch {
    generation: u64,
    ticket: BatchTicket,
    abort: AbortSignal,
}

/// Drives batched fetches for every consumer sharing one cache and oracle
pub struct FetchOrchestrator {
    cache: Arc<TranslationCache>,
    oracle: Arc<dyn TranslationOracle>,
    max_batch_size: usize,
    abort_superseded: bool,
    next_consumer: AtomicU64,
    in_flight: Arc<Mutex<InFlight>>,
}

impl FetchOrchestrator {
    pub fn new(
        cache: Arc<TranslationCache>,
        oracle: Arc<dyn TranslationOracle>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            cache,
            oracle,
            max_batch_size: max_batch_size.max(1),
            abort_superseded: false,
            next_consumer: AtomicU64::new(1),
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    /// Also drop in-flight requests once their generation is superseded.
    /// By default they finish and still land in the cache.
    pub fn with_abort_superseded(mut self, abort: bool) -> Self {
        self.abort_superseded = abort;
        self
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Register a consumer needing `texts`, following `preference` for the
    /// display language. Must be called from within a Tokio runtime.
    pub fn consumer<I, S>(self: &Arc<Self>, preference: LanguagePreference, texts: I) -> TranslationHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.next_consumer.fetch_add(1, Ordering::Relaxed);
        let mut languages = preference.subscribe();
        let language = languages.borrow_and_update().clone();
        let texts = Arc::new(string_set(texts));

        let (state, rx) = watch::channel(ResolutionState::idle(language.clone()));
        let shared = Arc::new(ConsumerShared {
            id,
            orchestrator: Arc::clone(self),
            preference,
            inner: Mutex::new(ConsumerInner {
                generation: 0,
                language,
                texts,
                abort: None,
            }),
            state,
        });

        shared.begin(Trigger::Refresh);

        let weak = Arc::downgrade(&shared);
        let watcher = tokio::spawn(async move {
            while languages.changed().await.is_ok() {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.begin(Trigger::Language);
            }
        });

        debug!("Consumer {} registered", id);

        TranslationHandle {
            shared,
            view: ResolutionView::new(rx),
            watcher,
        }
    }

    /// Split what is still missing into strings this generation requests
    /// itself, chunked into tickets, and strings another batch is already
    /// fetching. With `share` off every missing string gets a ticket.
    fn claim(
        &self,
        language: &LanguageCode,
        texts: &[String],
        abort: &AbortSignal,
        share: bool,
    ) -> (Vec<BatchTicket>, Vec<SharedWait>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        // Batches merge before they release, so anything no longer in
        // flight and not cached still needs a request
        let missing = self.cache.missing(language, texts.iter());
        let mut own = Vec::new();
        let mut waits: HashMap<u64, SharedWait> = HashMap::new();
        if let Some(entries) = in_flight.entries.get(language) {
            for text in missing {
                match entries.get(&text) {
                    Some(entry) if share && !(self.abort_superseded && entry.abort.is_aborted()) => {
                        waits
                            .entry(entry.batch)
                            .or_insert_with(|| SharedWait {
                                done: entry.done.clone(),
                                texts: Vec::new(),
                            })
                            .texts
                            .push(text);
                    }
                    _ => own.push(text),
                }
            }
        } else {
            own.extend(missing);
        }

        let mut tickets = Vec::new();
        for texts in batch::split(&own, self.max_batch_size) {
            in_flight.next_batch += 1;
            let id = in_flight.next_batch;
            let (done, rx) = watch::channel(BatchOutcome::Pending);
            let entries = in_flight.entries.entry(language.clone()).or_default();
            for text in &texts {
                entries.insert(
                    text.clone(),
                    InFlightEntry {
                        batch: id,
                        done: rx.clone(),
                        abort: abort.clone(),
                    },
                );
            }
            tickets.push(BatchTicket {
                id,
                language: language.clone(),
                texts,
                done,
                in_flight: Arc::clone(&self.in_flight),
            });
        }

        (tickets, waits.into_values().collect())
    }

    async fn resolve_batch(&self, batch: PendingBatch, consumer: Weak<ConsumerShared>) {
        let ticket = &batch.ticket;
        let request = self.oracle.translate_batch(&ticket.texts, &ticket.language);

        let outcome = if self.abort_superseded {
            tokio::select! {
                outcome = request => Some(outcome),
                _ = batch.abort.aborted() => None,
            }
        } else {
            Some(request.await)
        };

        let Some(outcome) = outcome else {
            debug!(
                "Dropped {} pending {} texts of superseded generation {}",
                ticket.texts.len(),
                ticket.language,
                batch.generation
            );
            return;
        };

        match outcome {
            Ok(mut translations) => {
                let asked: HashSet<&String> = ticket.texts.iter().collect();
                translations.retain(|original, _| asked.contains(original));

                // Superseded results are still good data for later lookups
                let added = self.cache.merge(&ticket.language, translations);
                ticket.settle(BatchOutcome::Resolved);
                debug!(
                    "Batch of {} {} texts resolved, {} new entries",
                    ticket.texts.len(),
                    ticket.language,
                    added
                );

                if let Some(consumer) = consumer.upgrade() {
                    consumer.publish_resolved(batch.generation);
                }
            }
            Err(e) => {
                warn!(
                    "Translation batch of {} {} texts failed: {}",
                    ticket.texts.len(),
                    ticket.language,
                    e
                );
                let message = e.to_string();
                ticket.settle(BatchOutcome::Failed(message.clone()));
                if let Some(consumer) = consumer.upgrade() {
                    consumer.publish_error(batch.generation, &message);
                }
            }
        }
    }

    /// Wait for strings another batch is fetching. If that batch is
    /// abandoned, request whatever it left missing.
    async fn await_shared(
        &self,
        wait: SharedWait,
        generation: u64,
        language: LanguageCode,
        consumer: Weak<ConsumerShared>,
        abort: AbortSignal,
    ) {
        let mut done = wait.done;
        let settled = async {
            done.wait_for(|outcome| *outcome != BatchOutcome::Pending)
                .await
                .map(|outcome| (*outcome).clone())
                .unwrap_or(BatchOutcome::Dropped)
        };

        let outcome = if self.abort_superseded {
            tokio::select! {
                outcome = settled => outcome,
                _ = abort.aborted() => return,
            }
        } else {
            settled.await
        };

        match outcome {
            BatchOutcome::Pending | BatchOutcome::Resolved => {
                if let Some(consumer) = consumer.upgrade() {
                    consumer.publish_resolved(generation);
                }
            }
            BatchOutcome::Failed(message) => {
                if let Some(consumer) = consumer.upgrade() {
                    consumer.publish_error(generation, &message);
                }
            }
            BatchOutcome::Dropped => {
                let (tickets, _) = self.claim(&language, &wait.texts, &abort, false);
                debug!(
                    "Shared {} batch was dropped, re-requesting {} texts in {} batches",
                    language,
                    wait.texts.len(),
                    tickets.len()
                );
                for ticket in tickets {
                    let batch = PendingBatch {
                        generation,
                        ticket,
                        abort: abort.clone(),
                    };
                    self.resolve_batch(batch, consumer.clone()).await;
                }
            }
        }
    }

    async fn run_generation(
        self: Arc<Self>,
        consumer: Weak<ConsumerShared>,
        generation: u64,
        language: LanguageCode,
        tickets: Vec<BatchTicket>,
        waits: Vec<SharedWait>,
        abort: AbortSignal,
    ) {
        let mut batches = JoinSet::new();

        for ticket in tickets {
            let batch = PendingBatch {
                generation,
                ticket,
                abort: abort.clone(),
            };
            let orchestrator = Arc::clone(&self);
            let consumer = consumer.clone();
            batches.spawn(async move { orchestrator.resolve_batch(batch, consumer).await });
        }

        for wait in waits {
            let orchestrator = Arc::clone(&self);
            let consumer = consumer.clone();
            let language = language.clone();
            let abort = abort.clone();
            batches.spawn(async move {
                orchestrator
                    .await_shared(wait, generation, language, consumer, abort)
                    .await
            });
        }

        while let Some(joined) = batches.join_next().await {
            if let Err(e) = joined {
                warn!("Translation batch task failed: {}", e);
            }
        }

        if let Some(consumer) = consumer.upgrade() {
            consumer.finish(generation);
        }
    }
}

enum Trigger {
    /// Adopt whatever the shared preference holds now
    Language,
    Texts(Arc<BTreeSet<String>>),
    Refresh,
}

struct ConsumerInner {
    generation: u64,
    language: LanguageCode,
    texts: Arc<BTreeSet<String>>,
    abort: Option<AbortSignal>,
}

/// Per-consumer state. The generation check and every publish happen under
/// `inner`, so a superseded generation can never publish after a newer one
/// has started.
struct ConsumerShared {
    id: u64,
    orchestrator: Arc<FetchOrchestrator>,
    preference: LanguagePreference,
    inner: Mutex<ConsumerInner>,
    state: watch::Sender<ResolutionState>,
}

impl ConsumerShared {
    fn lock(&self) -> MutexGuard<'_, ConsumerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(self: &Arc<Self>, trigger: Trigger) {
        let mut inner = self.lock();

        let (language, texts) = match trigger {
            Trigger::Language => {
                let language = self.preference.current();
                if language == inner.language {
                    return;
                }
                (language, Arc::clone(&inner.texts))
            }
            Trigger::Texts(texts) => {
                if texts == inner.texts {
                    return;
                }
                (inner.language.clone(), texts)
            }
            Trigger::Refresh => (inner.language.clone(), Arc::clone(&inner.texts)),
        };

        inner.generation += 1;
        let generation = inner.generation;
        if let Some(previous) = inner.abort.take() {
            debug!("Consumer {} superseded generation {}", self.id, generation - 1);
            previous.abort();
        }
        inner.language = language.clone();
        inner.texts = Arc::clone(&texts);

        let cache = &self.orchestrator.cache;
        if cache.is_source(&language) || texts.is_empty() {
            self.state.send_replace(ResolutionState::idle(language));
            return;
        }

        let present = cache.get_many(&language, texts.iter());
        let to_fetch: Vec<String> = cache.missing(&language, texts.iter()).into_iter().collect();

        if to_fetch.is_empty() {
            debug!(
                "Consumer {}: all {} {} texts cached",
                self.id,
                texts.len(),
                language
            );
            self.state.send_replace(ResolutionState {
                language,
                visible_translations: present,
                is_translating: false,
                error: None,
            });
            return;
        }

        self.state.send_replace(ResolutionState {
            language: language.clone(),
            visible_translations: present,
            is_translating: true,
            error: None,
        });

        let abort = AbortSignal::new();
        inner.abort = Some(abort.clone());
        drop(inner);

        let (tickets, waits) = self.orchestrator.claim(&language, &to_fetch, &abort, true);
        let shared: usize = waits.iter().map(|wait| wait.texts.len()).sum();
        info!(
            "Consumer {}: translating {} strings in {} batches ({}), {} already in flight, generation {}",
            self.id,
            to_fetch.len(),
            tickets.len(),
            language,
            shared,
            generation
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(orchestrator.run_generation(
            Arc::downgrade(self),
            generation,
            language,
            tickets,
            waits,
            abort,
        ));
    }

    fn publish_resolved(&self, generation: u64) {
        let inner = self.lock();
        if inner.generation != generation {
            return;
        }

        let visible = self
            .orchestrator
            .cache
            .get_many(&inner.language, inner.texts.iter());
        self.state.send_modify(|state| state.visible_translations = visible);
    }

    fn publish_error(&self, generation: u64, error: &str) {
        let inner = self.lock();
        if inner.generation != generation {
            return;
        }

        let message = format!("Translation unavailable: {}. Showing original text.", error);
        self.state.send_modify(|state| state.error = Some(message));
    }

    fn finish(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }

        inner.abort = None;
        let visible = self
            .orchestrator
            .cache
            .get_many(&inner.language, inner.texts.iter());
        self.state.send_modify(|state| {
            state.visible_translations = visible;
            state.is_translating = false;
        });
        debug!("Consumer {} settled generation {}", self.id, generation);
    }
}

/// One consumer's access to the engine: its current language, the strings
/// it needs, and a `display` projection over the shared cache.
pub struct TranslationHandle {
    shared: Arc<ConsumerShared>,
    view: ResolutionView,
    watcher: JoinHandle<()>,
}

impl TranslationHandle {
    /// Active language from the shared preference
    pub fn language(&self) -> LanguageCode {
        self.shared.preference.current()
    }

    /// Change the shared language. This consumer re-resolves right away;
    /// others sharing the preference follow through their watchers.
    pub fn set_language(&self, language: LanguageCode) {
        self.shared.preference.set(language);
        self.shared.begin(Trigger::Language);
    }

    /// Replace the strings this consumer needs. Duplicates, empty strings
    /// and ordering are ignored.
    pub fn set_texts<I, S>(&self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared.begin(Trigger::Texts(Arc::new(string_set(texts))));
    }

    /// Start a new generation for the same inputs, retrying whatever is
    /// still missing from the cache
    pub fn refresh(&self) {
        self.shared.begin(Trigger::Refresh);
    }

    pub fn display(&self, text: &str) -> String {
        self.view.display(text)
    }

    pub fn is_translating(&self) -> bool {
        self.view.is_translating()
    }

    pub fn error(&self) -> Option<String> {
        self.view.error()
    }

    pub fn state(&self) -> ResolutionState {
        self.view.snapshot()
    }

    pub fn view(&self) -> ResolutionView {
        self.view.clone()
    }

    pub async fn settled(&self) -> ResolutionState {
        self.view.settled().await
    }
}

impl Drop for TranslationHandle {
    fn drop(&mut self) {
        self.watcher.abort();
        if let Some(abort) = self.shared.lock().abort.take() {
            abort.abort();
        }
    }
}

fn string_set<I, S>(texts: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    texts
        .into_iter()
        .map(Into::into)
        .filter(|text| !text.is_empty())
        .collect()
}
