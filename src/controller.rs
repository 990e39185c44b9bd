//! Page orchestration: fetch page → clear state → build cards → re-arm
//! the visibility watcher → update pagination controls → sync navigation
//! history. Also owns the serialized thumbnail drain over the load
//! queue.
//!
//! The controller is UI-agnostic: it never touches the terminal or the
//! network directly. Pages arrive through the injected [`FileService`];
//! thumbnail loads leave as [`Dispatch`] values for the fetch worker and
//! come back through [`Controller::finish_load`].

use anyhow::Result;
use log::{debug, info, trace, warn};

use crate::card::{self, Card};
use crate::nav::{self, History};
use crate::queue::LoadQueue;
use crate::service::{FilePage, FileService};
use crate::viewport::{ColumnGeometry, Watcher};

/// Literal rendered when a page has no records.
pub const NO_FILES_MSG: &str = "No files found";
/// Literal rendered when the page fetch fails.
pub const LOAD_ERROR_MSG: &str = "Error loading files. Please try again.";

/// Process-wide page and drain flags.
///
/// `is_loading` is the single in-flight page-fetch guard; `is_draining`
/// is the single in-flight queue-drain guard. Both are mutual-exclusion
/// flags suppressing re-entry, not locks — they never cancel work
/// already dispatched. Mutated only through these accessors.
#[derive(Debug)]
pub struct PageState {
    current_page: u32,
    is_loading: bool,
    is_draining: bool,
}

impl PageState {
    fn new(page: u32) -> Self {
        Self {
            current_page: page.max(1),
            is_loading: false,
            is_draining: false,
        }
    }

    pub fn page(&self) -> u32 {
        self.current_page
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_draining(&self) -> bool {
        self.is_draining
    }

    fn set_page(&mut self, n: u32) {
        self.current_page = n.max(1);
    }

    /// Claim the fetch guard. False if a fetch is already in flight.
    fn begin_fetch(&mut self) -> bool {
        if self.is_loading {
            return false;
        }
        self.is_loading = true;
        true
    }

    fn end_fetch(&mut self) {
        self.is_loading = false;
    }

    /// Claim the drain guard. False if a drain is already running.
    fn begin_drain(&mut self) -> bool {
        if self.is_draining {
            return false;
        }
        self.is_draining = true;
        true
    }

    fn end_drain(&mut self) {
        self.is_draining = false;
    }
}

/// What the content region currently shows.
#[derive(Debug)]
pub enum Content {
    /// Nothing rendered yet (before the first page request).
    Blank,
    Cards(Vec<Card>),
    /// Empty-state literal.
    Empty(&'static str),
    /// Fetch-failure literal.
    Error(&'static str),
}

/// Pagination control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controls {
    pub prev_enabled: bool,
    pub next_enabled: bool,
    pub label: String,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            prev_enabled: false,
            next_enabled: false,
            label: String::new(),
        }
    }
}

/// Outcome of a `load_page` call.
#[derive(Debug, PartialEq, Eq)]
pub enum PageOutcome {
    /// Another fetch was in flight; the call was a no-op.
    Suppressed,
    Rendered { count: usize },
    Empty,
    Failed,
}

/// A thumbnail load handed to the fetch worker, tagged with the page
/// epoch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub epoch: u64,
    pub card: usize,
    pub url: String,
}

pub struct Controller {
    state: PageState,
    pub content: Content,
    pub controls: Controls,
    total_pages: u32,
    total_items: Option<u64>,
    queue: LoadQueue,
    watcher: Watcher,
    history: History,
    placeholder_url: String,
    /// Bumped on every page load. In-flight loads from a superseded
    /// page complete against a dead epoch and are dropped — the
    /// detached-element write becomes a no-op instead of a fault.
    epoch: u64,
}

impl Controller {
    pub fn new(start_url: &str, placeholder_url: &str, margin_px: u32, threshold: f32) -> Self {
        let page = nav::page_from_url(start_url);
        Self {
            state: PageState::new(page),
            content: Content::Blank,
            controls: Controls::default(),
            total_pages: 0,
            total_items: None,
            queue: LoadQueue::new(),
            watcher: Watcher::new(margin_px, threshold),
            history: History::new(start_url),
            placeholder_url: placeholder_url.to_string(),
            epoch: 0,
        }
    }

    pub fn page(&self) -> u32 {
        self.state.page()
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn total_items(&self) -> Option<u64> {
        self.total_items
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn is_draining(&self) -> bool {
        self.state.is_draining()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The navigation URL of the current history entry.
    pub fn current_url(&self) -> &str {
        self.history.current()
    }

    pub fn cards(&self) -> &[Card] {
        match &self.content {
            Content::Cards(cards) => cards,
            _ => &[],
        }
    }

    pub fn card_count(&self) -> usize {
        self.cards().len()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Fetch and render page `n`. A no-op while another fetch is in
    /// flight. The fetch guard is released on every exit path.
    pub fn load_page(&mut self, n: u32, service: &dyn FileService) -> PageOutcome {
        if !self.state.begin_fetch() {
            debug!("load_page({n}): fetch already in flight, suppressed");
            return PageOutcome::Suppressed;
        }
        let outcome = self.load_page_inner(n, service);
        self.state.end_fetch();
        outcome
    }

    fn load_page_inner(&mut self, n: u32, service: &dyn FileService) -> PageOutcome {
        let n = n.max(1);

        // Abandon the previous page's drain: queue membership is
        // discarded, already-dispatched loads finish against a dead
        // epoch. They are not cancelled.
        self.queue.clear();
        self.state.end_drain();
        self.epoch += 1;

        match service.fetch_page(n) {
            Ok(page) if !page.data.is_empty() => {
                let FilePage {
                    data,
                    total_pages,
                    total_items,
                    ..
                } = page;
                let cards: Vec<Card> = data
                    .iter()
                    .enumerate()
                    .map(|(i, record)| card::build(record, i))
                    .collect();
                self.watcher.rearm();
                for c in &cards {
                    self.watcher.watch(c.index);
                }
                let count = cards.len();
                self.content = Content::Cards(cards);
                self.total_pages = total_pages;
                self.total_items = total_items;
                self.controls = Controls {
                    prev_enabled: n > 1,
                    next_enabled: n < total_pages,
                    label: format!("page {n}/{total_pages}"),
                };
                self.state.set_page(n);
                let url = nav::with_page(self.history.current(), n);
                self.history.push(url);
                info!("load_page({n}): rendered {count} cards ({total_pages} pages total)");
                PageOutcome::Rendered { count }
            }
            Ok(_) => {
                info!("load_page({n}): empty result");
                self.content = Content::Empty(NO_FILES_MSG);
                PageOutcome::Empty
            }
            Err(e) => {
                warn!("load_page({n}): {e:#}");
                self.content = Content::Error(LOAD_ERROR_MSG);
                PageOutcome::Failed
            }
        }
    }

    /// "Previous" binding: only while idle and beyond page 1.
    pub fn prev_page(&mut self, service: &dyn FileService) -> Option<PageOutcome> {
        if self.state.is_loading() || self.state.page() <= 1 {
            return None;
        }
        Some(self.load_page(self.state.page() - 1, service))
    }

    /// "Next" binding: only while idle. There is no client-side upper
    /// bound; a page past the end comes back empty from the service.
    pub fn next_page(&mut self, service: &dyn FileService) -> Option<PageOutcome> {
        if self.state.is_loading() {
            return None;
        }
        Some(self.load_page(self.state.page() + 1, service))
    }

    /// History back: re-derive the page from the stored URL and load it.
    pub fn history_back(&mut self, service: &dyn FileService) -> Option<PageOutcome> {
        let url = self.history.back()?.to_string();
        Some(self.load_page(nav::page_from_url(&url), service))
    }

    /// History forward, symmetric to [`Controller::history_back`].
    pub fn history_forward(&mut self, service: &dyn FileService) -> Option<PageOutcome> {
        let url = self.history.forward()?.to_string();
        Some(self.load_page(nav::page_from_url(&url), service))
    }

    /// Visibility pass: enqueue every watched card that intersects the
    /// extended viewport and still holds a pending source. Cards
    /// already queued or already requested are untouched. Returns the
    /// number of cards newly enqueued.
    pub fn scan_viewport(&mut self, card_h: u32, y_offset: u32, vp_h: u32) -> usize {
        let Content::Cards(cards) = &mut self.content else {
            return 0;
        };
        let geom = ColumnGeometry {
            card_h,
            count: cards.len(),
        };
        let mut added = 0;
        for idx in self.watcher.intersecting(&geom, y_offset, vp_h) {
            let Some(c) = cards.get_mut(idx) else {
                continue;
            };
            if !c.image.has_pending_source() || self.queue.contains(idx) {
                continue;
            }
            if c.image.mark_queued() && self.queue.enqueue(idx) {
                trace!("scan: card {idx} queued");
                added += 1;
            }
        }
        added
    }

    /// Begin draining. Idempotent: a no-op while a drain is running or
    /// the queue is empty. Returns the first dispatch when a new drain
    /// starts.
    pub fn start_drain(&mut self) -> Option<Dispatch> {
        if self.state.is_draining() || self.queue.is_empty() {
            return None;
        }
        self.state.begin_drain();
        debug!("drain: started ({} queued)", self.queue.len());
        self.dispatch_next()
    }

    /// Pop queue heads until one yields a fetchable URL. Clears the
    /// drain flag and returns None once the queue runs dry — a later
    /// enqueue restarts the drain via [`Controller::start_drain`].
    pub fn dispatch_next(&mut self) -> Option<Dispatch> {
        if !self.state.is_draining() {
            return None;
        }
        if let Content::Cards(cards) = &mut self.content {
            while let Some(idx) = self.queue.pop() {
                let Some(c) = cards.get_mut(idx) else {
                    continue;
                };
                if let Some(url) = c.image.begin_load() {
                    debug!("drain: card {idx} loading {url}");
                    return Some(Dispatch {
                        epoch: self.epoch,
                        card: idx,
                        url,
                    });
                }
                // Head had no pending source: skip to the next item.
            }
        }
        debug!("drain: queue empty, stopping");
        self.state.end_drain();
        None
    }

    /// Apply a finished load. Results from a superseded page epoch
    /// refer to cards that no longer exist and are dropped without
    /// mutating anything. Returns whether the result was applied.
    pub fn finish_load(&mut self, epoch: u64, card_idx: usize, png: Result<Vec<u8>>) -> bool {
        if epoch != self.epoch {
            debug!(
                "drain: dropping stale result for card {card_idx} (epoch {epoch} != {})",
                self.epoch
            );
            return false;
        }
        let Content::Cards(cards) = &mut self.content else {
            return false;
        };
        let Some(c) = cards.get_mut(card_idx) else {
            return false;
        };
        match png {
            Ok(bytes) => {
                debug!("drain: card {card_idx} loaded ({} bytes)", bytes.len());
                c.thumb_png = Some(bytes);
                c.image.finish(true, &self.placeholder_url);
            }
            Err(e) => {
                warn!("drain: card {card_idx} failed: {e:#}");
                c.image.finish(false, &self.placeholder_url);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::ImageState;
    use crate::service::FileRecord;
    use anyhow::anyhow;
    use std::cell::Cell;

    const PLACEHOLDER: &str = "https://via.placeholder.com/150";

    fn record(i: usize) -> FileRecord {
        FileRecord {
            file_number: Some(i as i64),
            file_name: Some(format!("file-{i}.mkv")),
            file_size: Some("1 GB".into()),
            image_url: format!("https://img.invalid/{i}.jpg"),
            share_link: format!("https://share.invalid/{i}"),
        }
    }

    /// Serves `per_page` records for pages 1..=pages, empty beyond.
    struct FakeService {
        pages: u32,
        per_page: usize,
        calls: Cell<u32>,
    }

    impl FakeService {
        fn new(pages: u32, per_page: usize) -> Self {
            Self {
                pages,
                per_page,
                calls: Cell::new(0),
            }
        }
    }

    impl FileService for FakeService {
        fn fetch_page(&self, page: u32) -> Result<FilePage> {
            self.calls.set(self.calls.get() + 1);
            if page > self.pages {
                return Ok(FilePage::default());
            }
            Ok(FilePage {
                data: (0..self.per_page).map(record).collect(),
                total_pages: self.pages,
                total_items: Some(self.pages as u64 * self.per_page as u64),
                current_page: Some(page),
            })
        }
    }

    struct FailingService;

    impl FileService for FailingService {
        fn fetch_page(&self, _page: u32) -> Result<FilePage> {
            Err(anyhow!("connection refused"))
        }
    }

    fn controller() -> Controller {
        Controller::new("https://files.invalid/?page=1", PLACEHOLDER, 50, 0.1)
    }

    #[test]
    fn render_updates_controls_and_url() {
        let svc = FakeService::new(5, 4);
        let mut c = controller();
        assert_eq!(c.load_page(3, &svc), PageOutcome::Rendered { count: 4 });
        assert!(c.controls.prev_enabled);
        assert!(c.controls.next_enabled);
        assert_eq!(c.page(), 3);
        assert_eq!(nav::page_from_url(c.current_url()), 3);
    }

    #[test]
    fn controls_disabled_at_bounds() {
        let svc = FakeService::new(5, 4);
        let mut c = controller();
        c.load_page(1, &svc);
        assert!(!c.controls.prev_enabled);
        assert!(c.controls.next_enabled);
        c.load_page(5, &svc);
        assert!(c.controls.prev_enabled);
        assert!(!c.controls.next_enabled);
    }

    #[test]
    fn controls_hold_for_every_page() {
        let svc = FakeService::new(7, 2);
        let mut c = controller();
        for n in 1..=7 {
            c.load_page(n, &svc);
            assert_eq!(c.controls.prev_enabled, n > 1, "prev at page {n}");
            assert_eq!(c.controls.next_enabled, n < 7, "next at page {n}");
        }
    }

    #[test]
    fn empty_page_shows_literal_and_keeps_controls() {
        let svc = FakeService::new(2, 4);
        let mut c = controller();
        c.load_page(2, &svc);
        let before = c.controls.clone();
        assert_eq!(c.load_page(3, &svc), PageOutcome::Empty);
        assert!(matches!(c.content, Content::Empty(m) if m == "No files found"));
        // Pagination controls are not updated on the empty path.
        assert_eq!(c.controls, before);
        assert_eq!(c.page(), 2);
    }

    #[test]
    fn fetch_failure_shows_literal_and_releases_guard() {
        let mut c = controller();
        assert_eq!(c.load_page(1, &FailingService), PageOutcome::Failed);
        assert!(matches!(
            c.content,
            Content::Error(m) if m == "Error loading files. Please try again."
        ));
        assert!(!c.is_loading());
        // A retry immediately afterwards is not suppressed.
        let svc = FakeService::new(1, 2);
        assert_eq!(c.load_page(1, &svc), PageOutcome::Rendered { count: 2 });
    }

    #[test]
    fn reentrant_load_is_suppressed() {
        let svc = FakeService::new(1, 1);
        let mut c = controller();
        c.state.begin_fetch();
        assert_eq!(c.load_page(1, &svc), PageOutcome::Suppressed);
        assert_eq!(svc.calls.get(), 0);
        c.state.end_fetch();
        assert_eq!(c.load_page(1, &svc), PageOutcome::Rendered { count: 1 });
    }

    #[test]
    fn prev_refused_on_first_page() {
        let svc = FakeService::new(3, 1);
        let mut c = controller();
        c.load_page(1, &svc);
        assert!(c.prev_page(&svc).is_none());
        assert!(c.next_page(&svc).is_some());
        assert_eq!(c.page(), 2);
        assert!(c.prev_page(&svc).is_some());
        assert_eq!(c.page(), 1);
    }

    #[test]
    fn next_has_no_client_side_bound() {
        let svc = FakeService::new(1, 1);
        let mut c = controller();
        c.load_page(1, &svc);
        // Past the end: the service's empty page is the backstop.
        assert_eq!(c.next_page(&svc), Some(PageOutcome::Empty));
        assert!(matches!(c.content, Content::Empty(_)));
    }

    #[test]
    fn history_round_trip() {
        let svc = FakeService::new(5, 2);
        let mut c = controller();
        c.load_page(1, &svc);
        c.load_page(2, &svc);
        c.load_page(3, &svc);
        assert_eq!(c.history_back(&svc), Some(PageOutcome::Rendered { count: 2 }));
        assert_eq!(c.page(), 2);
        assert_eq!(nav::page_from_url(c.current_url()), 2);
        assert_eq!(c.history_forward(&svc), Some(PageOutcome::Rendered { count: 2 }));
        assert_eq!(c.page(), 3);
        // At the newest entry there is nothing further forward.
        assert!(c.history_forward(&svc).is_none());
    }

    #[test]
    fn scan_enqueues_visible_unrequested_only() {
        let svc = FakeService::new(1, 10);
        let mut c = controller();
        c.load_page(1, &svc);
        // card_h 100, viewport 300 + 50 margin: cards 0..=3.
        assert_eq!(c.scan_viewport(100, 0, 300), 4);
        // A second scan of the same viewport adds nothing.
        assert_eq!(c.scan_viewport(100, 0, 300), 0);
        assert_eq!(c.queued_len(), 4);
    }

    #[test]
    fn drain_is_fifo_and_serialized() {
        let svc = FakeService::new(1, 10);
        let mut c = controller();
        c.load_page(1, &svc);
        c.scan_viewport(100, 0, 300);

        let d0 = c.start_drain().unwrap();
        assert_eq!(d0.card, 0);
        assert_eq!(d0.url, "https://img.invalid/0.jpg");
        // Idempotent: a second start while draining is a no-op.
        assert!(c.start_drain().is_none());
        assert!(c.is_draining());

        assert!(c.finish_load(d0.epoch, d0.card, Ok(vec![1, 2, 3])));
        let d1 = c.dispatch_next().unwrap();
        assert_eq!(d1.card, 1);
        c.finish_load(d1.epoch, d1.card, Ok(vec![4]));
        let d2 = c.dispatch_next().unwrap();
        assert_eq!(d2.card, 2);
        c.finish_load(d2.epoch, d2.card, Ok(vec![5]));
        let d3 = c.dispatch_next().unwrap();
        assert_eq!(d3.card, 3);
        c.finish_load(d3.epoch, d3.card, Ok(vec![6]));

        // Queue dry: the drain stops and is restartable.
        assert!(c.dispatch_next().is_none());
        assert!(!c.is_draining());
        assert_eq!(c.scan_viewport(100, 400, 300), 4);
        assert!(c.start_drain().is_some());
    }

    #[test]
    fn failed_image_gets_fallback_and_drain_continues() {
        let svc = FakeService::new(1, 3);
        let mut c = controller();
        c.load_page(1, &svc);
        c.scan_viewport(100, 0, 300);

        let d0 = c.start_drain().unwrap();
        assert!(c.finish_load(d0.epoch, d0.card, Err(anyhow!("timed out"))));
        {
            let img = &c.cards()[0].image;
            assert_eq!(img.state(), ImageState::Errored);
            assert_eq!(img.source(), Some(PLACEHOLDER));
        }
        // The failure does not abort the drain.
        let d1 = c.dispatch_next().unwrap();
        assert_eq!(d1.card, 1);
    }

    #[test]
    fn stale_result_is_dropped_without_mutation() {
        let svc = FakeService::new(2, 3);
        let mut c = controller();
        c.load_page(1, &svc);
        c.scan_viewport(100, 0, 300);
        let d = c.start_drain().unwrap();

        // A new page supersedes the drain while the load is in flight.
        c.load_page(2, &svc);
        assert!(!c.is_draining());
        assert!(!c.finish_load(d.epoch, d.card, Ok(vec![9, 9])));
        // The replacement card is untouched.
        assert_eq!(c.cards()[0].image.state(), ImageState::Unrequested);
        assert!(c.cards()[0].thumb_png.is_none());
    }

    #[test]
    fn load_page_resets_queue_and_drain_flag() {
        let svc = FakeService::new(2, 5);
        let mut c = controller();
        c.load_page(1, &svc);
        c.scan_viewport(100, 0, 300);
        c.start_drain();
        assert!(c.is_draining());
        c.load_page(2, &svc);
        assert!(!c.is_draining());
        assert_eq!(c.queued_len(), 0);
    }
}
