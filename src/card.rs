//! Card construction: one renderable unit per file record, wrapping a
//! deferred-source thumbnail.
//!
//! Cards live for one page-render cycle; the next page replaces them
//! wholesale. Building a card never registers it with the visibility
//! watcher — that is the page controller's job.

use std::time::Duration;

use crate::service::FileRecord;

/// Literal shown when a record has no file name.
pub const UNNAMED_FILE: &str = "Unnamed File";
/// Literal shown when a record has no size field.
pub const UNKNOWN_SIZE: &str = "Unknown size";

/// Per-card reveal offset step and cap. The cap bounds total stagger
/// latency regardless of page size.
const STAGGER_STEP_MS: u64 = 100;
const STAGGER_CAP_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Unrequested,
    Queued,
    Loading,
    Loaded,
    Errored,
}

/// A thumbnail whose true URL is withheld until visibility is confirmed.
///
/// State only moves forward: Unrequested → Queued → Loading →
/// {Loaded | Errored}. `begin_load` consumes the pending source, so a
/// second request for the same image is impossible by construction.
#[derive(Debug)]
pub struct DeferredImage {
    pending_source: Option<String>,
    source: Option<String>,
    state: ImageState,
}

impl DeferredImage {
    pub fn new(url: String) -> Self {
        Self {
            pending_source: Some(url),
            source: None,
            state: ImageState::Unrequested,
        }
    }

    pub fn state(&self) -> ImageState {
        self.state
    }

    /// The URL actually requested. Set when the load is triggered,
    /// replaced by the fallback placeholder on failure.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn has_pending_source(&self) -> bool {
        self.pending_source.is_some()
    }

    /// Unrequested → Queued. Returns false (leaving the state alone)
    /// from any other starting state.
    pub(crate) fn mark_queued(&mut self) -> bool {
        if self.state == ImageState::Unrequested && self.pending_source.is_some() {
            self.state = ImageState::Queued;
            true
        } else {
            false
        }
    }

    /// Queued → Loading: takes the pending source and records it as the
    /// requested source. Returns the URL to fetch, or None if the image
    /// was never queued or has already been requested.
    pub(crate) fn begin_load(&mut self) -> Option<String> {
        if self.state != ImageState::Queued {
            return None;
        }
        let url = self.pending_source.take()?;
        self.source = Some(url.clone());
        self.state = ImageState::Loading;
        Some(url)
    }

    /// Loading → Loaded or Errored. On failure the requested source is
    /// replaced by the fallback placeholder URL. A call outside the
    /// Loading state is a no-op.
    pub(crate) fn finish(&mut self, loaded: bool, fallback_url: &str) {
        if self.state != ImageState::Loading {
            return;
        }
        if loaded {
            self.state = ImageState::Loaded;
        } else {
            self.source = Some(fallback_url.to_string());
            self.state = ImageState::Errored;
        }
    }
}

/// A renderable unit wrapping one file record.
#[derive(Debug)]
pub struct Card {
    /// Position within the page (render order).
    pub index: usize,
    pub file_number: Option<i64>,
    pub title: String,
    pub size_label: String,
    pub share_link: String,
    /// Cosmetic reveal offset: `min(index * 100ms, 1000ms)`.
    pub stagger: Duration,
    pub image: DeferredImage,
    /// Prepared PNG bytes, present once the thumbnail has loaded.
    pub thumb_png: Option<Vec<u8>>,
}

/// Build a card from a record and its position within the page.
pub fn build(record: &FileRecord, index: usize) -> Card {
    let stagger_ms = (index as u64 * STAGGER_STEP_MS).min(STAGGER_CAP_MS);
    Card {
        index,
        file_number: record.file_number,
        title: record
            .file_name
            .clone()
            .unwrap_or_else(|| UNNAMED_FILE.to_string()),
        size_label: record
            .file_size
            .clone()
            .unwrap_or_else(|| UNKNOWN_SIZE.to_string()),
        share_link: record.share_link.clone(),
        stagger: Duration::from_millis(stagger_ms),
        image: DeferredImage::new(record.image_url.clone()),
        thumb_png: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: Option<&str>, size: Option<&str>) -> FileRecord {
        FileRecord {
            file_number: Some(1),
            file_name: name.map(str::to_string),
            file_size: size.map(str::to_string),
            image_url: "https://img.invalid/1.jpg".into(),
            share_link: "https://share.invalid/1".into(),
        }
    }

    #[test]
    fn text_fallbacks() {
        let card = build(&record(None, None), 0);
        assert_eq!(card.title, "Unnamed File");
        assert_eq!(card.size_label, "Unknown size");
    }

    #[test]
    fn text_from_record() {
        let card = build(&record(Some("a.mkv"), Some("2 GB")), 0);
        assert_eq!(card.title, "a.mkv");
        assert_eq!(card.size_label, "2 GB");
    }

    #[test]
    fn stagger_grows_then_caps() {
        assert_eq!(build(&record(None, None), 0).stagger.as_millis(), 0);
        assert_eq!(build(&record(None, None), 3).stagger.as_millis(), 300);
        assert_eq!(build(&record(None, None), 10).stagger.as_millis(), 1000);
        assert_eq!(build(&record(None, None), 39).stagger.as_millis(), 1000);
    }

    #[test]
    fn forty_record_page_caps_beyond_index_ten() {
        for i in 0..40 {
            let card = build(&record(None, None), i);
            let expected = (i as u64 * 100).min(1000);
            assert_eq!(card.stagger.as_millis() as u64, expected);
        }
    }

    #[test]
    fn image_starts_unrequested_with_pending_source() {
        let card = build(&record(None, None), 0);
        assert_eq!(card.image.state(), ImageState::Unrequested);
        assert!(card.image.has_pending_source());
        assert!(card.image.source().is_none());
    }

    #[test]
    fn state_machine_happy_path() {
        let mut img = DeferredImage::new("https://img.invalid/x.jpg".into());
        assert!(img.mark_queued());
        assert_eq!(img.state(), ImageState::Queued);
        let url = img.begin_load().unwrap();
        assert_eq!(url, "https://img.invalid/x.jpg");
        assert_eq!(img.state(), ImageState::Loading);
        assert_eq!(img.source(), Some("https://img.invalid/x.jpg"));
        img.finish(true, "https://fallback.invalid/p.png");
        assert_eq!(img.state(), ImageState::Loaded);
        assert_eq!(img.source(), Some("https://img.invalid/x.jpg"));
    }

    #[test]
    fn failure_substitutes_fallback_source() {
        let mut img = DeferredImage::new("https://img.invalid/x.jpg".into());
        img.mark_queued();
        img.begin_load();
        img.finish(false, "https://fallback.invalid/p.png");
        assert_eq!(img.state(), ImageState::Errored);
        assert_eq!(img.source(), Some("https://fallback.invalid/p.png"));
    }

    #[test]
    fn no_state_skips() {
        // Loading cannot be entered without passing through Queued.
        let mut img = DeferredImage::new("u".into());
        assert!(img.begin_load().is_none());
        assert_eq!(img.state(), ImageState::Unrequested);
        // Terminal outcomes cannot be entered without Loading.
        img.finish(true, "f");
        assert_eq!(img.state(), ImageState::Unrequested);
    }

    #[test]
    fn image_cannot_be_requested_twice() {
        let mut img = DeferredImage::new("u".into());
        img.mark_queued();
        assert!(img.begin_load().is_some());
        // Re-queueing and re-loading are both refused.
        assert!(!img.mark_queued());
        assert!(img.begin_load().is_none());
    }
}
