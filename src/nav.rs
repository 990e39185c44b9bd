//! Navigation URLs: the `page` query parameter and a push-based
//! back/forward history stack.
//!
//! The current page number lives in the URL (`?page=N`), so a stored URL
//! is enough to re-derive and reproduce a rendered page. History entries
//! are pushed (not replaced) on each successful page change.

use regex::Regex;
use std::sync::LazyLock;

/// Regex for the `page` query parameter (`?page=3` or `&page=3`).
static PAGE_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]page=(\d+)").unwrap());

/// Extract the 1-based page number from a URL's `page` query parameter.
///
/// A missing, unparsable, or zero parameter falls back to page 1.
pub fn page_from_url(url: &str) -> u32 {
    PAGE_PARAM_RE
        .captures(url)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|&p| p >= 1)
        .unwrap_or(1)
}

/// Rewrite a URL's `page` query parameter, preserving all other
/// parameters and their order. Appends the parameter if absent.
pub fn with_page(url: &str, page: u32) -> String {
    let (base, query) = match url.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (url, None),
    };

    let mut params: Vec<String> = Vec::new();
    let mut replaced = false;
    if let Some(q) = query {
        for pair in q.split('&').filter(|p| !p.is_empty()) {
            let key = pair.split_once('=').map(|(k, _)| k).unwrap_or(pair);
            if key == "page" {
                if !replaced {
                    params.push(format!("page={page}"));
                    replaced = true;
                }
            } else {
                params.push(pair.to_string());
            }
        }
    }
    if !replaced {
        params.push(format!("page={page}"));
    }

    format!("{base}?{}", params.join("&"))
}

/// Strip the query string and any trailing slash, leaving the service
/// root that API paths are joined onto.
pub fn service_base(url: &str) -> String {
    let base = url.split('?').next().unwrap_or(url);
    base.trim_end_matches('/').to_string()
}

/// Back/forward navigation stack.
///
/// `push` drops any forward entries (same as a browser: navigating after
/// going back starts a new branch). Pushing a URL identical to the
/// current entry is collapsed, so re-deriving a page from history does
/// not grow the stack.
#[derive(Debug)]
pub struct History {
    entries: Vec<String>,
    pos: usize,
}

impl History {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: vec![initial.into()],
            pos: 0,
        }
    }

    /// The URL of the entry the cursor is on.
    pub fn current(&self) -> &str {
        &self.entries[self.pos]
    }

    /// Push a new entry after the cursor, dropping forward entries.
    pub fn push(&mut self, url: impl Into<String>) {
        let url = url.into();
        if url == *self.current() {
            return;
        }
        self.entries.truncate(self.pos + 1);
        self.entries.push(url);
        self.pos += 1;
    }

    /// Move the cursor back one entry. None if already at the oldest.
    pub fn back(&mut self) -> Option<&str> {
        if self.pos == 0 {
            return None;
        }
        self.pos -= 1;
        Some(self.current())
    }

    /// Move the cursor forward one entry. None if already at the newest.
    pub fn forward(&mut self) -> Option<&str> {
        if self.pos + 1 >= self.entries.len() {
            return None;
        }
        self.pos += 1;
        Some(self.current())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
