//! Input processing layer: key mapping and numeric prefix accumulator.
//!
//! Pure logic, no I/O. All functions are deterministic and testable.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const MAX_PREFIX: u32 = 999_999;

/// Accumulated numeric prefix for vim/less-style commands.
///
/// Users type digits then a command character: `5g` jumps to page 5,
/// `3j` scrolls 3 steps down, `2o` opens card 2's share link.
pub(super) struct InputAccumulator {
    count: Option<u32>,
}

impl InputAccumulator {
    pub(super) fn new() -> Self {
        Self { count: None }
    }

    /// Feed a digit character ('0'..='9'). Returns false if overflow
    /// would occur.
    fn push_digit(&mut self, d: u32) -> bool {
        let current = self.count.unwrap_or(0);
        let new = current.saturating_mul(10).saturating_add(d);
        if new > MAX_PREFIX {
            return false; // ignore further digits
        }
        self.count = Some(new);
        true
    }

    /// Take the accumulated count, resetting to None.
    fn take(&mut self) -> Option<u32> {
        self.count.take()
    }

    /// Peek at the current accumulated count without consuming it.
    pub(super) fn peek(&self) -> Option<u32> {
        self.count
    }

    pub(super) fn reset(&mut self) {
        self.count = None;
    }

    pub(super) fn is_active(&self) -> bool {
        self.count.is_some()
    }
}

/// Actions produced by key input processing.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Action {
    Quit,
    ScrollDown(u32),
    ScrollUp(u32),
    HalfPageDown(u32),
    HalfPageUp(u32),
    JumpToTop,
    JumpToBottom,
    /// Pagination controls.
    NextPage,
    PrevPage,
    /// `Ng`: load page N directly.
    GoToPage(u32),
    /// Browser-style history traversal.
    HistoryBack,
    HistoryForward,
    /// Re-fetch the current page.
    Reload,
    /// `No`: open card N's share link in the browser.
    OpenShare(u32),
    OpenSharePrompt,
    /// `Ny`: yank card N's share link to the clipboard.
    YankShare(u32),
    YankSharePrompt,
    CancelInput,
    /// A digit was accumulated; caller should redraw the status bar.
    Digit,
}

/// Map a key event to an `Action`, consuming/updating the accumulator
/// as needed. Returns `None` for unknown keys (caller should reset the
/// accumulator).
pub(super) fn map_key_event(key: KeyEvent, acc: &mut InputAccumulator) -> Option<Action> {
    let KeyEvent {
        code, modifiers, ..
    } = key;

    match (code, modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            Some(Action::Quit)
        }

        // Esc: cancel pending input
        (KeyCode::Esc, _) => {
            acc.reset();
            Some(Action::CancelInput)
        }

        // Digits: accumulate
        (KeyCode::Char(c @ '0'..='9'), KeyModifiers::NONE) => {
            let d = c as u32 - '0' as u32;
            acc.push_digit(d);
            Some(Action::Digit)
        }

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => {
            let count = acc.take().unwrap_or(1);
            Some(Action::ScrollDown(count))
        }
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => {
            let count = acc.take().unwrap_or(1);
            Some(Action::ScrollUp(count))
        }
        (KeyCode::Char('d'), _) => {
            let count = acc.take().unwrap_or(1);
            Some(Action::HalfPageDown(count))
        }
        (KeyCode::Char('u'), _) => {
            let count = acc.take().unwrap_or(1);
            Some(Action::HalfPageUp(count))
        }

        // g: top without a prefix, page N with one
        (KeyCode::Char('g'), KeyModifiers::NONE) => match acc.take() {
            Some(n) => Some(Action::GoToPage(n.max(1))),
            None => Some(Action::JumpToTop),
        },
        (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
            acc.reset();
            Some(Action::JumpToBottom)
        }

        // Pagination
        (KeyCode::Char('n'), _) | (KeyCode::Right, _) | (KeyCode::PageDown, _) => {
            acc.reset();
            Some(Action::NextPage)
        }
        (KeyCode::Char('p'), _) | (KeyCode::Left, _) | (KeyCode::PageUp, _) => {
            acc.reset();
            Some(Action::PrevPage)
        }

        // History
        (KeyCode::Char('H'), _) => {
            acc.reset();
            Some(Action::HistoryBack)
        }
        (KeyCode::Char('L'), _) => {
            acc.reset();
            Some(Action::HistoryForward)
        }

        (KeyCode::Char('r'), _) => {
            acc.reset();
            Some(Action::Reload)
        }

        // Share links: prefix selects the 1-based card on the page
        (KeyCode::Char('o'), KeyModifiers::NONE) => match acc.take() {
            Some(n) => Some(Action::OpenShare(n)),
            None => Some(Action::OpenSharePrompt),
        },
        (KeyCode::Char('y'), KeyModifiers::NONE) => match acc.take() {
            Some(n) => Some(Action::YankShare(n)),
            None => Some(Action::YankSharePrompt),
        },

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn feed_digits(acc: &mut InputAccumulator, s: &str) {
        for c in s.chars() {
            map_key_event(key(KeyCode::Char(c)), acc);
        }
    }

    #[test]
    fn plain_scroll_has_count_one() {
        let mut acc = InputAccumulator::new();
        assert_eq!(
            map_key_event(key(KeyCode::Char('j')), &mut acc),
            Some(Action::ScrollDown(1))
        );
    }

    #[test]
    fn prefix_multiplies_scroll() {
        let mut acc = InputAccumulator::new();
        feed_digits(&mut acc, "12");
        assert_eq!(
            map_key_event(key(KeyCode::Char('j')), &mut acc),
            Some(Action::ScrollDown(12))
        );
        // Count is consumed.
        assert_eq!(
            map_key_event(key(KeyCode::Char('j')), &mut acc),
            Some(Action::ScrollDown(1))
        );
    }

    #[test]
    fn g_without_prefix_jumps_to_top() {
        let mut acc = InputAccumulator::new();
        assert_eq!(
            map_key_event(key(KeyCode::Char('g')), &mut acc),
            Some(Action::JumpToTop)
        );
    }

    #[test]
    fn g_with_prefix_goes_to_page() {
        let mut acc = InputAccumulator::new();
        feed_digits(&mut acc, "5");
        assert_eq!(
            map_key_event(key(KeyCode::Char('g')), &mut acc),
            Some(Action::GoToPage(5))
        );
    }

    #[test]
    fn zero_g_clamps_to_page_one() {
        let mut acc = InputAccumulator::new();
        feed_digits(&mut acc, "0");
        assert_eq!(
            map_key_event(key(KeyCode::Char('g')), &mut acc),
            Some(Action::GoToPage(1))
        );
    }

    #[test]
    fn o_with_prefix_opens_share() {
        let mut acc = InputAccumulator::new();
        feed_digits(&mut acc, "3");
        assert_eq!(
            map_key_event(key(KeyCode::Char('o')), &mut acc),
            Some(Action::OpenShare(3))
        );
    }

    #[test]
    fn o_without_prefix_prompts() {
        let mut acc = InputAccumulator::new();
        assert_eq!(
            map_key_event(key(KeyCode::Char('o')), &mut acc),
            Some(Action::OpenSharePrompt)
        );
    }

    #[test]
    fn next_prev_reset_pending_prefix() {
        let mut acc = InputAccumulator::new();
        feed_digits(&mut acc, "7");
        assert_eq!(
            map_key_event(key(KeyCode::Char('n')), &mut acc),
            Some(Action::NextPage)
        );
        assert!(!acc.is_active());
    }

    #[test]
    fn esc_cancels_input() {
        let mut acc = InputAccumulator::new();
        feed_digits(&mut acc, "42");
        assert!(acc.is_active());
        assert_eq!(
            map_key_event(key(KeyCode::Esc), &mut acc),
            Some(Action::CancelInput)
        );
        assert!(!acc.is_active());
    }

    #[test]
    fn accumulator_saturates() {
        let mut acc = InputAccumulator::new();
        feed_digits(&mut acc, "99999999");
        assert!(acc.peek().unwrap() <= MAX_PREFIX);
    }

    #[test]
    fn unknown_key_maps_to_none() {
        let mut acc = InputAccumulator::new();
        assert_eq!(map_key_event(key(KeyCode::Char('z')), &mut acc), None);
    }
}
