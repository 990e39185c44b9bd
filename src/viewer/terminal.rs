//! Terminal I/O layer: raw mode, Kitty Graphics Protocol, card text,
//! status bar, OSC 52.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use crossterm::{
    ExecutableCommand, QueueableCommand, cursor,
    style::{self, Stylize},
    terminal,
};
use std::io::{self, Write, stdout};

use crate::card::{Card, ImageState};
use crate::controller::Controls;

use super::state::Layout;

const CHUNK_SIZE: usize = 4096;

// ---------------------------------------------------------------------------
// RawGuard — restores raw mode / alternate screen / images on Drop
// ---------------------------------------------------------------------------

pub(super) struct RawGuard {
    cleaned: bool,
}

impl RawGuard {
    pub(super) fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        stdout().execute(terminal::EnterAlternateScreen)?;
        stdout().execute(cursor::Hide)?;
        Ok(Self { cleaned: false })
    }

    pub(super) fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        let mut out = stdout();
        let _ = write!(out, "\x1b_Ga=d,d=A,q=2\x1b\\");
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Kitty protocol helpers
// ---------------------------------------------------------------------------

/// Transfer PNG data in chunks (a=t: data only, no placement).
///
/// All commands use `q=2` (suppress responses): the viewer never reads
/// Kitty responses, and unsuppressed errors arrive as APC sequences that
/// crossterm misparses as key events.
pub(super) fn send_image(png_data: &[u8], image_id: u32) -> io::Result<()> {
    let encoded = BASE64.encode(png_data);
    let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(CHUNK_SIZE).collect();

    let mut out = stdout();
    for (i, chunk) in chunks.iter().enumerate() {
        let is_last = i == chunks.len() - 1;
        let m = if is_last { 0 } else { 1 };
        let chunk = std::str::from_utf8(chunk).expect("base64 output is ASCII");
        if i == 0 {
            write!(
                out,
                "\x1b_Ga=t,f=100,i={image_id},t=d,q=2,m={m};{chunk}\x1b\\"
            )?;
        } else {
            write!(out, "\x1b_Gm={m},q=2;{chunk}\x1b\\")?;
        }
    }
    out.flush()
}

/// Delete an image's placements, keeping its data for re-placement.
pub(super) fn delete_image_placements(image_id: u32) -> io::Result<()> {
    let mut out = stdout();
    write!(out, "\x1b_Ga=d,d=i,i={image_id},q=2\x1b\\")?;
    out.flush()
}

/// Delete all images and their data.
pub(super) fn delete_all_images() -> io::Result<()> {
    let mut out = stdout();
    write!(out, "\x1b_Ga=d,d=A,q=2\x1b\\")?;
    out.flush()
}

/// Place a transferred image scaled into a `cols` x `rows` cell box.
pub(super) fn place_thumb(
    image_id: u32,
    col: u16,
    row: u16,
    cols: u16,
    rows: u16,
) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(col, row))?;
    write!(out, "\x1b_Ga=p,i={image_id},c={cols},r={rows},C=1,q=2\x1b\\")?;
    out.flush()
}

/// Clear the text layer.
pub(super) fn clear_screen() -> io::Result<()> {
    let mut out = stdout();
    out.queue(terminal::Clear(terminal::ClearType::All))?;
    out.flush()
}

// ---------------------------------------------------------------------------
// Card and message drawing
// ---------------------------------------------------------------------------

/// Draw one card's text block with its top at screen row `row` (may be
/// negative for cards partially scrolled off the top). Lines outside
/// the list area are clipped.
pub(super) fn draw_card(layout: &Layout, row: i32, ordinal: usize, card: &Card) -> io::Result<()> {
    let mut out = stdout();
    let text_col = layout.thumb_cols + 2;
    let text_width = layout.term_cols.saturating_sub(text_col) as usize;
    if text_width == 0 {
        return Ok(());
    }

    let title = format!("{ordinal:>2}. {}", card.title);
    let lines: [(u16, String); 3] = [
        (0, truncate(&title, text_width)),
        (1, truncate(&card.size_label, text_width)),
        (2, truncate(&card.share_link, text_width)),
    ];

    for (offset, text) in lines {
        if offset >= layout.card_rows {
            break;
        }
        let screen_row = row + offset as i32;
        if screen_row < 0 || screen_row >= layout.list_rows as i32 {
            continue;
        }
        out.queue(cursor::MoveTo(text_col, screen_row as u16))?;
        match offset {
            0 => write!(out, "{}", text.as_str().bold())?,
            1 => write!(out, "{}", text.as_str().dim())?,
            _ => write!(out, "{}", text.as_str().underlined().dark_blue())?,
        }
    }

    // Image-state marker in the thumbnail area while no image is shown.
    let marker_row = row + (layout.card_rows / 2) as i32;
    if marker_row >= 0 && marker_row < layout.list_rows as i32 {
        out.queue(cursor::MoveTo(1, marker_row as u16))?;
        match card.image.state() {
            ImageState::Unrequested | ImageState::Queued => write!(out, "{}", "·".dim())?,
            ImageState::Loading => write!(out, "{}", "· · ·".dark_yellow())?,
            ImageState::Errored => write!(out, "{}", "✕ no image".red())?,
            ImageState::Loaded => {}
        }
    }

    out.queue(style::ResetColor)?;
    out.flush()
}

/// Draw a single message centered in the list area (empty/error states).
pub(super) fn draw_center_message(layout: &Layout, msg: &str) -> io::Result<()> {
    let mut out = stdout();
    let row = layout.list_rows / 2;
    let col = (layout.term_cols as usize).saturating_sub(msg.len()) / 2;
    out.queue(cursor::MoveTo(col as u16, row))?;
    write!(out, "{}", msg.bold())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Status bar on the terminal's last row.
///
/// `acc_peek`: shows `:5_` while a numeric prefix is pending.
/// `flash`: transient message (cleared on the next keypress).
pub(super) fn draw_status_bar(
    layout: &Layout,
    host: &str,
    controls: &Controls,
    total_items: Option<u64>,
    acc_peek: Option<u32>,
    flash: Option<&str>,
) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.status_row))?;

    let label = if controls.label.is_empty() {
        String::new()
    } else {
        match total_items {
            Some(n) => format!("{} · {n} files", controls.label),
            None => controls.label.clone(),
        }
    };

    let middle = if let Some(msg) = flash {
        format!(" {host} | {msg} | {label}")
    } else if let Some(n) = acc_peek {
        format!(" {host} | :{n}_ | {label}")
    } else {
        let prev = if controls.prev_enabled { "p:prev" } else { "(prev)" };
        let next = if controls.next_enabled { "n:next" } else { "(next)" };
        format!(
            " {host} | {label} | {prev} {next} | j/k Ng:page No:open Ny:link H/L:hist r:reload q:quit"
        )
    };

    let padded = format!("{:<width$}", middle, width = layout.term_cols as usize);
    write!(out, "{}", padded.on_dark_grey().white())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Send text to the system clipboard via OSC 52.
pub(super) fn send_osc52(text: &str) -> io::Result<()> {
    let encoded = BASE64.encode(text.as_bytes());
    let mut out = stdout();
    write!(out, "\x1b]52;c;{encoded}\x1b\\")?;
    out.flush()
}

pub(super) fn check_tty() -> anyhow::Result<()> {
    use std::io::IsTerminal;
    // Only stdout matters. crossterm's `use-dev-tty` reads keyboard from
    // /dev/tty, so stdin being a pipe is always fine.
    if !io::stdout().is_terminal() {
        anyhow::bail!(
            "the shelv viewer requires an interactive terminal.\n\
             \n\
             Supported terminals: Kitty, Ghostty, WezTerm\n\
             To list a page without a terminal UI, use: shelv fetch <url> --page N"
        );
    }
    Ok(())
}

/// Truncate to `width` characters, marking the cut with an ellipsis.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let cut: String = s.chars().take(width.saturating_sub(1)).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_string_unchanged() {
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn truncate_long_string_gets_ellipsis() {
        assert_eq!(truncate("abcdefgh", 5), "abcd…");
    }

    #[test]
    fn truncate_exact_width_unchanged() {
        assert_eq!(truncate("abcde", 5), "abcde");
    }
}
