//! Viewer state: layout arithmetic, scroll position, transferred
//! thumbnails, and the full-screen redraw.

use std::collections::HashMap;
use std::io;
use std::time::Instant;

use crate::card::ImageState;
use crate::config::ViewerConfig;
use crate::controller::{Content, Controller};

use super::terminal;

// ---------------------------------------------------------------------------
// Layout / ViewState
// ---------------------------------------------------------------------------

pub(super) struct Layout {
    pub term_cols: u16,
    pub cell_w: u16,
    pub cell_h: u16,
    /// Terminal rows per card.
    pub card_rows: u16,
    /// Columns reserved for the thumbnail at the left of each card.
    pub thumb_cols: u16,
    /// Rows available for the card list (everything above the status bar).
    pub list_rows: u16,
    pub status_row: u16,
}

pub(super) fn compute_layout(
    term_cols: u16,
    term_rows: u16,
    pixel_w: u16,
    pixel_h: u16,
    cfg: &ViewerConfig,
) -> Layout {
    let cell_w = if term_cols > 0 { pixel_w / term_cols } else { 1 };
    let cell_h = if term_rows > 0 { pixel_h / term_rows } else { 1 };
    let list_rows = term_rows.saturating_sub(1);
    Layout {
        term_cols,
        cell_w: cell_w.max(1),
        cell_h: cell_h.max(1),
        card_rows: cfg.card_rows.min(list_rows.max(1)),
        thumb_cols: cfg.thumb_cols.min(term_cols.saturating_sub(8).max(1)),
        list_rows,
        status_row: term_rows.saturating_sub(1),
    }
}

impl Layout {
    pub fn card_h_px(&self) -> u32 {
        self.card_rows as u32 * self.cell_h as u32
    }

    pub fn vp_h_px(&self) -> u32 {
        self.list_rows as u32 * self.cell_h as u32
    }

    /// Pixel box a prepared thumbnail must fit into.
    pub fn thumb_box_px(&self) -> (u32, u32) {
        (
            self.thumb_cols as u32 * self.cell_w as u32,
            self.card_rows as u32 * self.cell_h as u32,
        )
    }
}

pub(super) struct ViewState {
    /// Scroll offset in pixels, kept on a cell-row boundary.
    pub y_offset: u32,
    /// Base instant for the per-card reveal stagger.
    pub page_rendered_at: Instant,
}

/// Maximum scroll offset for `count` cards.
pub(super) fn max_scroll(layout: &Layout, count: usize) -> u32 {
    let doc_h = layout.card_h_px() * count as u32;
    doc_h.saturating_sub(layout.vp_h_px())
}

/// Floor a pixel offset to the nearest cell-row boundary so card rows
/// land on whole terminal rows.
pub(super) fn snap_to_row(y: u32, cell_h: u16) -> u32 {
    y - y % cell_h.max(1) as u32
}

// ---------------------------------------------------------------------------
// LoadedThumbs — thumbnails transferred to the terminal
// ---------------------------------------------------------------------------

/// Track which card thumbnails are loaded in the terminal, keyed by
/// card index. Image data survives scrolling; placements are deleted
/// and re-issued on every redraw.
pub(super) struct LoadedThumbs {
    map: HashMap<usize, u32>,
    next_id: u32,
}

impl LoadedThumbs {
    pub(super) fn new() -> Self {
        Self {
            map: HashMap::new(),
            next_id: 100, // Reserve 1-99 for future use
        }
    }

    /// Ensure a card's PNG has been transferred; returns its image id.
    pub(super) fn ensure_transferred(&mut self, idx: usize, png: &[u8]) -> io::Result<u32> {
        if let Some(&id) = self.map.get(&idx) {
            return Ok(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        terminal::send_image(png, id)?;
        self.map.insert(idx, id);
        Ok(id)
    }

    /// Delete all placements (keep image data).
    pub(super) fn delete_placements(&self) -> io::Result<()> {
        for &id in self.map.values() {
            terminal::delete_image_placements(id)?;
        }
        Ok(())
    }

    /// Forget every transfer, after the terminal-side data has been
    /// wiped with `delete_all_images` (page change).
    pub(super) fn forget_all(&mut self) {
        self.map.clear();
    }
}

// ---------------------------------------------------------------------------
// Redraw
// ---------------------------------------------------------------------------

/// Everything the redraw needs besides the controller.
pub(super) struct RedrawCtx<'a> {
    pub layout: &'a Layout,
    pub state: &'a ViewState,
    pub host: &'a str,
    pub acc_peek: Option<u32>,
    pub flash: Option<&'a str>,
}

/// Full redraw: content region + status bar.
///
/// Returns false while some cards are still inside their stagger window
/// (the caller keeps the frame loop hot until everything is revealed).
pub(super) fn redraw(
    controller: &Controller,
    loaded: &mut LoadedThumbs,
    ctx: &RedrawCtx<'_>,
) -> anyhow::Result<bool> {
    let layout = ctx.layout;
    let mut all_revealed = true;

    terminal::clear_screen()?;

    match &controller.content {
        Content::Blank => {}
        Content::Empty(msg) | Content::Error(msg) => {
            terminal::draw_center_message(layout, msg)?;
        }
        Content::Cards(cards) if !cards.is_empty() => {
            loaded.delete_placements()?;

            let card_h = layout.card_h_px();
            let y = ctx.state.y_offset;
            let first = (y / card_h) as usize;
            let last = ((y + layout.vp_h_px().saturating_sub(1)) / card_h) as usize;
            let now = Instant::now();

            for idx in first..=last.min(cards.len().saturating_sub(1)) {
                let card = &cards[idx];
                if now < ctx.state.page_rendered_at + card.stagger {
                    all_revealed = false;
                    continue;
                }
                // Top row of this card relative to the list area; may be
                // negative when the card is partially scrolled off.
                let row = (idx as i64 * card_h as i64 - y as i64) / layout.cell_h as i64;
                terminal::draw_card(layout, row as i32, idx + 1, card)?;

                // Thumbnail placement only for fully visible cards; a
                // clipped image would spill over the status bar.
                let fully_visible =
                    row >= 0 && row + layout.card_rows as i64 <= layout.list_rows as i64;
                if fully_visible && card.image.state() == ImageState::Loaded {
                    if let Some(png) = &card.thumb_png {
                        let id = loaded.ensure_transferred(idx, png)?;
                        terminal::place_thumb(
                            id,
                            0,
                            row as u16,
                            layout.thumb_cols,
                            layout.card_rows,
                        )?;
                    }
                }
            }
        }
        Content::Cards(_) => {}
    }

    terminal::draw_status_bar(
        layout,
        ctx.host,
        &controller.controls,
        controller.total_items(),
        ctx.acc_peek,
        ctx.flash,
    )?;
    Ok(all_revealed)
}
