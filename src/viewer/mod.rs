//! Terminal gallery viewer with Kitty Graphics Protocol
//!
//! Layout:
//!   rows 0..term_rows-1 : card list (one card per `card_rows` rows,
//!                         thumbnail left, text right)
//!   row  term_rows-1    : status bar (pagination controls, key hints)
//!
//! Lazy thumbnail loading:
//!   Cards render immediately with their text; thumbnails are fetched
//!   only once a card scrolls within the preload margin of the
//!   viewport, one at a time, with a fixed pacing delay between loads.
//!   A single worker thread owns the network; the event loop owns the
//!   queue and all state.
//!
//! Kitty response suppression:
//!   All Kitty Graphics Protocol commands use `q=2` (suppress all
//!   responses). Without this, error responses are delivered as APC
//!   sequences that crossterm misparses as key events, causing phantom
//!   scrolling. Since the viewer never reads Kitty responses, this is
//!   always safe.

mod input;
mod state;
mod terminal;

use crossterm::{
    event::{self, Event},
    terminal as crossterm_terminal,
};
use log::{debug, info};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::controller::{Controller, PageOutcome};
use crate::loader::{self, HttpFetcher, ImageFetcher, ThumbSpec};
use crate::nav;
use crate::service::HttpService;

use input::{Action, InputAccumulator, map_key_event};
use state::{LoadedThumbs, RedrawCtx, ViewState};

/// Run the terminal viewer against a library URL (which may carry a
/// `?page=N` start page).
pub fn run(config: &Config, start_url: &str) -> anyhow::Result<()> {
    terminal::check_tty()?;

    let base = nav::service_base(start_url);
    let host = base
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .to_string();
    let service = HttpService::new(&base, config.request_timeout);

    // Terminal geometry first: thumbnail pixel boxes depend on it.
    let winsize = crossterm_terminal::window_size()
        .map_err(|e| anyhow::anyhow!("failed to get terminal size: {e}"))?;
    if winsize.width == 0 || winsize.height == 0 {
        anyhow::bail!(
            "terminal pixel size {}x{} is zero — Kitty graphics requires non-zero pixel dimensions",
            winsize.width,
            winsize.height
        );
    }
    let mut layout = state::compute_layout(
        winsize.columns,
        winsize.rows,
        winsize.width,
        winsize.height,
        &config.viewer,
    );

    let mut controller = Controller::new(
        start_url,
        &config.placeholder_url,
        config.preload_margin_px,
        config.visibility_threshold,
    );

    // Single fetch-and-decode worker; the loop never has more than one
    // request outstanding.
    let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpFetcher::new(config.request_timeout));
    let (req_tx, req_rx) = mpsc::channel();
    let (res_tx, res_rx) = mpsc::channel();
    let (box_w, box_h) = layout.thumb_box_px();
    let worker = loader::spawn_worker(
        req_rx,
        res_tx,
        fetcher,
        ThumbSpec {
            max_w: box_w,
            max_h: box_h,
        },
    );

    let mut guard = terminal::RawGuard::enter()?;

    let mut view = ViewState {
        y_offset: 0,
        page_rendered_at: Instant::now(),
    };
    let mut loaded = LoadedThumbs::new();
    let mut acc = InputAccumulator::new();
    let mut flash: Option<String> = None;
    let mut dirty = true;
    let mut last_render = Instant::now();
    // At most one image request in flight; pacing gates the next one.
    let mut awaiting_load = false;
    let mut next_dispatch_at: Option<Instant> = None;

    // Initial page, derived from the start URL.
    let start_page = controller.page();
    info!("viewer: initial load of page {start_page}");
    let outcome = controller.load_page(start_page, &service);
    after_page_change(
        &outcome,
        &mut controller,
        &layout,
        &mut view,
        &mut loaded,
        &req_tx,
        &mut awaiting_load,
    )?;

    loop {
        // Drain finished loads.
        while let Ok(result) = res_rx.try_recv() {
            awaiting_load = false;
            if controller.finish_load(result.epoch, result.card, result.png) {
                dirty = true;
            }
            if controller.is_draining() {
                // Fixed pacing delay before the next queue item.
                next_dispatch_at = Some(Instant::now() + config.pacing);
            } else {
                // Stale result from a superseded page: the new page's
                // queue may be waiting for the worker to free up.
                next_dispatch_at = None;
                drive_queue(
                    &mut controller,
                    &layout,
                    &view,
                    &req_tx,
                    &mut awaiting_load,
                );
            }
        }

        // Pacing deadline reached: dispatch the next queued load. A
        // deadline left over from a superseded drain (a page change
        // re-dispatched already) is simply dropped.
        if let Some(at) = next_dispatch_at {
            if Instant::now() >= at {
                next_dispatch_at = None;
                if !awaiting_load {
                    if let Some(d) = controller.dispatch_next() {
                        if req_tx.send(d).is_ok() {
                            awaiting_load = true;
                        }
                    }
                }
            }
        }

        let timeout = poll_timeout(
            dirty,
            last_render,
            config.viewer.frame_budget,
            next_dispatch_at,
        );

        if event::poll(timeout)? {
            let ev = event::read()?;
            debug!("event: {:?}", ev);

            let had_flash = flash.is_some();
            flash = None;

            match ev {
                Event::Key(key_event) => {
                    let scroll_step = config.viewer.scroll_step * layout.cell_h as u32;
                    let half_page = (layout.list_rows as u32 / 2).max(1) * layout.cell_h as u32;
                    let max_y = state::max_scroll(&layout, controller.card_count());

                    match map_key_event(key_event, &mut acc) {
                        Some(Action::Quit) => break,

                        Some(Action::CancelInput) => {
                            draw_status(&controller, &layout, &host, None, None)?;
                        }
                        Some(Action::Digit) => {
                            draw_status(&controller, &layout, &host, acc.peek(), None)?;
                        }

                        Some(Action::ScrollDown(count)) => {
                            view.y_offset = state::snap_to_row(
                                (view.y_offset + count * scroll_step).min(max_y),
                                layout.cell_h,
                            );
                            dirty = true;
                        }
                        Some(Action::ScrollUp(count)) => {
                            view.y_offset = view.y_offset.saturating_sub(count * scroll_step);
                            dirty = true;
                        }
                        Some(Action::HalfPageDown(count)) => {
                            view.y_offset = state::snap_to_row(
                                (view.y_offset + count * half_page).min(max_y),
                                layout.cell_h,
                            );
                            dirty = true;
                        }
                        Some(Action::HalfPageUp(count)) => {
                            view.y_offset = view.y_offset.saturating_sub(count * half_page);
                            dirty = true;
                        }
                        Some(Action::JumpToTop) => {
                            view.y_offset = 0;
                            dirty = true;
                        }
                        Some(Action::JumpToBottom) => {
                            view.y_offset = state::snap_to_row(max_y, layout.cell_h);
                            dirty = true;
                        }

                        Some(Action::NextPage) => {
                            if let Some(outcome) = controller.next_page(&service) {
                                after_page_change(
                                    &outcome,
                                    &mut controller,
                                    &layout,
                                    &mut view,
                                    &mut loaded,
                                    &req_tx,
                                    &mut awaiting_load,
                                )?;
                                dirty = true;
                            }
                        }
                        Some(Action::PrevPage) => {
                            if let Some(outcome) = controller.prev_page(&service) {
                                after_page_change(
                                    &outcome,
                                    &mut controller,
                                    &layout,
                                    &mut view,
                                    &mut loaded,
                                    &req_tx,
                                    &mut awaiting_load,
                                )?;
                                dirty = true;
                            } else {
                                flash = Some("Already on the first page".into());
                                draw_status(&controller, &layout, &host, None, flash.as_deref())?;
                            }
                        }
                        Some(Action::GoToPage(n)) => {
                            if !controller.is_loading() {
                                let outcome = controller.load_page(n, &service);
                                after_page_change(
                                    &outcome,
                                    &mut controller,
                                    &layout,
                                    &mut view,
                                    &mut loaded,
                                    &req_tx,
                                    &mut awaiting_load,
                                )?;
                                dirty = true;
                            }
                        }
                        Some(Action::Reload) => {
                            let page = controller.page();
                            if !controller.is_loading() {
                                let outcome = controller.load_page(page, &service);
                                after_page_change(
                                    &outcome,
                                    &mut controller,
                                    &layout,
                                    &mut view,
                                    &mut loaded,
                                    &req_tx,
                                    &mut awaiting_load,
                                )?;
                                dirty = true;
                            }
                        }

                        Some(Action::HistoryBack) => {
                            match controller.history_back(&service) {
                                Some(outcome) => {
                                    after_page_change(
                                        &outcome,
                                        &mut controller,
                                        &layout,
                                        &mut view,
                                        &mut loaded,
                                        &req_tx,
                                        &mut awaiting_load,
                                    )?;
                                    dirty = true;
                                }
                                None => {
                                    flash = Some("No earlier history".into());
                                    draw_status(
                                        &controller,
                                        &layout,
                                        &host,
                                        None,
                                        flash.as_deref(),
                                    )?;
                                }
                            }
                        }
                        Some(Action::HistoryForward) => {
                            match controller.history_forward(&service) {
                                Some(outcome) => {
                                    after_page_change(
                                        &outcome,
                                        &mut controller,
                                        &layout,
                                        &mut view,
                                        &mut loaded,
                                        &req_tx,
                                        &mut awaiting_load,
                                    )?;
                                    dirty = true;
                                }
                                None => {
                                    flash = Some("No later history".into());
                                    draw_status(
                                        &controller,
                                        &layout,
                                        &host,
                                        None,
                                        flash.as_deref(),
                                    )?;
                                }
                            }
                        }

                        Some(Action::OpenShare(n)) => {
                            let card = n
                                .checked_sub(1)
                                .and_then(|i| controller.cards().get(i as usize));
                            flash = Some(match card {
                                Some(card) => {
                                    debug!("open share link {}", card.share_link);
                                    match open::that_detached(&card.share_link) {
                                        Ok(()) => format!("Opened share link {n}"),
                                        Err(e) => format!("Open failed: {e}"),
                                    }
                                }
                                None => format!("No card {n} on this page"),
                            });
                            draw_status(&controller, &layout, &host, None, flash.as_deref())?;
                        }
                        Some(Action::OpenSharePrompt) => {
                            flash = Some("Type No to open card N's share link".into());
                            draw_status(&controller, &layout, &host, acc.peek(), flash.as_deref())?;
                        }
                        Some(Action::YankShare(n)) => {
                            let card = n
                                .checked_sub(1)
                                .and_then(|i| controller.cards().get(i as usize));
                            flash = Some(match card {
                                Some(card) => {
                                    if let Err(e) = terminal::send_osc52(&card.share_link) {
                                        debug!("OSC 52 failed: {e}");
                                    }
                                    format!("Yanked share link {n}")
                                }
                                None => format!("No card {n} on this page"),
                            });
                            draw_status(&controller, &layout, &host, None, flash.as_deref())?;
                        }
                        Some(Action::YankSharePrompt) => {
                            flash = Some("Type Ny to yank card N's share link".into());
                            draw_status(&controller, &layout, &host, acc.peek(), flash.as_deref())?;
                        }

                        None => {
                            // Unknown key: reset accumulator
                            if acc.is_active() {
                                acc.reset();
                                draw_status(&controller, &layout, &host, None, None)?;
                            } else if had_flash {
                                draw_status(&controller, &layout, &host, None, None)?;
                            }
                        }
                    }
                }

                Event::Resize(new_cols, new_rows) => {
                    let new_winsize = crossterm_terminal::window_size()?;
                    layout = state::compute_layout(
                        new_cols,
                        new_rows,
                        new_winsize.width,
                        new_winsize.height,
                        &config.viewer,
                    );
                    view.y_offset = state::snap_to_row(
                        view.y_offset
                            .min(state::max_scroll(&layout, controller.card_count())),
                        layout.cell_h,
                    );
                    debug!("resize: {new_cols}x{new_rows}");
                    dirty = true;
                }

                _ => {}
            }
            continue;
        }

        // poll timeout → frame budget elapsed, execute redraw
        if dirty {
            let ctx = RedrawCtx {
                layout: &layout,
                state: &view,
                host: &host,
                acc_peek: acc.peek(),
                flash: flash.as_deref(),
            };
            let all_revealed = state::redraw(&controller, &mut loaded, &ctx)?;
            // Visibility follows every repaint: newly exposed cards are
            // queued and the drain (re)started.
            drive_queue(
                &mut controller,
                &layout,
                &view,
                &req_tx,
                &mut awaiting_load,
            );
            dirty = !all_revealed;
            last_render = Instant::now();
        }
    }

    guard.cleanup();
    drop(req_tx);
    let _ = worker.join();
    Ok(())
}

/// Reset view state after any page transition: scroll to top, wipe
/// terminal images, restart the stagger clock, kick off visibility.
fn after_page_change(
    outcome: &PageOutcome,
    controller: &mut Controller,
    layout: &state::Layout,
    view: &mut ViewState,
    loaded: &mut LoadedThumbs,
    req_tx: &mpsc::Sender<crate::controller::Dispatch>,
    awaiting_load: &mut bool,
) -> anyhow::Result<()> {
    if *outcome == PageOutcome::Suppressed {
        return Ok(());
    }
    view.y_offset = 0;
    view.page_rendered_at = Instant::now();
    terminal::delete_all_images()?;
    loaded.forget_all();
    drive_queue(controller, layout, view, req_tx, awaiting_load);
    Ok(())
}

/// Visibility scan + drain start. Sends at most one dispatch, and only
/// when no load is already in flight.
fn drive_queue(
    controller: &mut Controller,
    layout: &state::Layout,
    view: &ViewState,
    req_tx: &mpsc::Sender<crate::controller::Dispatch>,
    awaiting_load: &mut bool,
) {
    controller.scan_viewport(layout.card_h_px(), view.y_offset, layout.vp_h_px());
    if *awaiting_load {
        return;
    }
    if let Some(d) = controller.start_drain() {
        if req_tx.send(d).is_ok() {
            *awaiting_load = true;
        }
    }
}

fn draw_status(
    controller: &Controller,
    layout: &state::Layout,
    host: &str,
    acc_peek: Option<u32>,
    flash: Option<&str>,
) -> std::io::Result<()> {
    terminal::draw_status_bar(
        layout,
        host,
        &controller.controls,
        controller.total_items(),
        acc_peek,
        flash,
    )
}

/// Event-poll timeout: frame budget while dirty, pacing deadline while
/// a dispatch is pending, otherwise effectively forever.
fn poll_timeout(
    dirty: bool,
    last_render: Instant,
    frame_budget: Duration,
    next_dispatch_at: Option<Instant>,
) -> Duration {
    let mut timeout = Duration::from_secs(86400);
    if dirty {
        timeout = frame_budget.saturating_sub(last_render.elapsed());
    }
    if let Some(at) = next_dispatch_at {
        timeout = timeout.min(at.saturating_duration_since(Instant::now()));
    }
    timeout
}
