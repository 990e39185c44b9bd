//! Visibility detection: which card images are close enough to the
//! viewport to justify loading their thumbnails.
//!
//! Pure pixel geometry over the virtual card column — no terminal I/O,
//! so preload decisions are testable headless. An image is reported
//! when at least `threshold` of its area lies within the viewport
//! extended by `margin_px` on the block axis. There is no inline-axis
//! margin: cards span the full width, so the inline overlap is always
//! total.

/// Vertical extent of the card column: `count` cards of `card_h` px.
#[derive(Debug, Clone, Copy)]
pub struct ColumnGeometry {
    pub card_h: u32,
    pub count: usize,
}

impl ColumnGeometry {
    pub fn total_height(&self) -> u32 {
        self.card_h * self.count as u32
    }

    /// Pixel span `[y0, y1)` of card `idx`.
    pub fn card_span(&self, idx: usize) -> (u32, u32) {
        let y0 = idx as u32 * self.card_h;
        (y0, y0 + self.card_h)
    }
}

/// Watches registered card images for proximity to the viewport.
///
/// The margin/threshold configuration persists across pages; the
/// registration list is re-armed when a page's cards are replaced.
#[derive(Debug)]
pub struct Watcher {
    margin_px: u32,
    threshold: f32,
    watched: Vec<usize>,
}

impl Watcher {
    pub fn new(margin_px: u32, threshold: f32) -> Self {
        Self {
            margin_px,
            threshold,
            watched: Vec::new(),
        }
    }

    /// Register a card image for visibility tracking.
    pub fn watch(&mut self, idx: usize) {
        self.watched.push(idx);
    }

    /// Drop all registrations (the cards left the document).
    pub fn rearm(&mut self) {
        self.watched.clear();
    }

    pub fn watched(&self) -> &[usize] {
        &self.watched
    }

    /// Indices of watched cards whose visible fraction within the
    /// extended viewport meets the threshold, in registration order.
    pub fn intersecting(&self, geom: &ColumnGeometry, y_offset: u32, vp_h: u32) -> Vec<usize> {
        if geom.card_h == 0 {
            return Vec::new();
        }
        let root_top = y_offset.saturating_sub(self.margin_px);
        let root_bot = y_offset.saturating_add(vp_h).saturating_add(self.margin_px);

        self.watched
            .iter()
            .copied()
            .filter(|&idx| {
                let (y0, y1) = geom.card_span(idx);
                let overlap = y1.min(root_bot).saturating_sub(y0.max(root_top));
                overlap as f32 / geom.card_h as f32 >= self.threshold
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher_with(count: usize, margin: u32, threshold: f32) -> Watcher {
        let mut w = Watcher::new(margin, threshold);
        for i in 0..count {
            w.watch(i);
        }
        w
    }

    const GEOM: ColumnGeometry = ColumnGeometry { card_h: 100, count: 10 };

    #[test]
    fn fully_visible_cards_intersect() {
        let w = watcher_with(10, 50, 0.1);
        // Viewport shows cards 0..3 fully.
        let hits = w.intersecting(&GEOM, 0, 300);
        assert!(hits.contains(&0));
        assert!(hits.contains(&2));
    }

    #[test]
    fn margin_pulls_in_below_fold_card() {
        let w = watcher_with(10, 50, 0.1);
        // Card 3 spans 300..400; the viewport ends at 300 but the 50px
        // margin reaches to 350, covering half the card.
        let hits = w.intersecting(&GEOM, 0, 300);
        assert!(hits.contains(&3));
        // Card 4 (400..500) is past the margin entirely.
        assert!(!hits.contains(&4));
    }

    #[test]
    fn margin_reaches_above_viewport() {
        let w = watcher_with(10, 50, 0.1);
        // Scrolled to 200: margin covers 150..; card 1 (100..200) has
        // its bottom 50px inside — 50% visible.
        let hits = w.intersecting(&GEOM, 200, 300);
        assert!(hits.contains(&1));
        assert!(!hits.contains(&0));
    }

    #[test]
    fn threshold_excludes_slivers() {
        // No margin, 10% threshold: card 3 (300..400) with only 5px
        // inside the viewport is below threshold.
        let w = watcher_with(10, 0, 0.1);
        let hits = w.intersecting(&GEOM, 0, 305);
        assert!(!hits.contains(&3));
        // 10px inside is exactly 10% — included.
        let hits = w.intersecting(&GEOM, 0, 310);
        assert!(hits.contains(&3));
    }

    #[test]
    fn rearm_clears_registrations() {
        let mut w = watcher_with(10, 50, 0.1);
        w.rearm();
        assert!(w.intersecting(&GEOM, 0, 1000).is_empty());
    }

    #[test]
    fn unwatched_cards_never_reported() {
        let mut w = Watcher::new(50, 0.1);
        w.watch(7);
        let hits = w.intersecting(&GEOM, 0, 1000);
        assert_eq!(hits, vec![7]);
    }
}
