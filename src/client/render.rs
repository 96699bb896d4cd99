//! Lazy render scheduling for one page of images.
//!
//! Each image gets a fixed-size placeholder slot in a grid. A slot starts
//! loading the first time it comes within a margin of the viewport and never
//! goes back, so scrolling away and returning does not re-download anything.
//!
//! Geometry is queried through [`ViewportProbe`], which keeps the scheduler
//! independent of whatever draws the grid.

use tracing::{debug, trace};

use crate::config::DEFAULT_LOOKAHEAD_PX;

/// Placeholder width reported until an image is decoded.
pub const PLACEHOLDER_WIDTH: f32 = 240.0;
/// Placeholder height reported until an image is decoded.
pub const PLACEHOLDER_HEIGHT: f32 = 240.0;

/// Axis-aligned rectangle in content coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Answers whether a slot is close enough to the visible area to load.
pub trait ViewportProbe {
    /// True if `bounds` intersects the viewport expanded by `margin` along
    /// the scroll axis.
    fn is_near_viewport(&self, bounds: &Rect, margin: f32) -> bool;

    /// Distance from the visible area, used to load the closest slots first.
    fn distance(&self, _bounds: &Rect) -> f32 {
        0.0
    }
}

/// A vertically scrolling viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollViewport {
    pub scroll_offset: f32,
    pub width: f32,
    pub height: f32,
}

impl ScrollViewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            scroll_offset: 0.0,
            width,
            height,
        }
    }

    pub fn scrolled_to(mut self, offset: f32) -> Self {
        self.scroll_offset = offset.max(0.0);
        self
    }
}

impl ViewportProbe for ScrollViewport {
    fn is_near_viewport(&self, bounds: &Rect, margin: f32) -> bool {
        let top = self.scroll_offset - margin;
        let bottom = self.scroll_offset + self.height + margin;
        bounds.y < bottom && bounds.bottom() > top && bounds.x < self.width && bounds.right() > 0.0
    }

    fn distance(&self, bounds: &Rect) -> f32 {
        let top = self.scroll_offset;
        let bottom = self.scroll_offset + self.height;
        if bounds.bottom() <= top {
            top - bounds.bottom()
        } else if bounds.y >= bottom {
            bounds.y - bottom
        } else {
            0.0
        }
    }
}

/// Grid geometry for placeholder slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub columns: usize,
    pub cell_width: f32,
    pub cell_height: f32,
    pub gap: f32,
}

impl GridLayout {
    /// Fits as many placeholder columns as `viewport_width` allows.
    pub fn for_width(viewport_width: f32) -> Self {
        let layout = Self::default();
        let stride = layout.cell_width + layout.gap;
        let columns = ((viewport_width + layout.gap) / stride).floor().max(1.0) as usize;
        Self { columns, ..layout }
    }

    pub fn bounds(&self, index: usize) -> Rect {
        let row = index / self.columns;
        let col = index % self.columns;
        Rect::new(
            col as f32 * (self.cell_width + self.gap),
            row as f32 * (self.cell_height + self.gap),
            self.cell_width,
            self.cell_height,
        )
    }

    /// Total scrollable height of `count` slots.
    pub fn content_height(&self, count: usize) -> f32 {
        let rows = count.div_ceil(self.columns);
        if rows == 0 {
            return 0.0;
        }
        rows as f32 * self.cell_height + (rows - 1) as f32 * self.gap
    }
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            columns: 3,
            cell_width: PLACEHOLDER_WIDTH,
            cell_height: PLACEHOLDER_HEIGHT,
            gap: 8.0,
        }
    }
}

/// Lifecycle of one slot. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Pending,
    VisibleLoading,
    VisibleLoaded,
    /// Download or decode failed; never retried for this page.
    Failed,
}

#[derive(Debug, Clone)]
pub struct RenderSlot {
    pub index: usize,
    pub url: String,
    pub bounds: Rect,
    pub state: SlotState,
    /// Decoded pixel size, set once loaded.
    pub image_size: Option<(u32, u32)>,
}

impl RenderSlot {
    /// Size to reserve on screen: the image's own once decoded, otherwise
    /// the placeholder's.
    pub fn display_size(&self) -> (f32, f32) {
        match (self.state, self.image_size) {
            (SlotState::VisibleLoaded, Some((w, h))) => (w as f32, h as f32),
            _ => (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT),
        }
    }
}

/// A slot that just entered the look-ahead area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Page generation the slot belongs to.
    pub generation: u64,
    pub index: usize,
    pub url: String,
}

pub struct RenderScheduler {
    layout: GridLayout,
    margin: f32,
    generation: u64,
    slots: Vec<RenderSlot>,
}

impl RenderScheduler {
    pub fn new(layout: GridLayout) -> Self {
        Self::with_margin(layout, DEFAULT_LOOKAHEAD_PX)
    }

    pub fn with_margin(layout: GridLayout, margin: f32) -> Self {
        Self {
            layout,
            margin,
            generation: 0,
            slots: Vec::new(),
        }
    }

    /// Replaces all slots with a fresh `Pending` slot per URL and returns the
    /// new page generation. Completions for older generations are ignored.
    pub fn set_page(&mut self, urls: Vec<String>) -> u64 {
        self.generation += 1;
        self.slots = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| RenderSlot {
                index,
                url,
                bounds: self.layout.bounds(index),
                state: SlotState::Pending,
                image_size: None,
            })
            .collect();
        debug!(
            generation = self.generation,
            slots = self.slots.len(),
            "Laid out page"
        );
        self.generation
    }

    pub fn clear(&mut self) {
        self.set_page(Vec::new());
    }

    /// Moves every pending slot near the viewport to `VisibleLoading` and
    /// returns their load requests, closest first.
    pub fn poll(&mut self, probe: &impl ViewportProbe) -> Vec<LoadRequest> {
        let mut triggered: Vec<(f32, LoadRequest)> = Vec::new();
        for slot in &mut self.slots {
            if slot.state != SlotState::Pending {
                continue;
            }
            if !probe.is_near_viewport(&slot.bounds, self.margin) {
                continue;
            }
            slot.state = SlotState::VisibleLoading;
            triggered.push((
                probe.distance(&slot.bounds),
                LoadRequest {
                    generation: self.generation,
                    index: slot.index,
                    url: slot.url.clone(),
                },
            ));
        }
        triggered.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.index.cmp(&b.1.index)));
        if !triggered.is_empty() {
            trace!(count = triggered.len(), "Slots entered look-ahead area");
        }
        triggered.into_iter().map(|(_, req)| req).collect()
    }

    /// Records a decoded image. Returns false if the completion is stale or
    /// the slot is not loading.
    pub fn mark_loaded(&mut self, generation: u64, index: usize, size: (u32, u32)) -> bool {
        match self.loading_slot(generation, index) {
            Some(slot) => {
                slot.state = SlotState::VisibleLoaded;
                slot.image_size = Some(size);
                true
            }
            None => false,
        }
    }

    pub fn mark_failed(&mut self, generation: u64, index: usize) -> bool {
        match self.loading_slot(generation, index) {
            Some(slot) => {
                slot.state = SlotState::Failed;
                true
            }
            None => false,
        }
    }

    fn loading_slot(&mut self, generation: u64, index: usize) -> Option<&mut RenderSlot> {
        if generation != self.generation {
            trace!(generation, current = self.generation, "Dropped stale completion");
            return None;
        }
        self.slots
            .get_mut(index)
            .filter(|slot| slot.state == SlotState::VisibleLoading)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn slots(&self) -> &[RenderSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&RenderSlot> {
        self.slots.get(index)
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn content_height(&self) -> f32 {
        self.layout.content_height(self.slots.len())
    }

    /// Number of slots in each state, in declaration order.
    pub fn counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for slot in &self.slots {
            let i = match slot.state {
                SlotState::Pending => 0,
                SlotState::VisibleLoading => 1,
                SlotState::VisibleLoaded => 2,
                SlotState::Failed => 3,
            };
            counts[i] += 1;
        }
        counts
    }
}
