//! Presentation helpers for the popup: clipping long text to a few rows and
//! moving the box by its header.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clip {
    /// Natural height is taller than `max_rows` lines.
    pub overflowing: bool,
    /// Height to display with the current expand state.
    pub height: f32,
}

/// Collapsible block of text. The expand flag belongs to whoever renders it;
/// `new` is the uncontrolled default (collapsed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collapsible {
    pub max_rows: usize,
    pub expanded: bool,
}

impl Collapsible {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows, expanded: false }
    }

    pub fn controlled(max_rows: usize, expanded: Option<bool>) -> Self {
        Self { max_rows, expanded: expanded.unwrap_or(false) }
    }

    pub fn max_height(&self, line_height: f32) -> f32 {
        self.max_rows as f32 * line_height
    }

    pub fn measure(&self, content_height: f32, line_height: f32) -> Clip {
        let max = self.max_height(line_height);
        // Half a pixel of slack so exactly `max_rows` lines never count as overflow.
        let overflowing = line_height > 0.0 && content_height > max + 0.5;
        let height = if overflowing && !self.expanded { max } else { content_height };
        Clip { overflowing, height }
    }

    pub fn toggle(&mut self) -> bool {
        self.expanded = !self.expanded;
        self.expanded
    }

    pub fn toggle_label(&self) -> &'static str {
        if self.expanded {
            "收起"
        } else {
            "展开"
        }
    }
}

/// Height of the grab strip at the top of the popup.
pub const HANDLE_HEIGHT: f32 = 36.0;

/// Press / drag / release bookkeeping for a box moved by its top strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragTracker {
    pub handle_height: f32,
    pressed: bool,
    dragging: bool,
    grab: Point,
}

impl Default for DragTracker {
    fn default() -> Self {
        Self::new(HANDLE_HEIGHT)
    }
}

impl DragTracker {
    pub fn new(handle_height: f32) -> Self {
        Self { handle_height, pressed: false, dragging: false, grab: Point::default() }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Starts tracking when `pointer` lands in the handle strip of `bounds`.
    pub fn press(&mut self, pointer: Point, bounds: Bounds) -> bool {
        let in_handle = bounds.contains(pointer) && pointer.y - bounds.top <= self.handle_height;
        if !in_handle {
            return false;
        }
        self.pressed = true;
        self.dragging = false;
        self.grab = Point::new(pointer.x - bounds.left, pointer.y - bounds.top);
        true
    }

    /// New top-left so the grab point stays under the pointer.
    pub fn drag_to(&mut self, pointer: Point) -> Option<Point> {
        if !self.pressed {
            return None;
        }
        self.dragging = true;
        Some(Point::new(pointer.x - self.grab.x, pointer.y - self.grab.y))
    }

    /// Returns whether a press was active.
    pub fn release(&mut self) -> bool {
        let was = self.pressed;
        self.pressed = false;
        self.dragging = false;
        was
    }
}
