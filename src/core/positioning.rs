//! Placement of the floating chat button and its panel.
//!
//! The button can be dragged anywhere inside the viewport, keeping a 15px margin. The panel
//! is never dragged on its own: it opens next to the button, towards the side with more
//! room, and is then pushed inside an 8px inset.

use crate::infrastructure::traits::PositionStore;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const EDGE_MARGIN: f64 = 15.0;
pub const PANEL_INSET: f64 = 8.0;
pub const NARROW_MAX_WIDTH: f64 = 768.0;
const DEFAULT_CORNER_OFFSET: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Viewport { width, height }
    }

    pub fn is_narrow(&self) -> bool {
        self.width <= NARROW_MAX_WIDTH
    }

    /// Diameter of the round button.
    pub fn control_size(&self) -> f64 {
        if self.is_narrow() { 56.0 } else { 64.0 }
    }
}

/// Top-left corner of the button, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WidgetPosition {
    pub x: f64,
    pub y: f64,
}

impl WidgetPosition {
    pub fn new(x: f64, y: f64) -> Self {
        WidgetPosition { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

// the lower bound wins when the viewport is too small for the range
fn clamp_axis(value: f64, min: f64, max: f64) -> f64 {
    value.min(max).max(min)
}

pub fn clamp_control(position: WidgetPosition, viewport: Viewport) -> WidgetPosition {
    let size = viewport.control_size();
    WidgetPosition {
        x: clamp_axis(position.x, EDGE_MARGIN, viewport.width - size - EDGE_MARGIN),
        y: clamp_axis(position.y, EDGE_MARGIN, viewport.height - size - EDGE_MARGIN),
    }
}

/// Bottom-right corner.
pub fn default_position(viewport: Viewport) -> WidgetPosition {
    let size = viewport.control_size();
    clamp_control(
        WidgetPosition {
            x: viewport.width - size - DEFAULT_CORNER_OFFSET,
            y: viewport.height - size - DEFAULT_CORNER_OFFSET,
        },
        viewport,
    )
}

/// Reads a persisted position. Anything unusable counts as absent.
pub fn parse_position(raw: &str) -> Option<WidgetPosition> {
    match serde_json::from_str::<WidgetPosition>(raw) {
        Ok(position) if position.x.is_finite() && position.y.is_finite() => Some(position),
        Ok(position) => {
            debug!("ignoring non-finite widget position {position:?}");
            None
        }
        Err(e) => {
            debug!("ignoring malformed widget position: {e}");
            None
        }
    }
}

pub fn panel_size(viewport: Viewport) -> (f64, f64) {
    let (max_width, max_height, height_reserve) = if viewport.is_narrow() {
        (320.0, 480.0, 100.0)
    } else {
        (384.0, 500.0, 32.0)
    };
    let width = f64::min(max_width, viewport.width - 32.0).max(0.0);
    let height = f64::min(max_height, viewport.height - height_reserve).max(0.0);
    (width, height)
}

pub fn place_panel(control: WidgetPosition, viewport: Viewport) -> PanelRect {
    let size = viewport.control_size();
    let (width, height) = panel_size(viewport);
    let on_right_half = control.x > viewport.width / 2.0;

    let beside = if on_right_half {
        control.x - width - PANEL_INSET
    } else {
        control.x + size + PANEL_INSET
    };

    let (x, y) = if viewport.is_narrow() {
        if control.y > height + PANEL_INSET + size {
            // room above: open upwards, centred on the button
            (
                control.x - width / 2.0 + size / 2.0,
                control.y - height - PANEL_INSET,
            )
        } else {
            (beside, control.y)
        }
    } else if control.y > viewport.height - height - PANEL_INSET {
        // bottom edges aligned
        (beside, control.y - height + size)
    } else {
        (beside, control.y)
    };

    PanelRect {
        x: clamp_axis(x, PANEL_INSET, viewport.width - width - PANEL_INSET),
        y: clamp_axis(y, PANEL_INSET, viewport.height - height - PANEL_INSET),
        width,
        height,
    }
}

/// A pointer sample from the mouse or a touch screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pointer {
    Mouse { button: u16, x: f64, y: f64 },
    Touch { touches: usize, x: f64, y: f64 },
}

impl Pointer {
    fn point(&self) -> (f64, f64) {
        match *self {
            Pointer::Mouse { x, y, .. } | Pointer::Touch { x, y, .. } => (x, y),
        }
    }

    /// Primary mouse button or a single finger.
    fn can_drag(&self) -> bool {
        match *self {
            Pointer::Mouse { button, .. } => button == 0,
            Pointer::Touch { touches, .. } => touches == 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        /// Pointer offset from the button corner at grab time.
        grab_x: f64,
        grab_y: f64,
        moved: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragRelease {
    /// Pressed and released without moving.
    Click,
    Dragged,
    /// There was no drag in progress.
    Ignored,
}

pub struct PositioningEngine {
    store: Arc<dyn PositionStore>,
    viewport: Viewport,
    /// Where the user put the button, before clamping to the current viewport.
    preferred: WidgetPosition,
    position: WidgetPosition,
    drag: DragState,
}

impl PositioningEngine {
    /// Restores the persisted position, or computes and persists the default one.
    pub fn mount(store: Arc<dyn PositionStore>, viewport: Viewport) -> Self {
        let restored = store.load().as_deref().and_then(parse_position);

        let mut engine = PositioningEngine {
            store,
            viewport,
            preferred: restored.unwrap_or_else(|| default_position(viewport)),
            position: default_position(viewport),
            drag: DragState::Idle,
        };
        engine.position = clamp_control(engine.preferred, viewport);
        if restored.is_none() {
            engine.persist();
        }
        engine
    }

    pub fn position(&self) -> WidgetPosition {
        self.position
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    pub fn panel(&self) -> PanelRect {
        place_panel(self.position, self.viewport)
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        let anchor = if self.is_dragging() {
            self.position
        } else {
            self.preferred
        };
        self.position = clamp_control(anchor, viewport);
    }

    /// Returns `true` if a drag started.
    pub fn pointer_down(&mut self, pointer: Pointer) -> bool {
        if self.is_dragging() || !pointer.can_drag() {
            return false;
        }
        let (x, y) = pointer.point();
        self.drag = DragState::Dragging {
            grab_x: x - self.position.x,
            grab_y: y - self.position.y,
            moved: false,
        };
        true
    }

    pub fn pointer_move(&mut self, pointer: Pointer) {
        let DragState::Dragging {
            grab_x,
            grab_y,
            moved,
        } = self.drag
        else {
            return;
        };
        if let Pointer::Touch { touches, .. } = pointer {
            if touches != 1 {
                return;
            }
        }

        let (x, y) = pointer.point();
        let next = clamp_control(WidgetPosition::new(x - grab_x, y - grab_y), self.viewport);
        self.drag = DragState::Dragging {
            grab_x,
            grab_y,
            moved: moved || next != self.position,
        };
        self.position = next;
    }

    /// Ends the drag and persists where the button was dropped.
    pub fn pointer_up(&mut self) -> DragRelease {
        let DragState::Dragging { moved, .. } = self.drag else {
            return DragRelease::Ignored;
        };
        self.drag = DragState::Idle;
        self.preferred = self.position;
        self.persist();

        if moved {
            DragRelease::Dragged
        } else {
            DragRelease::Click
        }
    }

    fn persist(&self) {
        let raw = match serde_json::to_string(&self.preferred) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("could not serialize widget position: {e}");
                return;
            }
        };
        if let Err(e) = self.store.save(&raw) {
            warn!("could not persist widget position: {e}");
        }
    }
}
