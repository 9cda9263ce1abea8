//! Selection geometry and the capture controller state machine.
//!
//! Everything here is independent of the windowing toolkit: the overlay feeds
//! pointer and key events in overlay-local pixel coordinates and acts on the
//! returned [`Effect`]s.
//!
//! ```text
//! Idle --PointerDown--> Selecting --PointerUp / Enter--> (Capture?) Close
//!   \                        |
//!    \------- Escape --------+--> Close
//! ```

use crate::capture::MonitorDescriptor;

/// Gap between the selection edge and the size readout.
const LABEL_GAP: i32 = 6;

/// A point in overlay-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle with its origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    /// Returns true if the region covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns the region shifted by the monitor origin.
    pub fn to_absolute(self, monitor: &MonitorDescriptor) -> Region {
        Region {
            x: self.x + monitor.x,
            y: self.y + monitor.y,
            ..self
        }
    }

    /// Normalizes the region so that width and height are never negative.
    ///
    /// Normalizing an already normalized region returns it unchanged.
    pub fn normalized(self) -> Region {
        SelectionRect::new(
            Point::new(self.x, self.y),
            Point::new(self.x + self.width, self.y + self.height),
        )
        .normalized()
    }
}

/// The raw drag rectangle: where the drag began and where the pointer is now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRect {
    pub anchor: Point,
    pub current: Point,
}

impl SelectionRect {
    pub fn new(anchor: Point, current: Point) -> Self {
        Self { anchor, current }
    }

    /// A drag that never left its starting point.
    pub fn is_degenerate(&self) -> bool {
        self.anchor == self.current
    }

    /// Min/max per axis.
    pub fn normalized(&self) -> Region {
        let min_x = self.anchor.x.min(self.current.x);
        let min_y = self.anchor.y.min(self.current.y);
        let max_x = self.anchor.x.max(self.current.x);
        let max_y = self.anchor.y.max(self.current.y);
        Region {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

/// Where the `W × H` readout goes relative to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPlacement {
    /// Top-left corner of the label.
    pub origin: Point,
    /// True when the label had to be flipped inside the selection.
    pub inside: bool,
}

/// Places the size readout just above the selection, or at the inside bottom
/// of the selection when it would render above the top edge of the overlay.
pub fn size_label_placement(selection: Region, label_height: i32) -> LabelPlacement {
    let above = selection.y - LABEL_GAP - label_height;
    if above >= 0 {
        LabelPlacement {
            origin: Point::new(selection.x, above),
            inside: false,
        }
    } else {
        LabelPlacement {
            origin: Point::new(
                selection.x + LABEL_GAP,
                selection.y + selection.height - LABEL_GAP - label_height,
            ),
            inside: true,
        }
    }
}

/// Text of the size readout.
pub fn size_label_text(selection: Region) -> String {
    format!("{} × {}", selection.width, selection.height)
}

/// Keys the overlay cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    Other,
}

/// Input delivered by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp(Point),
    Key(Key),
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The overlay must be repainted.
    Redraw,
    /// Capture this region, in absolute screen coordinates.
    Capture(Region),
    /// Close the overlay.
    Close,
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Selecting(SelectionRect),
}

impl CaptureState {
    /// The rectangle being dragged, if any.
    pub fn selection(&self) -> Option<SelectionRect> {
        match self {
            CaptureState::Idle => None,
            CaptureState::Selecting(rect) => Some(*rect),
        }
    }
}

/// Pure transition function of the capture controller.
pub fn transition(
    state: CaptureState,
    event: InputEvent,
    monitor: &MonitorDescriptor,
) -> (CaptureState, Vec<Effect>) {
    match (state, event) {
        (_, InputEvent::Key(Key::Escape)) => (CaptureState::Idle, vec![Effect::Close]),

        (_, InputEvent::PointerDown(p)) => (
            CaptureState::Selecting(SelectionRect::new(p, p)),
            vec![Effect::Redraw],
        ),

        (CaptureState::Selecting(rect), InputEvent::PointerMove(p)) => (
            CaptureState::Selecting(SelectionRect::new(rect.anchor, p)),
            vec![Effect::Redraw],
        ),

        (CaptureState::Selecting(rect), InputEvent::PointerUp(p)) => {
            finish(SelectionRect::new(rect.anchor, p), monitor)
        }

        (CaptureState::Selecting(rect), InputEvent::Key(Key::Enter)) if !rect.is_degenerate() => {
            finish(rect, monitor)
        }

        (state, _) => (state, Vec::new()),
    }
}

fn finish(rect: SelectionRect, monitor: &MonitorDescriptor) -> (CaptureState, Vec<Effect>) {
    let mut effects = Vec::with_capacity(2);
    if !rect.is_degenerate() {
        let region = rect.normalized().to_absolute(monitor);
        if !region.is_empty() {
            effects.push(Effect::Capture(region));
        }
    }
    effects.push(Effect::Close);
    (CaptureState::Idle, effects)
}

/// Stateful wrapper around [`transition`] bound to one monitor.
#[derive(Debug, Clone)]
pub struct CaptureController {
    monitor: MonitorDescriptor,
    state: CaptureState,
}

impl CaptureController {
    pub fn new(monitor: MonitorDescriptor) -> Self {
        Self {
            monitor,
            state: CaptureState::Idle,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Applies one input event and returns the effects to perform.
    pub fn handle(&mut self, event: InputEvent) -> Vec<Effect> {
        let (next, effects) = transition(self.state, event, &self.monitor);
        self.state = next;
        effects
    }
}
