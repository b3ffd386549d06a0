//! Placement canvas: turns pointer gestures into placement edits.
//!
//! The canvas never talks to a UI toolkit. Gestures arrive as
//! [`CanvasCommand`]s (replayed from a JSON script by the `place` command) and
//! every accepted command yields a fresh placement collection.

use crate::coords::{
    clamp_percent, clamp_size, normalize_degrees, rotation_from_vector, ContainerRect,
    MAX_SIZE_PERCENT,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

pub const DEFAULT_PLACEMENT_SIZE_PERCENT: f64 = 15.0;

pub const GESTURES_HELP: &str = r##"Gesture script JSON (list or {"container": {...}, "commands": [...]}):
{
  "container": {"left": 0, "top": 0, "width": 800, "height": 600},
  "commands": [
    {"op": "drop", "portrait_id": "grandpa", "x": 320, "y": 180},
    {"op": "begin_drag", "placement": 1, "kind": "move", "x": 320, "y": 180},
    {"op": "update_drag", "x": 340, "y": 200},
    {"op": "end_drag"},
    {"op": "begin_drag", "placement": 1, "kind": "resize", "x": 380, "y": 240},
    {"op": "update_drag", "x": 420, "y": 280},
    {"op": "end_drag"},
    {"op": "select", "placement": 1},
    {"op": "click_empty"},
    {"op": "delete", "placement": 2},
    {"op": "clear"}
  ]
}

Notes:
- x/y are pointer positions in the same client space as the container rect.
- "placement" is either a placement id string or a 1-based marker number.
- kind is one of move|resize|rotate.
- clear removes every placement; portraits stay available for drops.
- the container defaults to the displayed image size (--view-width/--view-height).
"##;

/// Normalized, resolution-independent position of one portrait on the base
/// image. All spatial fields are percentages of the base image box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub id: String,
    pub portrait_id: String,
    /// center x
    pub x: f64,
    /// center y
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl Placement {
    pub fn new(portrait_id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            portrait_id: portrait_id.into(),
            x,
            y,
            width: DEFAULT_PLACEMENT_SIZE_PERCENT,
            height: DEFAULT_PLACEMENT_SIZE_PERCENT,
            rotation: 0.0,
        }
    }

    /// Commit-time normalization: centers inside the image, sizes within
    /// [5, 100], rotation within [0, 360).
    pub fn committed(mut self) -> Self {
        self.x = clamp_percent(self.x);
        self.y = clamp_percent(self.y);
        self.width = clamp_size(self.width).min(MAX_SIZE_PERCENT);
        self.height = clamp_size(self.height).min(MAX_SIZE_PERCENT);
        self.rotation = normalize_degrees(self.rotation);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragKind {
    Move,
    Resize,
    Rotate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CanvasState {
    Idle,
    Selected(String),
    Dragging {
        kind: DragKind,
        placement_id: String,
        last_x: f64,
        last_y: f64,
    },
}

/// Reference to a placement inside a gesture script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlacementRef {
    Marker(usize),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CanvasCommand {
    Drop {
        portrait_id: String,
        x: f64,
        y: f64,
    },
    Select {
        placement: PlacementRef,
    },
    ClickEmpty,
    BeginDrag {
        placement: PlacementRef,
        kind: DragKind,
        x: f64,
        y: f64,
    },
    UpdateDrag {
        x: f64,
        y: f64,
    },
    EndDrag,
    Delete {
        placement: PlacementRef,
    },
    Clear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureScript {
    #[serde(default)]
    pub container: Option<ContainerRect>,
    pub commands: Vec<CanvasCommand>,
}

impl GestureScript {
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        match value {
            serde_json::Value::Array(_) => Ok(Self {
                container: None,
                commands: serde_json::from_value(value)?,
            }),
            other => serde_json::from_value(other),
        }
    }
}

/// Outcome of one command, for logs and script reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Applied,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct PlacementCanvas {
    container: ContainerRect,
    portrait_ids: HashSet<String>,
    placements: Vec<Placement>,
    state: CanvasState,
}

impl PlacementCanvas {
    pub fn new<I, S>(container: ContainerRect, portrait_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            container,
            portrait_ids: portrait_ids.into_iter().map(Into::into).collect(),
            placements: Vec::new(),
            state: CanvasState::Idle,
        }
    }

    pub fn with_placements(mut self, placements: Vec<Placement>) -> Self {
        self.placements = placements;
        self
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn state(&self) -> &CanvasState {
        &self.state
    }

    pub fn container(&self) -> ContainerRect {
        self.container
    }

    pub fn selected_id(&self) -> Option<&str> {
        match &self.state {
            CanvasState::Idle => None,
            CanvasState::Selected(id) => Some(id),
            CanvasState::Dragging { placement_id, .. } => Some(placement_id),
        }
    }

    pub fn add_portrait(&mut self, portrait_id: impl Into<String>) {
        self.portrait_ids.insert(portrait_id.into());
    }

    /// 1-based marker number shown next to a placement.
    pub fn marker_of(&self, placement_id: &str) -> Option<usize> {
        self.placements
            .iter()
            .position(|p| p.id == placement_id)
            .map(|idx| idx + 1)
    }

    /// Every placement and the selection go away; known portraits stay.
    pub fn clear(&mut self) {
        self.placements.clear();
        self.state = CanvasState::Idle;
    }

    pub fn resolve(&self, placement: &PlacementRef) -> Option<String> {
        match placement {
            PlacementRef::Id(id) => self
                .placements
                .iter()
                .find(|p| &p.id == id)
                .map(|p| p.id.clone()),
            PlacementRef::Marker(marker) => marker
                .checked_sub(1)
                .and_then(|idx| self.placements.get(idx))
                .map(|p| p.id.clone()),
        }
    }

    pub fn apply(&mut self, command: &CanvasCommand) -> CommandOutcome {
        let outcome = match command {
            CanvasCommand::Drop { portrait_id, x, y } => self.drop_portrait(portrait_id, *x, *y),
            CanvasCommand::Select { placement } => match self.resolve(placement) {
                Some(id) => {
                    self.state = CanvasState::Selected(id);
                    CommandOutcome::Applied
                }
                None => CommandOutcome::Ignored,
            },
            CanvasCommand::ClickEmpty => {
                if matches!(self.state, CanvasState::Dragging { .. }) {
                    CommandOutcome::Ignored
                } else {
                    self.state = CanvasState::Idle;
                    CommandOutcome::Applied
                }
            }
            CanvasCommand::BeginDrag {
                placement,
                kind,
                x,
                y,
            } => match self.resolve(placement) {
                Some(id) => {
                    self.state = CanvasState::Dragging {
                        kind: *kind,
                        placement_id: id,
                        last_x: *x,
                        last_y: *y,
                    };
                    CommandOutcome::Applied
                }
                None => CommandOutcome::Ignored,
            },
            CanvasCommand::UpdateDrag { x, y } => self.update_drag(*x, *y),
            CanvasCommand::EndDrag => self.end_drag(),
            CanvasCommand::Delete { placement } => {
                if let Some(id) = self.resolve(placement) {
                    self.placements.retain(|p| p.id != id);
                }
                self.state = CanvasState::Idle;
                CommandOutcome::Applied
            }
            CanvasCommand::Clear => {
                self.clear();
                CommandOutcome::Applied
            }
        };
        debug!(?command, ?outcome, state = ?self.state, "canvas command");
        outcome
    }

    fn drop_portrait(&mut self, portrait_id: &str, client_x: f64, client_y: f64) -> CommandOutcome {
        if !self.portrait_ids.contains(portrait_id) {
            return CommandOutcome::Ignored;
        }
        let (x, y) = self.container.percent_of(client_x, client_y);
        self.placements
            .push(Placement::new(portrait_id, x, y).committed());
        CommandOutcome::Applied
    }

    fn update_drag(&mut self, client_x: f64, client_y: f64) -> CommandOutcome {
        let CanvasState::Dragging {
            kind,
            placement_id,
            last_x,
            last_y,
        } = &mut self.state
        else {
            return CommandOutcome::Ignored;
        };
        let Some(current) = self.placements.iter().find(|p| p.id == *placement_id) else {
            return CommandOutcome::Ignored;
        };

        let mut next = current.clone();
        let (dx, dy) = self
            .container
            .delta_percent(client_x - *last_x, client_y - *last_y);
        match kind {
            DragKind::Move => {
                next.x += dx;
                next.y += dy;
            }
            DragKind::Resize => {
                next.width = clamp_size(next.width + dx);
                next.height = clamp_size(next.height + dy);
            }
            DragKind::Rotate => {
                let (cx, cy) = self.container.client_of(next.x, next.y);
                next.rotation = rotation_from_vector(client_x - cx, client_y - cy);
            }
        }
        *last_x = client_x;
        *last_y = client_y;

        let id = placement_id.clone();
        self.placements = replace_by_id(&self.placements, &id, next);
        CommandOutcome::Applied
    }

    fn end_drag(&mut self) -> CommandOutcome {
        let CanvasState::Dragging { placement_id, .. } = &self.state else {
            return CommandOutcome::Ignored;
        };
        let id = placement_id.clone();
        if let Some(current) = self.placements.iter().find(|p| p.id == id) {
            let committed = current.clone().committed();
            self.placements = replace_by_id(&self.placements, &id, committed);
        }
        self.state = CanvasState::Selected(id);
        CommandOutcome::Applied
    }
}

fn replace_by_id(placements: &[Placement], id: &str, next: Placement) -> Vec<Placement> {
    placements
        .iter()
        .map(|p| if p.id == id { next.clone() } else { p.clone() })
        .collect()
}
