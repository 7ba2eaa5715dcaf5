//! Tool state machine.
//!
//! Exactly one tool is active. Each tool maps deterministically to a
//! [`ToolConfig`]: freehand mode and brush, marquee selection, whether
//! existing objects are hit-testable, and cursor glyphs. Switching tools
//! only changes that local configuration, never a stored record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Available tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Select,
    #[default]
    Pen,
    Eraser,
    Rectangle,
    Circle,
    Text,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::Select,
        Tool::Pen,
        Tool::Eraser,
        Tool::Rectangle,
        Tool::Circle,
        Tool::Text,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Select => "select",
            Tool::Pen => "pen",
            Tool::Eraser => "eraser",
            Tool::Rectangle => "rectangle",
            Tool::Circle => "circle",
            Tool::Text => "text",
        }
    }

    /// Freehand tools draw strokes through the brush
    pub fn is_freehand(&self) -> bool {
        matches!(self, Tool::Pen | Tool::Eraser)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown tool `{s}`"))
    }
}

/// How a stroke combines with what is already painted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositeOp {
    #[default]
    SourceOver,
    /// Destructive: paints transparency, erasing what lies underneath
    DestinationOut,
}

impl CompositeOp {
    pub fn css_name(&self) -> &'static str {
        match self {
            CompositeOp::SourceOver => "source-over",
            CompositeOp::DestinationOut => "destination-out",
        }
    }
}

/// Pointer cursor glyphs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Default,
    Crosshair,
    Move,
    Text,
    Cell,
}

impl Cursor {
    pub fn css_name(&self) -> &'static str {
        match self {
            Cursor::Default => "default",
            Cursor::Crosshair => "crosshair",
            Cursor::Move => "move",
            Cursor::Text => "text",
            Cursor::Cell => "cell",
        }
    }
}

/// Virtual brush bound while freehand drawing is engaged
#[derive(Debug, Clone, PartialEq)]
pub struct Brush {
    pub width: f64,
    pub color: String,
    pub composite: CompositeOp,
}

/// User-adjustable brush parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushSettings {
    pub pen_color: String,
    pub pen_width: f64,
    pub eraser_width: f64,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            pen_color: "#000000".to_string(),
            pen_width: 5.0,
            eraser_width: 20.0,
        }
    }
}

/// Per-object interactivity flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interactivity {
    /// Can become part of the selection
    pub selectable: bool,
    /// Receives pointer hit-tests
    pub evented: bool,
}

/// Canvas policy implied by the active tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub tool: Tool,
    pub drawing_mode: bool,
    pub brush: Option<Brush>,
    /// Marquee and multi-object selection
    pub selection: bool,
    pub default_cursor: Cursor,
    pub hover_cursor: Cursor,
}

impl ToolConfig {
    /// Flags applied to every existing object; only `select` makes objects interactive
    pub fn interactivity(&self) -> Interactivity {
        let interactive = self.tool == Tool::Select;
        Interactivity {
            selectable: interactive,
            evented: interactive,
        }
    }
}

/// The active tool plus the brush settings it draws with
#[derive(Debug, Clone, PartialEq)]
pub struct ToolState {
    active: Tool,
    brushes: BrushSettings,
}

impl ToolState {
    pub fn new(initial: Tool, brushes: BrushSettings) -> Self {
        Self { active: initial, brushes }
    }

    pub fn active(&self) -> Tool {
        self.active
    }

    pub fn brushes(&self) -> &BrushSettings {
        &self.brushes
    }

    pub fn set_brushes(&mut self, brushes: BrushSettings) {
        self.brushes = brushes;
    }

    /// Make `tool` active and return its configuration
    pub fn set_active(&mut self, tool: Tool) -> ToolConfig {
        self.active = tool;
        self.config()
    }

    pub fn config(&self) -> ToolConfig {
        let b = &self.brushes;
        match self.active {
            Tool::Select => ToolConfig {
                tool: Tool::Select,
                drawing_mode: false,
                brush: None,
                selection: true,
                default_cursor: Cursor::Default,
                hover_cursor: Cursor::Move,
            },
            Tool::Pen => ToolConfig {
                tool: Tool::Pen,
                drawing_mode: true,
                brush: Some(Brush {
                    width: b.pen_width,
                    color: b.pen_color.clone(),
                    composite: CompositeOp::SourceOver,
                }),
                selection: false,
                default_cursor: Cursor::Crosshair,
                hover_cursor: Cursor::Crosshair,
            },
            Tool::Eraser => ToolConfig {
                tool: Tool::Eraser,
                drawing_mode: true,
                brush: Some(Brush {
                    width: b.eraser_width,
                    color: "#000000".to_string(),
                    composite: CompositeOp::DestinationOut,
                }),
                selection: false,
                default_cursor: Cursor::Cell,
                hover_cursor: Cursor::Cell,
            },
            tool @ (Tool::Rectangle | Tool::Circle) => ToolConfig {
                tool,
                drawing_mode: false,
                brush: None,
                selection: false,
                default_cursor: Cursor::Crosshair,
                hover_cursor: Cursor::Crosshair,
            },
            Tool::Text => ToolConfig {
                tool: Tool::Text,
                drawing_mode: false,
                brush: None,
                selection: false,
                default_cursor: Cursor::Text,
                hover_cursor: Cursor::Text,
            },
        }
    }
}

impl Default for ToolState {
    fn default() -> Self {
        Self::new(Tool::default(), BrushSettings::default())
    }
}
