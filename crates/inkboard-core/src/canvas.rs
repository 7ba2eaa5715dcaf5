//! Local rendering surface.
//!
//! Canvas objects are the interactive in-memory counterpart of Shape
//! Records. They are owned by the canvas alone and never replicated: a
//! full rebuild throws them away and recreates them from the store.

use inkboard_geometry::{Bounds, Point};

use crate::record::{ConnectionId, ShapeId};
use crate::shapes::ShapeBody;
use crate::tools::{CompositeOp, Interactivity, ToolConfig};

/// A renderable object on the local canvas
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasObject {
    /// None until the object has been committed to the store
    pub id: Option<ShapeId>,
    pub owner: ConnectionId,
    pub body: ShapeBody,
    pub interactivity: Interactivity,
    pub composite: CompositeOp,
    /// Text object currently taking keyboard input
    pub editing: bool,
}

impl CanvasObject {
    /// A local object that has not been assigned an id yet
    pub fn new(body: ShapeBody) -> Self {
        Self {
            id: None,
            owner: ConnectionId::OFFLINE,
            body,
            interactivity: Interactivity::default(),
            composite: CompositeOp::SourceOver,
            editing: false,
        }
    }

    pub fn with_id(mut self, id: ShapeId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_owner(mut self, owner: ConnectionId) -> Self {
        self.owner = owner;
        self
    }

    pub fn bounds(&self) -> Bounds {
        self.body.bounds()
    }

    pub fn contains(&self, point: Point) -> bool {
        self.bounds().contains(point)
    }

    fn has_id(&self, id: &ShapeId) -> bool {
        self.id.as_ref() == Some(id)
    }
}

/// The local canvas: objects in paint order, the selection and an
/// optional preview object drawn on top of everything
#[derive(Debug, Clone)]
pub struct Canvas {
    objects: Vec<CanvasObject>,
    selection: Vec<ShapeId>,
    preview: Option<CanvasObject>,
    config: ToolConfig,
    generation: u64,
}

impl Canvas {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            objects: Vec::new(),
            selection: Vec::new(),
            preview: None,
            config,
            generation: 0,
        }
    }

    /// Objects in paint order, bottom first
    pub fn objects(&self) -> &[CanvasObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Append an object on top, applying the current interactivity policy
    pub fn add(&mut self, mut object: CanvasObject) {
        object.interactivity = self.config.interactivity();
        self.objects.push(object);
    }

    pub fn remove(&mut self, id: &ShapeId) -> Option<CanvasObject> {
        let index = self.position(id)?;
        self.selection.retain(|s| s != id);
        Some(self.objects.remove(index))
    }

    pub fn position(&self, id: &ShapeId) -> Option<usize> {
        self.objects.iter().position(|o| o.has_id(id))
    }

    pub fn get(&self, id: &ShapeId) -> Option<&CanvasObject> {
        self.objects.iter().find(|o| o.has_id(id))
    }

    pub fn get_mut(&mut self, id: &ShapeId) -> Option<&mut CanvasObject> {
        self.objects.iter_mut().find(|o| o.has_id(id))
    }

    /// Drop every object, the selection and any preview
    pub fn clear(&mut self) {
        self.objects.clear();
        self.selection.clear();
        self.preview = None;
    }

    /// Topmost hit-testable object under the point
    pub fn object_at(&self, point: Point) -> Option<&CanvasObject> {
        self.find_at(point, |o| o.interactivity.evented)
    }

    /// Topmost object under the point matching `filter`, ignoring
    /// interactivity flags
    pub fn find_at(&self, point: Point, filter: impl Fn(&CanvasObject) -> bool) -> Option<&CanvasObject> {
        self.objects
            .iter()
            .rev()
            .find(|o| filter(o) && o.contains(point))
    }

    /// Ids of selectable objects touching the given area, in paint order
    pub fn objects_in(&self, area: &Bounds) -> Vec<ShapeId> {
        self.objects
            .iter()
            .filter(|o| o.interactivity.selectable && o.bounds().intersects(area))
            .filter_map(|o| o.id.clone())
            .collect()
    }

    // --- Selection ---

    pub fn selection(&self) -> &[ShapeId] {
        &self.selection
    }

    pub fn is_selected(&self, id: &ShapeId) -> bool {
        self.selection.contains(id)
    }

    /// Replace the selection; unknown and unselectable ids are ignored
    pub fn select(&mut self, ids: impl IntoIterator<Item = ShapeId>) {
        self.selection.clear();
        for id in ids {
            self.add_to_selection(id);
        }
    }

    pub fn add_to_selection(&mut self, id: ShapeId) {
        let selectable = self
            .get(&id)
            .is_some_and(|o| o.interactivity.selectable);
        if selectable && !self.selection.contains(&id) {
            self.selection.push(id);
        }
    }

    /// Shift-click behaviour: add when absent, drop when present
    pub fn toggle_selection(&mut self, id: ShapeId) {
        if let Some(pos) = self.selection.iter().position(|s| *s == id) {
            self.selection.remove(pos);
        } else {
            self.add_to_selection(id);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Restrict the selection to the given surviving ids
    pub fn retain_selection(&mut self, keep: &[ShapeId]) {
        self.select(keep.to_vec());
    }

    /// Selected objects in paint order
    pub fn selected_objects(&self) -> Vec<&CanvasObject> {
        self.objects
            .iter()
            .filter(|o| o.id.as_ref().is_some_and(|id| self.selection.contains(id)))
            .collect()
    }

    // --- Preview ---

    pub fn preview(&self) -> Option<&CanvasObject> {
        self.preview.as_ref()
    }

    pub fn set_preview(&mut self, object: CanvasObject) {
        self.preview = Some(object);
    }

    pub fn take_preview(&mut self) -> Option<CanvasObject> {
        self.preview.take()
    }

    /// Install a tool configuration, recomputing every object's flags
    pub fn apply_tool_config(&mut self, config: ToolConfig) {
        let flags = config.interactivity();
        for object in &mut self.objects {
            object.interactivity = flags;
        }
        if !config.selection {
            self.selection.clear();
        }
        self.config = config;
    }

    /// Mark the canvas for repaint
    pub fn render(&mut self) {
        self.generation += 1;
    }

    /// Number of repaints requested so far
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
