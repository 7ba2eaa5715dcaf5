//! Edit pipeline: turns pointer and keyboard gestures into store mutations.
//!
//! The shape store is the source of truth. Gestures build local previews on
//! the canvas and commit to the store once, when they complete; continuous
//! transforms are mirrored at a throttled rate and then written in full on
//! completion. Every store snapshot change triggers a full canvas rebuild
//! through [`SnapshotObserver::apply_snapshot`], after which any local
//! in-flight work is laid back on top.
//!
//! Store failures are logged and never surfaced; the optimistic local state
//! stays until the next rebuild.

use std::time::{Duration, Instant};

use anyhow::Result;
use inkboard_core::adapter;
use inkboard_core::throttle::DEFAULT_INTERVAL;
use inkboard_core::{
    BrushSettings, Canvas, CanvasObject, CircleAttrs, CompositeOp, PathAttrs, PathCommand, RecordData, RectAttrs,
    ShapeBody, ShapeId, ShapeKind, ShapeRecord, ShapeStore, ShapeType, SnapshotObserver, TextAttrs, Throttle, Tool,
    ToolConfig, ToolState,
};
use inkboard_geometry::{drag_circle, drag_rect, Bounds, Placement, Point};
use tracing::{debug, info, warn};

use crate::undo::{remove_all, UndoAction, UndoLog};

/// Pointer distance that still grabs a selection handle
const HANDLE_RADIUS: f64 = 6.0;
/// Rotation handle sits this far above the selection
const ROTATE_HANDLE_OFFSET: f64 = 20.0;
/// Scaling never collapses an object below this factor
const MIN_SCALE: f64 = 0.05;

const TEXT_FONT_SIZE: f64 = 20.0;
const TEXT_FONT_FAMILY: &str = "sans-serif";

/// Tunables for an [`EditPipeline`]
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Window for throttled transform writes
    pub throttle_interval: Duration,
    pub undo_limit: usize,
    /// Push eraser strokes onto the undo log like pen strokes
    pub undo_eraser_strokes: bool,
    pub initial_tool: Tool,
    pub brushes: BrushSettings,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_INTERVAL,
            undo_limit: 100,
            undo_eraser_strokes: false,
            initial_tool: Tool::default(),
            brushes: BrushSettings::default(),
        }
    }
}

/// Pointer position plus modifiers, stamped with when it happened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub point: Point,
    /// Shift held: additive selection
    pub shift: bool,
    pub at: Instant,
}

impl PointerEvent {
    pub fn new(point: Point, at: Instant) -> Self {
        Self { point, shift: false, at }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }
}

/// Keys the pipeline reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Delete,
    Backspace,
    Escape,
    Enter,
    Char(char),
    SelectAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    Move,
    Scale,
    Rotate,
}

#[derive(Debug, Clone)]
struct Transform {
    mode: TransformMode,
    pivot: Point,
    /// Rotation of the axes a scale works along, in degrees
    frame_angle: f64,
    origin: Point,
    current: Point,
    /// State of every transformed shape when the gesture began
    before: Vec<ShapeRecord>,
    moved: bool,
}

impl Transform {
    /// Placement of a shape that started at `start`, computed from the
    /// gesture's origin so dropped pointer events never accumulate error
    fn placement(&self, start: &Placement) -> Placement {
        let mut p = *start;
        match self.mode {
            TransformMode::Move => {
                p.left += self.current.x - self.origin.x;
                p.top += self.current.y - self.origin.y;
            }
            TransformMode::Scale => {
                // Work in the frame's own axes so a rotated shape keeps its angle
                let local = |point: Point| point.rotated_about(self.pivot, -self.frame_angle);
                let (origin, current, anchor) = (local(self.origin), local(self.current), local(start.anchor()));
                let sx = scale_factor(origin.x - self.pivot.x, current.x - self.pivot.x);
                let sy = scale_factor(origin.y - self.pivot.y, current.y - self.pivot.y);
                let scaled = Point::new(
                    self.pivot.x + (anchor.x - self.pivot.x) * sx,
                    self.pivot.y + (anchor.y - self.pivot.y) * sy,
                )
                .rotated_about(self.pivot, self.frame_angle);
                p.left = scaled.x;
                p.top = scaled.y;
                p.scale_x = start.scale_x * sx;
                p.scale_y = start.scale_y * sy;
            }
            TransformMode::Rotate => {
                let from = (self.origin.y - self.pivot.y).atan2(self.origin.x - self.pivot.x);
                let to = (self.current.y - self.pivot.y).atan2(self.current.x - self.pivot.x);
                let sweep = (to - from).to_degrees();
                let anchor = start.anchor().rotated_about(self.pivot, sweep);
                p.left = anchor.x;
                p.top = anchor.y;
                p.angle = start.angle + sweep;
            }
        }
        p
    }
}

fn scale_factor(start: f64, current: f64) -> f64 {
    if start.abs() < f64::EPSILON {
        return 1.0;
    }
    (current / start).max(MIN_SCALE)
}

#[derive(Debug, Clone, Default)]
enum Gesture {
    #[default]
    Idle,
    Stroke { tool: Tool, points: Vec<Point> },
    Shape { tool: Tool, origin: Point, current: Point },
    Transform(Transform),
    Marquee { origin: Point, current: Point, base: Vec<ShapeId> },
}

/// Text object currently taking keyboard input
#[derive(Debug, Clone)]
struct TextEdit {
    id: ShapeId,
    /// Stored state when editing began
    before: RecordData,
    text: String,
    /// Created by this edit rather than picked up from the canvas
    created: bool,
}

pub struct EditPipeline<S> {
    store: S,
    canvas: Canvas,
    tools: ToolState,
    undo: UndoLog,
    throttle: Throttle,
    gesture: Gesture,
    text_edit: Option<TextEdit>,
    undo_eraser_strokes: bool,
}

fn logged<T>(action: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(action, error = %e, "store operation failed");
            None
        }
    }
}

impl<S: ShapeStore> EditPipeline<S> {
    /// Wrap a store and build the canvas from its current snapshot
    pub fn new(store: S, options: PipelineOptions) -> Self {
        let tools = ToolState::new(options.initial_tool, options.brushes);
        let mut pipeline = Self {
            store,
            canvas: Canvas::new(tools.config()),
            tools,
            undo: UndoLog::new(options.undo_limit),
            throttle: Throttle::new(options.throttle_interval),
            gesture: Gesture::Idle,
            text_edit: None,
            undo_eraser_strokes: options.undo_eraser_strokes,
        };
        pipeline.refresh();
        pipeline
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn tool(&self) -> Tool {
        self.tools.active()
    }

    pub fn tool_config(&self) -> &ToolConfig {
        self.canvas.config()
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.undo
    }

    /// Id of the text object taking keyboard input, if any
    pub fn editing_text(&self) -> Option<&ShapeId> {
        self.text_edit.as_ref().map(|t| &t.id)
    }

    pub fn set_brushes(&mut self, brushes: BrushSettings) {
        self.tools.set_brushes(brushes);
        self.canvas.apply_tool_config(self.tools.config());
    }

    /// Switch tools. In-flight work is settled first: a text edit or
    /// transform is committed, a stroke, shape preview or marquee is
    /// dropped. No stored record changes otherwise.
    pub fn set_tool(&mut self, tool: Tool) {
        self.finish_text_edit();
        match std::mem::take(&mut self.gesture) {
            Gesture::Transform(transform) => self.finish_transform(transform),
            Gesture::Idle => {}
            _ => {
                self.canvas.take_preview();
            }
        }
        let config = self.tools.set_active(tool);
        self.canvas.apply_tool_config(config);
        self.canvas.render();
        debug!(tool = %tool, "tool switched");
    }

    // --- Pointer ---

    pub fn pointer_down(&mut self, event: PointerEvent) {
        let point = event.point;
        match self.tools.active() {
            tool @ (Tool::Pen | Tool::Eraser) => {
                self.gesture = Gesture::Stroke { tool, points: vec![point] };
                self.show_preview();
            }
            tool @ (Tool::Rectangle | Tool::Circle) => {
                self.gesture = Gesture::Shape { tool, origin: point, current: point };
                self.show_preview();
            }
            Tool::Text => self.text_click(point),
            Tool::Select => self.select_down(event),
        }
    }

    pub fn pointer_move(&mut self, event: PointerEvent) {
        self.track(event.point);
        let ids: Vec<ShapeId> = match &self.gesture {
            Gesture::Transform(transform) => transform.before.iter().map(|r| r.id.clone()).collect(),
            _ => return,
        };
        if self.throttle.ready(event.at) {
            self.mirror_transform(ids);
        } else {
            debug!("transform write throttled");
        }
    }

    pub fn pointer_up(&mut self, event: PointerEvent) {
        self.track(event.point);
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => {}
            Gesture::Stroke { tool, .. } => self.finish_stroke(tool),
            Gesture::Shape { .. } => self.finish_shape(),
            Gesture::Transform(transform) => self.finish_transform(transform),
            Gesture::Marquee { .. } => self.canvas.render(),
        }
    }

    /// Follow the pointer without writing to the store
    fn track(&mut self, point: Point) {
        match &mut self.gesture {
            Gesture::Idle => return,
            Gesture::Stroke { points, .. } => points.push(point),
            Gesture::Shape { current, .. } => *current = point,
            Gesture::Transform(transform) => {
                transform.current = point;
                transform.moved |= point != transform.origin;
            }
            Gesture::Marquee { current, .. } => *current = point,
        }
        self.show_preview();
    }

    /// Draw the in-flight gesture on top of the rebuilt canvas
    fn show_preview(&mut self) {
        match &self.gesture {
            Gesture::Idle => {}
            Gesture::Stroke { tool, points } => {
                if let Some(object) = self.stroke_object(*tool, points) {
                    self.canvas.set_preview(object);
                }
            }
            Gesture::Shape { tool, origin, current } => {
                let object = self.shape_object(*tool, *origin, *current);
                self.canvas.set_preview(object);
            }
            Gesture::Transform(transform) => {
                for record in &transform.before {
                    let placement = transform.placement(record.body.placement());
                    if let Some(object) = self.canvas.get_mut(&record.id) {
                        *object.body.placement_mut() = placement;
                    }
                }
            }
            Gesture::Marquee { origin, current, base } => {
                let area = Bounds::from_corners(*origin, *current);
                let mut ids = base.clone();
                ids.extend(self.canvas.objects_in(&area));
                self.canvas.select(ids);
            }
        }
        self.canvas.render();
    }

    // --- Drawing ---

    fn stroke_object(&self, tool: Tool, points: &[Point]) -> Option<CanvasObject> {
        let path = PathCommand::from_points(points);
        let extent = inkboard_core::shapes::path_extent(&path)?;
        let brush = self.tools.config().brush;
        let (color, width, composite) = match brush {
            Some(b) => (b.color, b.width, b.composite),
            None => (self.tools.brushes().pen_color.clone(), self.tools.brushes().pen_width, CompositeOp::SourceOver),
        };
        let attrs = PathAttrs { path, stroke: color, stroke_width: width };
        let kind = match tool {
            Tool::Eraser => ShapeKind::EraserPath(attrs),
            _ => ShapeKind::Path(attrs),
        };
        let mut object = CanvasObject::new(ShapeBody::new(Placement::at(extent.min_x, extent.min_y), kind));
        object.composite = composite;
        Some(object)
    }

    fn shape_object(&self, tool: Tool, origin: Point, current: Point) -> CanvasObject {
        let brushes = self.tools.brushes();
        let body = match tool {
            Tool::Circle => {
                let c = drag_circle(origin, current);
                let kind = ShapeKind::Circle(CircleAttrs {
                    radius: c.radius,
                    fill: "transparent".to_string(),
                    stroke: brushes.pen_color.clone(),
                    stroke_width: brushes.pen_width,
                });
                ShapeBody::new(Placement::centered(c.center), kind)
            }
            _ => {
                let r = drag_rect(origin, current);
                let kind = ShapeKind::Rectangle(RectAttrs {
                    width: r.width,
                    height: r.height,
                    fill: "transparent".to_string(),
                    stroke: brushes.pen_color.clone(),
                    stroke_width: brushes.pen_width,
                });
                ShapeBody::new(Placement::at(r.left, r.top), kind)
            }
        };
        CanvasObject::new(body)
    }

    fn finish_stroke(&mut self, tool: Tool) {
        let Some(object) = self.canvas.take_preview() else {
            return;
        };
        let undoable = tool != Tool::Eraser || self.undo_eraser_strokes;
        self.append(object, undoable);
    }

    fn finish_shape(&mut self) {
        let Some(object) = self.canvas.take_preview() else {
            debug!("pointer up without a preview");
            return;
        };
        let (w, h) = object.body.kind.local_size();
        if w == 0.0 && h == 0.0 {
            debug!("discarding zero-size shape");
            self.canvas.render();
            return;
        }
        self.append(object, true);
    }

    /// Give a fresh object an id and append it to the store in one mutation
    fn append(&mut self, object: CanvasObject, undoable: bool) -> Option<ShapeId> {
        let id = ShapeId::new();
        let object = object.with_id(id.clone()).with_owner(self.store.connection_id());
        let record = match adapter::serialize(&object) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "cannot serialize new shape");
                return None;
            }
        };
        let pushed = logged(
            "append",
            self.store.mutate(|shapes| {
                let index = shapes.len();
                shapes.push(&record)?;
                Ok(index)
            }),
        );
        match pushed {
            Some(index) => {
                debug!(id = %id, shape_type = %record.shape_type, index, "shape appended");
                if undoable {
                    self.undo.push(UndoAction::Add { index, record });
                }
                self.refresh();
            }
            None => {
                self.canvas.add(object);
                self.canvas.render();
            }
        }
        Some(id)
    }

    // --- Text ---

    fn text_click(&mut self, point: Point) {
        if let Some(edit) = &self.text_edit {
            if self.canvas.get(&edit.id).is_some_and(|o| o.contains(point)) {
                return;
            }
        }
        self.finish_text_edit();

        let existing = self
            .canvas
            .find_at(point, |o| o.body.shape_type() == ShapeType::Text)
            .and_then(|o| o.id.clone());
        match existing {
            Some(id) => self.begin_text_edit(id, false),
            None => {
                let kind = ShapeKind::Text(TextAttrs {
                    text: String::new(),
                    font_size: TEXT_FONT_SIZE,
                    font_family: TEXT_FONT_FAMILY.to_string(),
                    fill: self.tools.brushes().pen_color.clone(),
                });
                let object = CanvasObject::new(ShapeBody::new(Placement::at(point.x, point.y), kind));
                if let Some(id) = self.append(object, true) {
                    self.begin_text_edit(id, true);
                }
            }
        }
    }

    fn begin_text_edit(&mut self, id: ShapeId, created: bool) {
        let Some(object) = self.canvas.get_mut(&id) else {
            return;
        };
        let before = match adapter::serialize(object) {
            Ok(record) => record,
            Err(e) => {
                warn!(id = %id, error = %e, "cannot edit text");
                return;
            }
        };
        let text = match &object.body.kind {
            ShapeKind::Text(t) => t.text.clone(),
            _ => return,
        };
        object.editing = true;
        self.canvas.render();
        debug!(id = %id, "text edit started");
        self.text_edit = Some(TextEdit { id, before, text, created });
    }

    fn text_key(&mut self, key: Key) {
        let Some(edit) = &mut self.text_edit else {
            return;
        };
        match key {
            Key::Char(c) => edit.text.push(c),
            Key::Enter => edit.text.push('\n'),
            Key::Backspace => {
                edit.text.pop();
            }
            Key::Escape => {
                self.finish_text_edit();
                return;
            }
            Key::Delete | Key::SelectAll => return,
        }
        self.show_text_edit();
    }

    /// Lay the local text over the canvas object being edited
    fn show_text_edit(&mut self) {
        let Some(edit) = &self.text_edit else {
            return;
        };
        match self.canvas.get_mut(&edit.id) {
            Some(object) => {
                if let ShapeKind::Text(t) = &mut object.body.kind {
                    t.text.clone_from(&edit.text);
                }
                object.editing = true;
            }
            None => {
                warn!(id = %edit.id, "text being edited was removed");
                self.text_edit = None;
            }
        }
        self.canvas.render();
    }

    /// Leave text edit mode, writing the result. An emptied text is removed.
    fn finish_text_edit(&mut self) {
        let Some(edit) = self.text_edit.take() else {
            return;
        };
        let Some(object) = self.canvas.get_mut(&edit.id) else {
            warn!(id = %edit.id, "text being edited was removed");
            return;
        };
        object.editing = false;

        if edit.text.is_empty() {
            let removed = logged("remove empty text", self.store.mutate(|shapes| shapes.remove(&edit.id)));
            if let Some(Some((index, _))) = removed {
                if edit.created {
                    self.undo.discard_add(&edit.id);
                } else {
                    self.undo.push(UndoAction::Delete {
                        previous: vec![(index, edit.before)],
                    });
                }
            }
            self.refresh();
            return;
        }

        let record = match adapter::serialize(object) {
            Ok(record) => record,
            Err(e) => {
                warn!(id = %edit.id, error = %e, "cannot serialize edited text");
                return;
            }
        };
        let written = logged("write text", self.store.mutate(|shapes| shapes.replace(&record)));
        match written {
            Some(true) if record != edit.before => {
                if !(edit.created && self.undo.amend_add(record)) {
                    self.undo.push(UndoAction::Modify { before: vec![edit.before] });
                }
            }
            Some(false) => warn!(id = %edit.id, "edited text no longer exists"),
            _ => {}
        }
        self.refresh();
    }

    // --- Selection ---

    fn select_down(&mut self, event: PointerEvent) {
        let point = event.point;
        if let Some((mode, pivot, frame_angle)) = self.handle_at(point) {
            self.begin_transform(mode, pivot, point, frame_angle);
            return;
        }
        let hit = self.canvas.object_at(point).and_then(|o| o.id.clone());
        match hit {
            Some(id) if event.shift => {
                self.canvas.toggle_selection(id);
                self.canvas.render();
            }
            Some(id) => {
                if !self.canvas.is_selected(&id) {
                    self.canvas.select([id]);
                }
                self.begin_transform(TransformMode::Move, point, point, 0.0);
            }
            None => {
                let base = if event.shift {
                    self.canvas.selection().to_vec()
                } else {
                    Vec::new()
                };
                self.canvas.select(base.clone());
                self.gesture = Gesture::Marquee { origin: point, current: point, base };
                self.canvas.render();
            }
        }
    }

    /// Union of the selected objects' bounds
    pub fn selection_bounds(&self) -> Option<Bounds> {
        self.canvas
            .selected_objects()
            .into_iter()
            .map(|o| o.bounds())
            .reduce(|a, b| a.union(&b))
    }

    /// Scale handle and its pivot, plus the angle of the axes it scales along.
    ///
    /// A lone rotated shape scales in its own box: the handle sits on its
    /// bottom-right corner and pivots on its top-left. Anything else uses
    /// the selection bounds, so a mixed-angle selection scales each member
    /// by screen-axis factors.
    fn scale_frame(&self) -> Option<(Point, Point, f64)> {
        if let [object] = self.canvas.selected_objects()[..] {
            let placement = object.body.placement();
            if placement.angle % 360.0 != 0.0 {
                let (width, height) = object.body.kind.local_size();
                let [top_left, _, bottom_right, _] = placement.corners(width, height);
                return Some((bottom_right, top_left, placement.angle));
            }
        }
        let b = self.selection_bounds()?;
        Some((Point::new(b.max_x, b.max_y), Point::new(b.min_x, b.min_y), 0.0))
    }

    /// Rotate handle above the top edge pivots on the center
    fn handle_at(&self, point: Point) -> Option<(TransformMode, Point, f64)> {
        let b = self.selection_bounds()?;
        let center = Point::new((b.min_x + b.max_x) / 2.0, (b.min_y + b.max_y) / 2.0);
        let rotate = Point::new(center.x, b.min_y - ROTATE_HANDLE_OFFSET);
        match self.scale_frame() {
            Some((handle, pivot, angle)) if point.distance_to(handle) <= HANDLE_RADIUS => {
                Some((TransformMode::Scale, pivot, angle))
            }
            _ if point.distance_to(rotate) <= HANDLE_RADIUS => Some((TransformMode::Rotate, center, 0.0)),
            _ => None,
        }
    }

    fn begin_transform(&mut self, mode: TransformMode, pivot: Point, origin: Point, frame_angle: f64) {
        let before: Vec<ShapeRecord> = self
            .canvas
            .selected_objects()
            .into_iter()
            .filter_map(|o| adapter::to_record(o).ok())
            .collect();
        if before.is_empty() {
            return;
        }
        self.throttle.reset();
        self.gesture = Gesture::Transform(Transform {
            mode,
            pivot,
            frame_angle,
            origin,
            current: origin,
            before,
            moved: false,
        });
    }

    /// Throttled partial write: position, scale and angle only
    fn mirror_transform(&mut self, ids: Vec<ShapeId>) {
        let patches: Vec<_> = ids
            .into_iter()
            .filter_map(|id| {
                let patch = adapter::transform_patch(self.canvas.get(&id)?);
                Some((id, patch))
            })
            .collect();
        logged(
            "mirror transform",
            self.store.mutate(|shapes| {
                for (id, patch) in &patches {
                    if !shapes.update_attributes(id, patch)? {
                        warn!(id = %id, "cannot update transform: shape does not exist");
                    }
                }
                Ok(())
            }),
        );
    }

    /// Final full write, never throttled
    fn finish_transform(&mut self, transform: Transform) {
        if !transform.moved {
            return;
        }
        let mut finals = Vec::with_capacity(transform.before.len());
        for start in &transform.before {
            let Some(object) = self.canvas.get(&start.id) else {
                warn!(id = %start.id, "transformed shape was removed");
                continue;
            };
            match (adapter::serialize(object), start.to_data()) {
                (Ok(after), Ok(before)) => finals.push((after, before)),
                (Err(e), _) | (_, Err(e)) => warn!(id = %start.id, error = %e, "cannot serialize transformed shape"),
            }
        }
        let written = logged(
            "commit transform",
            self.store.mutate(|shapes| {
                let mut before = Vec::with_capacity(finals.len());
                for (after, prior) in finals {
                    if shapes.replace(&after)? {
                        before.push(prior);
                    } else {
                        warn!(id = %after.id, "cannot commit transform: shape does not exist");
                    }
                }
                Ok(before)
            }),
        );
        if let Some(before) = written.filter(|b| !b.is_empty()) {
            debug!(shapes = before.len(), "transform committed");
            self.undo.push(UndoAction::Modify { before });
        }
        self.refresh();
    }

    pub fn select_all(&mut self) {
        let ids: Vec<ShapeId> = self.canvas.objects().iter().filter_map(|o| o.id.clone()).collect();
        self.canvas.select(ids);
        self.canvas.render();
    }

    /// Remove every selected shape from the store and the canvas
    pub fn delete_selection(&mut self) {
        let ids = self.canvas.selection().to_vec();
        if ids.is_empty() {
            return;
        }
        let removed = logged("delete", self.store.mutate(|shapes| remove_all(shapes, &ids)));
        for id in &ids {
            self.canvas.remove(id);
        }
        if let Some(previous) = removed.filter(|p| !p.is_empty()) {
            info!(shapes = previous.len(), "deleted selection");
            self.undo.push(UndoAction::Delete { previous });
            self.refresh();
        } else {
            self.canvas.render();
        }
    }

    // --- Keyboard ---

    pub fn key(&mut self, key: Key) {
        if self.text_edit.is_some() {
            self.text_key(key);
            return;
        }
        if self.tools.active() != Tool::Select || !matches!(self.gesture, Gesture::Idle) {
            return;
        }
        match key {
            Key::Delete | Key::Backspace => self.delete_selection(),
            Key::SelectAll => self.select_all(),
            Key::Escape => {
                self.canvas.clear_selection();
                self.canvas.render();
            }
            Key::Enter | Key::Char(_) => {}
        }
    }

    // --- History ---

    /// Undo the newest local edit; false when nothing changed
    pub fn undo(&mut self) -> bool {
        self.finish_text_edit();
        if !matches!(self.gesture, Gesture::Idle) {
            debug!("undo ignored during a gesture");
            return false;
        }
        let undone = logged("undo", self.undo.undo(&mut self.store)).unwrap_or(false);
        self.refresh();
        undone
    }

    pub fn redo(&mut self) -> bool {
        self.finish_text_edit();
        if !matches!(self.gesture, Gesture::Idle) {
            debug!("redo ignored during a gesture");
            return false;
        }
        let redone = logged("redo", self.undo.redo(&mut self.store)).unwrap_or(false);
        self.refresh();
        redone
    }

    // --- Reconciliation ---

    /// Pull remote changes; rebuilds the canvas when the snapshot changed
    pub fn poll(&mut self) -> bool {
        match logged("poll", self.store.poll_remote()) {
            Some(true) => {
                self.refresh();
                true
            }
            _ => false,
        }
    }

    /// Rebuild the canvas from the store's current snapshot
    pub fn refresh(&mut self) {
        if let Some(records) = logged("read snapshot", self.store.records()) {
            self.apply_snapshot(&records);
        }
    }
}

impl<S: ShapeStore> SnapshotObserver for EditPipeline<S> {
    fn apply_snapshot(&mut self, records: &[RecordData]) {
        let selection = self.canvas.selection().to_vec();
        self.canvas.clear();
        for object in adapter::deserialize(records, self.canvas.config()) {
            self.canvas.add(object);
        }
        self.show_preview();
        if self.text_edit.is_some() {
            self.show_text_edit();
        }
        if !matches!(self.gesture, Gesture::Marquee { .. }) {
            self.canvas.retain_selection(&selection);
        }
        self.canvas.render();
    }
}
