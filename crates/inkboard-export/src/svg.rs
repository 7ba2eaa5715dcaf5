//! SVG export of a board.
//!
//! Objects are written in paint order, each as one element whose
//! `transform` reproduces its placement (origin, scale, rotation).
//! Eraser strokes are not painted: they become a mask over everything
//! drawn before them, so they only remove what lies beneath.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use inkboard_core::shapes::path_extent;
use inkboard_core::{CanvasObject, PathAttrs, PathCommand, ShapeBody, ShapeKind};
use inkboard_geometry::{Bounds, OriginX, OriginY};

/// Blank space around the drawing
const MARGIN: f64 = 10.0;
/// Line height as a multiple of the font size
const LINE_HEIGHT: f64 = 1.16;

/// Export canvas objects to an SVG document
pub fn export_svg(objects: &[CanvasObject]) -> Result<String> {
    let view = calculate_bounds(objects);
    let mut defs = String::new();
    let mut body = String::new();
    let mut masks = 0usize;

    let mut rest = objects;
    while let Some(first) = rest.first() {
        if is_eraser(first) {
            let run = rest.iter().take_while(|o| is_eraser(o)).count();
            masks += 1;
            write_mask(&mut defs, masks, &view, &rest[..run])?;
            body = format!("  <g mask=\"url(#erase-{masks})\">\n{body}  </g>\n");
            rest = &rest[run..];
        } else {
            render_object(&mut body, first)?;
            rest = &rest[1..];
        }
    }

    let mut output = String::new();
    writeln!(
        &mut output,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="{} {} {} {}" width="{}" height="{}">"#,
        view.min_x,
        view.min_y,
        view.width(),
        view.height(),
        view.width(),
        view.height()
    )?;
    if !defs.is_empty() {
        writeln!(&mut output, "  <defs>")?;
        output.push_str(&defs);
        writeln!(&mut output, "  </defs>")?;
    }
    writeln!(
        &mut output,
        r#"  <rect x="{}" y="{}" width="{}" height="{}" fill="white"/>"#,
        view.min_x,
        view.min_y,
        view.width(),
        view.height()
    )?;
    output.push_str(&body);
    writeln!(&mut output, "</svg>")?;
    Ok(output)
}

/// Export canvas objects to an SVG file
pub fn save_svg(objects: &[CanvasObject], path: &Path) -> Result<()> {
    let svg = export_svg(objects)?;
    std::fs::write(path, svg).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn is_eraser(object: &CanvasObject) -> bool {
    matches!(object.body.kind, ShapeKind::EraserPath(_))
}

/// Visible area: every object's bounds plus a margin
fn calculate_bounds(objects: &[CanvasObject]) -> Bounds {
    objects
        .iter()
        .map(CanvasObject::bounds)
        .reduce(|a, b| a.union(&b))
        .map(|b| b.inflate(MARGIN))
        .unwrap_or(Bounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 100.0,
            max_y: 100.0,
        })
}

/// White keeps, black removes
fn write_mask(defs: &mut String, n: usize, view: &Bounds, erasers: &[CanvasObject]) -> Result<()> {
    writeln!(defs, r#"    <mask id="erase-{n}" maskUnits="userSpaceOnUse">"#)?;
    writeln!(
        defs,
        r#"      <rect x="{}" y="{}" width="{}" height="{}" fill="white"/>"#,
        view.min_x,
        view.min_y,
        view.width(),
        view.height()
    )?;
    for eraser in erasers {
        if let ShapeKind::EraserPath(path) = &eraser.body.kind {
            writeln!(
                defs,
                r#"      <path d="{}" transform="{}" fill="none" stroke="black" stroke-width="{}" stroke-linecap="round" stroke-linejoin="round"/>"#,
                path_data(&path.path),
                transform(&eraser.body),
                path.stroke_width
            )?;
        }
    }
    writeln!(defs, "    </mask>")?;
    Ok(())
}

/// SVG transform placing an object's local geometry, whose unscaled
/// top-left is (0, 0), onto the board
fn transform(body: &ShapeBody) -> String {
    let p = body.placement();
    let (w, h) = body.kind.local_size();
    let ax = match p.origin_x {
        OriginX::Left => 0.0,
        OriginX::Center => 0.5,
        OriginX::Right => 1.0,
    } * w
        * p.scale_x;
    let ay = match p.origin_y {
        OriginY::Top => 0.0,
        OriginY::Center => 0.5,
        OriginY::Bottom => 1.0,
    } * h
        * p.scale_y;

    let mut t = format!("translate({} {})", p.left, p.top);
    if p.angle != 0.0 {
        t.push_str(&format!(" rotate({})", p.angle));
    }
    if ax != 0.0 || ay != 0.0 {
        t.push_str(&format!(" translate({} {})", -ax, -ay));
    }
    if p.scale_x != 1.0 || p.scale_y != 1.0 {
        t.push_str(&format!(" scale({} {})", p.scale_x, p.scale_y));
    }
    // Path coordinates are absolute; shift their extent to the local origin
    let extent = match &body.kind {
        ShapeKind::Path(a) | ShapeKind::EraserPath(a) => path_extent(&a.path),
        _ => None,
    };
    if let Some(e) = extent.filter(|e| e.min_x != 0.0 || e.min_y != 0.0) {
        t.push_str(&format!(" translate({} {})", -e.min_x, -e.min_y));
    }
    t
}

fn opacity(body: &ShapeBody) -> String {
    if body.base.opacity < 1.0 {
        format!(r#" opacity="{}""#, body.base.opacity)
    } else {
        String::new()
    }
}

/// Render one painted object
fn render_object(output: &mut String, object: &CanvasObject) -> Result<()> {
    let body = &object.body;
    match &body.kind {
        ShapeKind::Path(a) => render_path(output, body, a),
        ShapeKind::Rectangle(a) => Ok(writeln!(
            output,
            r#"  <rect x="0" y="0" width="{}" height="{}" transform="{}" fill="{}" stroke="{}" stroke-width="{}"{}/>"#,
            a.width,
            a.height,
            transform(body),
            escape_xml(&a.fill),
            escape_xml(&a.stroke),
            a.stroke_width,
            opacity(body)
        )?),
        ShapeKind::Circle(a) => Ok(writeln!(
            output,
            r#"  <circle cx="{}" cy="{}" r="{}" transform="{}" fill="{}" stroke="{}" stroke-width="{}"{}/>"#,
            a.radius,
            a.radius,
            a.radius,
            transform(body),
            escape_xml(&a.fill),
            escape_xml(&a.stroke),
            a.stroke_width,
            opacity(body)
        )?),
        ShapeKind::Text(a) => {
            writeln!(
                output,
                r#"  <text transform="{}" font-family="{}" font-size="{}" fill="{}"{}>"#,
                transform(body),
                escape_xml(&a.font_family),
                a.font_size,
                escape_xml(&a.fill),
                opacity(body)
            )?;
            for (i, line) in a.text.split('\n').enumerate() {
                // First baseline sits one font size below the top edge
                let dy = if i == 0 { a.font_size } else { a.font_size * LINE_HEIGHT };
                writeln!(output, r#"    <tspan x="0" dy="{}">{}</tspan>"#, dy, escape_xml(line))?;
            }
            writeln!(output, "  </text>")?;
            Ok(())
        }
        ShapeKind::EraserPath(_) => Ok(()),
    }
}

fn render_path(output: &mut String, body: &ShapeBody, a: &PathAttrs) -> Result<()> {
    writeln!(
        output,
        r#"  <path d="{}" transform="{}" fill="none" stroke="{}" stroke-width="{}" stroke-linecap="round" stroke-linejoin="round"{}/>"#,
        path_data(&a.path),
        transform(body),
        escape_xml(&a.stroke),
        a.stroke_width,
        opacity(body)
    )?;
    Ok(())
}

fn path_data(path: &[PathCommand]) -> String {
    let mut d = String::new();
    for command in path {
        if !d.is_empty() {
            d.push(' ');
        }
        match command {
            PathCommand::MoveTo(p) => d.push_str(&format!("M {} {}", p.x, p.y)),
            PathCommand::LineTo(p) => d.push_str(&format!("L {} {}", p.x, p.y)),
            PathCommand::QuadTo { ctrl, to } => d.push_str(&format!("Q {} {} {} {}", ctrl.x, ctrl.y, to.x, to.y)),
        }
    }
    d
}

/// Escape special XML characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
