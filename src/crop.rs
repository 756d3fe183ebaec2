// src/crop.rs
//
// Interactive crop-box geometry.
// Maps pointer coordinates into image pixels, moves and resizes the crop
// rectangle through eight handles with an optional locked aspect ratio, and
// drives the whole thing from a small pointer state machine.
//
// All rectangles live in image-pixel space. Screen space only exists at the
// edges of CropEditor (pointer events in, Viewport::rect_to_screen out).

use crate::error::{PixelPressError, Result};

/// Default minimum edge length of a crop rectangle, in image pixels.
pub const DEFAULT_MIN_SIZE: f64 = 10.0;

/// Default hit radius around a handle, in screen pixels.
pub const DEFAULT_HANDLE_TOLERANCE: f64 = 12.0;

const EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Crop rectangle in image-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Round to whole pixels while staying inside `image_width x image_height`.
    ///
    /// Edges are rounded independently so adjacent crops share borders, and
    /// the result is never empty.
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> PixelRect {
        let (x, width) = round_span(self.x, self.right(), image_width);
        let (y, height) = round_span(self.y, self.bottom(), image_height);
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }
}

fn round_span(start: f64, end: f64, limit: u32) -> (u32, u32) {
    let limit = limit.max(1);
    let lo = (start.round().max(0.0) as u32).min(limit - 1);
    let hi = (end.round().max(0.0) as u32).clamp(lo + 1, limit);
    (lo, hi - lo)
}

/// Integer crop rectangle handed to the transform engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the rect is non-empty and lies inside the image.
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= image_width as u64
            && self.y as u64 + self.height as u64 <= image_height as u64
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
        )
    }
}

// =============================================================================
// SCREEN <-> IMAGE MAPPING
// =============================================================================

/// Contain-fit of the whole image inside the on-screen container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub container_width: f64,
    pub container_height: f64,
    pub image_width: u32,
    pub image_height: u32,
}

impl Viewport {
    pub fn new(
        container_width: f64,
        container_height: f64,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self> {
        if !(container_width > 0.0 && container_height > 0.0)
            || !container_width.is_finite()
            || !container_height.is_finite()
        {
            return Err(PixelPressError::invalid_argument(
                "container",
                format!("{container_width}x{container_height}"),
                "container must have a positive finite size",
            ));
        }
        if image_width == 0 || image_height == 0 {
            return Err(PixelPressError::invalid_crop_dimensions(
                image_width,
                image_height,
            ));
        }
        Ok(Self {
            container_width,
            container_height,
            image_width,
            image_height,
        })
    }

    /// Screen pixels per image pixel.
    pub fn scale(&self) -> f64 {
        (self.container_width / self.image_width as f64)
            .min(self.container_height / self.image_height as f64)
    }

    /// Top-left of the rendered image inside the container.
    pub fn offset(&self) -> Point {
        let scale = self.scale();
        Point::new(
            (self.container_width - self.image_width as f64 * scale) / 2.0,
            (self.container_height - self.image_height as f64 * scale) / 2.0,
        )
    }

    pub fn to_image(&self, screen: Point) -> Point {
        let scale = self.scale();
        let offset = self.offset();
        Point::new((screen.x - offset.x) / scale, (screen.y - offset.y) / scale)
    }

    pub fn to_screen(&self, image: Point) -> Point {
        let scale = self.scale();
        let offset = self.offset();
        Point::new(image.x * scale + offset.x, image.y * scale + offset.y)
    }

    pub fn rect_to_screen(&self, rect: Rect) -> Rect {
        let scale = self.scale();
        let origin = self.to_screen(Point::new(rect.x, rect.y));
        Rect::new(origin.x, origin.y, rect.width * scale, rect.height * scale)
    }
}

// =============================================================================
// CONSTRAINTS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropConstraints {
    pub image_width: f64,
    pub image_height: f64,
    pub min_size: f64,
    /// Locked width / height ratio.
    pub aspect: Option<f64>,
}

impl CropConstraints {
    pub fn new(image_width: u32, image_height: u32) -> Self {
        Self {
            image_width: image_width as f64,
            image_height: image_height as f64,
            min_size: DEFAULT_MIN_SIZE,
            aspect: None,
        }
    }

    pub fn with_min_size(mut self, min_size: f64) -> Self {
        self.min_size = if min_size.is_finite() {
            min_size.max(1.0)
        } else {
            DEFAULT_MIN_SIZE
        };
        self
    }

    /// Non-positive or non-finite ratios unlock the aspect.
    pub fn with_aspect(mut self, aspect: Option<f64>) -> Self {
        self.aspect = aspect.filter(|r| r.is_finite() && *r > 0.0);
        self
    }

    /// Smallest (width, height) a rectangle may shrink to.
    ///
    /// With a locked ratio both axes must clear the floor at once. When the
    /// image cannot hold such a rectangle, the floor becomes the largest
    /// rectangle of that ratio the image can hold.
    pub fn min_dims(&self) -> (f64, f64) {
        let floor_w = self.min_size.min(self.image_width);
        let floor_h = self.min_size.min(self.image_height);
        match self.aspect {
            None => (floor_w, floor_h),
            Some(ratio) => {
                let mut w = floor_w.max(floor_h * ratio);
                if w > self.image_width {
                    w = self.image_width;
                }
                if w / ratio > self.image_height {
                    w = self.image_height * ratio;
                }
                (w, w / ratio)
            }
        }
    }

    /// Largest rectangle the constraints allow, centred in the image.
    pub fn initial_rect(&self) -> Rect {
        match self.aspect {
            Some(ratio) => centered_rect_with_aspect(self.image_width, self.image_height, ratio),
            None => Rect::new(0.0, 0.0, self.image_width, self.image_height),
        }
    }

    /// Bring an arbitrary rectangle back inside the constraints, keeping its
    /// centre where possible.
    pub fn normalize(&self, rect: Rect) -> Rect {
        let (min_w, min_h) = self.min_dims();
        let center = rect.center();
        let (width, height) = match self.aspect {
            Some(ratio) => {
                let max_w = self.image_width.min(self.image_height * ratio);
                let w = rect
                    .width
                    .min(rect.height * ratio)
                    .max(min_w)
                    .min(max_w);
                (w, w / ratio)
            }
            None => (
                rect.width.max(min_w).min(self.image_width),
                rect.height.max(min_h).min(self.image_height),
            ),
        };
        Rect::new(
            (center.x - width / 2.0).clamp(0.0, (self.image_width - width).max(0.0)),
            (center.y - height / 2.0).clamp(0.0, (self.image_height - height).max(0.0)),
            width,
            height,
        )
    }
}

/// Largest rectangle with `ratio` that fits inside `width x height`, centred.
pub fn centered_rect_with_aspect(width: f64, height: f64, ratio: f64) -> Rect {
    let w = width.min(height * ratio);
    let h = w / ratio;
    Rect::new((width - w) / 2.0, (height - h) / 2.0, w, h)
}

/// Source region drawn by a cover fit: the destination's aspect ratio,
/// as large as possible, centred in the source.
pub fn cover_crop_rect(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Rect {
    centered_rect_with_aspect(
        src_width as f64,
        src_height as f64,
        dst_width as f64 / dst_height as f64,
    )
}

// =============================================================================
// HANDLES
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Handle {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl Handle {
    /// Corners first so they win hit tests over the adjacent edge midpoints.
    pub const ALL: [Handle; 8] = [
        Handle::TopLeft,
        Handle::TopRight,
        Handle::BottomRight,
        Handle::BottomLeft,
        Handle::Top,
        Handle::Right,
        Handle::Bottom,
        Handle::Left,
    ];

    /// Which horizontal and vertical edge the handle moves:
    /// -1 = left/top, 1 = right/bottom, 0 = neither.
    fn directions(self) -> (i8, i8) {
        match self {
            Handle::TopLeft => (-1, -1),
            Handle::Top => (0, -1),
            Handle::TopRight => (1, -1),
            Handle::Right => (1, 0),
            Handle::BottomRight => (1, 1),
            Handle::Bottom => (0, 1),
            Handle::BottomLeft => (-1, 1),
            Handle::Left => (-1, 0),
        }
    }

    pub fn is_corner(self) -> bool {
        let (sx, sy) = self.directions();
        sx != 0 && sy != 0
    }

    /// Where the handle sits on `rect`.
    pub fn position(self, rect: Rect) -> Point {
        let (sx, sy) = self.directions();
        let pick = |dir: i8, lo: f64, len: f64| match dir {
            -1 => lo,
            1 => lo + len,
            _ => lo + len / 2.0,
        };
        Point::new(
            pick(sx, rect.x, rect.width),
            pick(sy, rect.y, rect.height),
        )
    }
}

// =============================================================================
// GEOMETRY OPERATIONS
// =============================================================================

/// Translate `start` by (dx, dy) and keep it fully inside the image.
pub fn drag_rect(start: Rect, dx: f64, dy: f64, constraints: &CropConstraints) -> Rect {
    let max_x = (constraints.image_width - start.width).max(0.0);
    let max_y = (constraints.image_height - start.height).max(0.0);
    Rect {
        x: (start.x + dx).clamp(0.0, max_x),
        y: (start.y + dy).clamp(0.0, max_y),
        ..start
    }
}

/// Resize `start` by dragging `handle` by (dx, dy) image pixels.
///
/// Clamp order: free transform, aspect correction, minimum size, aspect
/// re-correction, bounds. With a locked ratio the bounds step picks the
/// largest width the anchor allows on both axes, so the ratio is exact
/// after every step. If no rectangle of the minimum size fits at the
/// anchor, the step is refused and `start` is returned.
pub fn resize_rect(
    start: Rect,
    handle: Handle,
    dx: f64,
    dy: f64,
    constraints: &CropConstraints,
) -> Rect {
    match constraints.aspect {
        None => resize_free(start, handle, dx, dy, constraints),
        Some(ratio) => resize_locked(start, handle, dx, dy, ratio, constraints).unwrap_or(start),
    }
}

fn resize_free(
    start: Rect,
    handle: Handle,
    dx: f64,
    dy: f64,
    constraints: &CropConstraints,
) -> Rect {
    let (sx, sy) = handle.directions();
    let (min_w, min_h) = constraints.min_dims();
    let (x, width) = move_edge(
        start.x,
        start.right(),
        sx,
        dx,
        min_w,
        constraints.image_width,
    );
    let (y, height) = move_edge(
        start.y,
        start.bottom(),
        sy,
        dy,
        min_h,
        constraints.image_height,
    );
    Rect::new(x, y, width, height)
}

/// Move one edge of the span [lo, hi], then clamp to the floor and to [0, limit].
fn move_edge(lo: f64, hi: f64, dir: i8, delta: f64, floor: f64, limit: f64) -> (f64, f64) {
    match dir {
        -1 => {
            let lo = (lo + delta).min(hi - floor).max(0.0);
            (lo, hi - lo)
        }
        1 => {
            let hi = (hi + delta).max(lo + floor).min(limit);
            (lo, hi - lo)
        }
        _ => (lo, hi - lo),
    }
}

/// Fixed point of a locked-ratio resize on one axis.
#[derive(Clone, Copy, Debug)]
enum Anchor {
    /// Edge at `at` stays, rectangle grows towards +inf.
    Start(f64),
    /// Edge at `at` stays, rectangle grows towards -inf.
    End(f64),
    /// Rectangle stays centred on `at`.
    Center(f64),
}

impl Anchor {
    fn for_axis(dir: i8, lo: f64, hi: f64) -> Self {
        match dir {
            1 => Anchor::Start(lo),
            -1 => Anchor::End(hi),
            _ => Anchor::Center((lo + hi) / 2.0),
        }
    }

    /// Largest span that fits inside [0, limit] from this anchor.
    fn room(self, limit: f64) -> f64 {
        match self {
            Anchor::Start(at) => limit - at,
            Anchor::End(at) => at,
            Anchor::Center(at) => 2.0 * at.min(limit - at),
        }
        .max(0.0)
    }

    fn place(self, len: f64, limit: f64) -> f64 {
        let lo = match self {
            Anchor::Start(at) => at,
            Anchor::End(at) => at - len,
            Anchor::Center(at) => at - len / 2.0,
        };
        lo.clamp(0.0, (limit - len).max(0.0))
    }
}

fn resize_locked(
    start: Rect,
    handle: Handle,
    dx: f64,
    dy: f64,
    ratio: f64,
    constraints: &CropConstraints,
) -> Option<Rect> {
    let (sx, sy) = handle.directions();

    // Free transform of the moving edges.
    let free_w = start.width + f64::from(sx) * dx;
    let free_h = start.height + f64::from(sy) * dy;

    // Aspect correction: the primary axis drives the other.
    let desired_w = match (sx, sy) {
        (0, _) => free_h * ratio,
        (_, 0) => free_w,
        _ => {
            let rel_w = (free_w - start.width).abs() / start.width.max(EPSILON);
            let rel_h = (free_h - start.height).abs() / start.height.max(EPSILON);
            if rel_w >= rel_h {
                free_w
            } else {
                free_h * ratio
            }
        }
    };

    // Minimum size; the derived height follows from the clamped width.
    let (min_w, _) = constraints.min_dims();
    let width = desired_w.max(min_w);

    // Bounds, measured from the anchor on each axis.
    let anchor_x = Anchor::for_axis(sx, start.x, start.right());
    let anchor_y = Anchor::for_axis(sy, start.y, start.bottom());
    let max_w = anchor_x
        .room(constraints.image_width)
        .min(anchor_y.room(constraints.image_height) * ratio);
    if max_w + EPSILON < min_w {
        return None;
    }

    let width = width.min(max_w);
    let height = width / ratio;
    Some(Rect::new(
        anchor_x.place(width, constraints.image_width),
        anchor_y.place(height, constraints.image_height),
        width,
        height,
    ))
}

// =============================================================================
// POINTER STATE MACHINE
// =============================================================================

/// What a pointer-down landed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitTarget {
    Handle(Handle),
    Body,
}

/// Active gesture. Origins are in image-pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gesture {
    Idle,
    Dragging { origin: Point, start: Rect },
    Resizing { handle: Handle, origin: Point, start: Rect },
}

/// Crop box bound to one image shown in one container.
#[derive(Clone, Debug)]
pub struct CropEditor {
    viewport: Viewport,
    constraints: CropConstraints,
    rect: Rect,
    gesture: Gesture,
    handle_tolerance: f64,
}

impl CropEditor {
    pub fn new(viewport: Viewport, aspect: Option<f64>) -> Self {
        let constraints = CropConstraints::new(viewport.image_width, viewport.image_height)
            .with_aspect(aspect);
        Self {
            viewport,
            rect: constraints.initial_rect(),
            constraints,
            gesture: Gesture::Idle,
            handle_tolerance: DEFAULT_HANDLE_TOLERANCE,
        }
    }

    pub fn with_min_size(mut self, min_size: f64) -> Self {
        self.constraints = self.constraints.with_min_size(min_size);
        self.rect = self.constraints.normalize(self.rect);
        self
    }

    pub fn with_handle_tolerance(mut self, tolerance: f64) -> Self {
        self.handle_tolerance = tolerance.max(0.0);
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = self.constraints.normalize(rect);
        self
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn pixel_rect(&self) -> PixelRect {
        self.rect
            .to_pixel_rect(self.viewport.image_width, self.viewport.image_height)
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    pub fn constraints(&self) -> &CropConstraints {
        &self.constraints
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Container resized; the rect is in image space so it is unaffected.
    pub fn set_container(&mut self, width: f64, height: f64) -> Result<()> {
        self.viewport = Viewport::new(
            width,
            height,
            self.viewport.image_width,
            self.viewport.image_height,
        )?;
        Ok(())
    }

    /// Lock or unlock the aspect ratio, re-fitting the rect around its centre.
    pub fn set_aspect(&mut self, aspect: Option<f64>) -> Rect {
        self.constraints = self.constraints.with_aspect(aspect);
        self.rect = self.constraints.normalize(self.rect);
        self.rect
    }

    pub fn hit_test(&self, screen: Point) -> Option<HitTarget> {
        let on_screen = self.viewport.rect_to_screen(self.rect);
        let tolerance = self.handle_tolerance;
        let handle = Handle::ALL.into_iter().find(|h| {
            let p = h.position(on_screen);
            (p.x - screen.x).abs() <= tolerance && (p.y - screen.y).abs() <= tolerance
        });
        match handle {
            Some(h) => Some(HitTarget::Handle(h)),
            None if on_screen.contains(screen) => Some(HitTarget::Body),
            None => None,
        }
    }

    /// Start a gesture. Ignored unless idle.
    pub fn pointer_down(&mut self, screen: Point) -> Option<HitTarget> {
        if self.gesture != Gesture::Idle {
            return None;
        }
        let target = self.hit_test(screen)?;
        let origin = self.viewport.to_image(screen);
        self.gesture = match target {
            HitTarget::Body => Gesture::Dragging {
                origin,
                start: self.rect,
            },
            HitTarget::Handle(handle) => Gesture::Resizing {
                handle,
                origin,
                start: self.rect,
            },
        };
        Some(target)
    }

    /// Update the active gesture. Returns the new rect, or None when idle.
    pub fn pointer_move(&mut self, screen: Point) -> Option<Rect> {
        let current = self.viewport.to_image(screen);
        let next = match self.gesture {
            Gesture::Idle => return None,
            Gesture::Dragging { origin, start } => drag_rect(
                start,
                current.x - origin.x,
                current.y - origin.y,
                &self.constraints,
            ),
            Gesture::Resizing {
                handle,
                origin,
                start,
            } => resize_rect(
                start,
                handle,
                current.x - origin.x,
                current.y - origin.y,
                &self.constraints,
            ),
        };
        self.rect = next;
        Some(next)
    }

    /// End the gesture and return the settled rect.
    pub fn pointer_up(&mut self) -> Rect {
        self.gesture = Gesture::Idle;
        self.rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn assert_inside(rect: Rect, c: &CropConstraints) {
        assert!(rect.x >= -TOL && rect.y >= -TOL, "{rect:?}");
        assert!(rect.right() <= c.image_width + TOL, "{rect:?}");
        assert!(rect.bottom() <= c.image_height + TOL, "{rect:?}");
        let (min_w, min_h) = c.min_dims();
        assert!(rect.width + TOL >= min_w && rect.height + TOL >= min_h, "{rect:?}");
    }

    mod mapping_tests {
        use super::*;

        #[test]
        fn test_scale_and_offset_letterbox_wide_container() {
            // 400x300 image in an 800x300 container: height-bound, scale 1.
            let vp = Viewport::new(800.0, 300.0, 400, 300).unwrap();
            assert!((vp.scale() - 1.0).abs() < TOL);
            assert_eq!(vp.offset(), Point::new(200.0, 0.0));
            assert_eq!(vp.to_image(Point::new(200.0, 0.0)), Point::new(0.0, 0.0));
            assert_eq!(vp.to_image(Point::new(600.0, 300.0)), Point::new(400.0, 300.0));
        }

        #[test]
        fn test_screen_image_roundtrip() {
            let vp = Viewport::new(640.0, 480.0, 4000, 3000).unwrap();
            let p = Point::new(1234.5, 987.25);
            let back = vp.to_image(vp.to_screen(p));
            assert!((back.x - p.x).abs() < 1e-6 && (back.y - p.y).abs() < 1e-6);
        }

        #[test]
        fn test_viewport_rejects_degenerate_sizes() {
            assert!(Viewport::new(0.0, 100.0, 10, 10).is_err());
            assert!(Viewport::new(100.0, f64::NAN, 10, 10).is_err());
            assert!(Viewport::new(100.0, 100.0, 0, 10).is_err());
        }
    }

    mod rect_tests {
        use super::*;

        #[test]
        fn test_to_pixel_rect_stays_inside() {
            let r = Rect::new(-0.4, 10.6, 100.7, 50.2);
            let p = r.to_pixel_rect(100, 60);
            assert_eq!(p, PixelRect::new(0, 11, 100, 49));
            assert!(p.fits_within(100, 60));
        }

        #[test]
        fn test_to_pixel_rect_never_empty() {
            let p = Rect::new(99.9, 0.0, 0.01, 0.01).to_pixel_rect(100, 100);
            assert!(p.width >= 1 && p.height >= 1);
            assert!(p.fits_within(100, 100));
        }

        #[test]
        fn test_cover_crop_rect_for_rotated_photo() {
            // 4000x3000 sensor data with orientation 6 displays as 3000x4000.
            let r = cover_crop_rect(3000, 4000, 1080, 1350);
            assert!((r.aspect_ratio() - 0.8).abs() < 1e-9);
            assert!((r.width - 3000.0).abs() < TOL);
            assert!((r.height - 3750.0).abs() < TOL);
            assert!((r.y - 125.0).abs() < TOL);
        }

        #[test]
        fn test_centered_rect_with_aspect_wide() {
            let r = centered_rect_with_aspect(1000.0, 500.0, 1.0);
            assert_eq!(r, Rect::new(250.0, 0.0, 500.0, 500.0));
        }
    }

    mod drag_tests {
        use super::*;

        #[test]
        fn test_drag_translates() {
            let c = CropConstraints::new(200, 100);
            let r = drag_rect(Rect::new(10.0, 10.0, 50.0, 50.0), 5.0, -3.0, &c);
            assert_eq!(r, Rect::new(15.0, 7.0, 50.0, 50.0));
        }

        #[test]
        fn test_drag_clamps_to_bounds() {
            let c = CropConstraints::new(200, 100);
            let r = drag_rect(Rect::new(10.0, 10.0, 50.0, 50.0), 500.0, -500.0, &c);
            assert_eq!(r, Rect::new(150.0, 0.0, 50.0, 50.0));
        }
    }

    mod resize_free_tests {
        use super::*;

        #[test]
        fn test_bottom_right_grows() {
            let c = CropConstraints::new(200, 200);
            let r = resize_rect(Rect::new(10.0, 10.0, 50.0, 50.0), Handle::BottomRight, 20.0, 30.0, &c);
            assert_eq!(r, Rect::new(10.0, 10.0, 70.0, 80.0));
        }

        #[test]
        fn test_left_edge_cannot_cross_min_size() {
            let c = CropConstraints::new(200, 200);
            let r = resize_rect(Rect::new(10.0, 10.0, 50.0, 50.0), Handle::Left, 100.0, 0.0, &c);
            assert_eq!(r, Rect::new(50.0, 10.0, 10.0, 50.0));
        }

        #[test]
        fn test_top_left_clamps_at_origin() {
            let c = CropConstraints::new(200, 200);
            let r = resize_rect(Rect::new(10.0, 10.0, 50.0, 50.0), Handle::TopLeft, -80.0, -80.0, &c);
            assert_eq!(r, Rect::new(0.0, 0.0, 60.0, 60.0));
        }

        #[test]
        fn test_edge_handle_leaves_other_axis() {
            let c = CropConstraints::new(200, 200);
            let r = resize_rect(Rect::new(10.0, 10.0, 50.0, 50.0), Handle::Bottom, 999.0, 5.0, &c);
            assert_eq!(r, Rect::new(10.0, 10.0, 50.0, 55.0));
        }
    }

    mod resize_locked_tests {
        use super::*;

        #[test]
        fn test_corner_anchors_opposite_corner() {
            let c = CropConstraints::new(400, 400).with_aspect(Some(2.0));
            let start = Rect::new(100.0, 100.0, 100.0, 50.0);
            let r = resize_rect(start, Handle::BottomRight, 40.0, 0.0, &c);
            assert!((r.x - 100.0).abs() < TOL && (r.y - 100.0).abs() < TOL);
            assert!((r.width - 140.0).abs() < TOL);
            assert!((r.aspect_ratio() - 2.0).abs() < 1e-9);

            let r = resize_rect(start, Handle::TopLeft, -40.0, 0.0, &c);
            assert!((r.right() - 200.0).abs() < TOL && (r.bottom() - 150.0).abs() < TOL);
            assert!((r.aspect_ratio() - 2.0).abs() < 1e-9);
        }

        #[test]
        fn test_edge_handle_anchors_center_of_cross_axis() {
            let c = CropConstraints::new(400, 400).with_aspect(Some(1.0));
            let start = Rect::new(100.0, 100.0, 100.0, 100.0);
            let r = resize_rect(start, Handle::Right, 50.0, 0.0, &c);
            assert!((r.x - 100.0).abs() < TOL);
            assert!((r.width - 150.0).abs() < TOL && (r.height - 150.0).abs() < TOL);
            assert!((r.center().y - 150.0).abs() < TOL);
        }

        #[test]
        fn test_bounds_limit_keeps_ratio_exact() {
            // Rect touches the top edge; growing from the bottom-left corner
            // would push past the left edge. Width is limited by the room on
            // the left, and the height follows.
            let c = CropConstraints::new(300, 300).with_aspect(Some(1.5));
            let start = Rect::new(20.0, 0.0, 90.0, 60.0);
            let r = resize_rect(start, Handle::BottomLeft, -500.0, 500.0, &c);
            assert_inside(r, &c);
            assert!((r.aspect_ratio() - 1.5).abs() < 1e-9);
            assert!((r.right() - 110.0).abs() < TOL);
            assert!((r.width - 110.0).abs() < TOL);
        }

        #[test]
        fn test_min_size_applies_to_both_axes() {
            let c = CropConstraints::new(400, 400).with_aspect(Some(4.0));
            let start = Rect::new(0.0, 0.0, 200.0, 50.0);
            let r = resize_rect(start, Handle::BottomRight, -1000.0, 0.0, &c);
            assert!((r.height - 10.0).abs() < TOL);
            assert!((r.width - 40.0).abs() < TOL);
        }

        #[test]
        fn test_extreme_ratio_on_small_image_relaxes_floor() {
            let c = CropConstraints::new(50, 50).with_aspect(Some(20.0));
            let (w, h) = c.min_dims();
            assert!((w - 50.0).abs() < TOL);
            assert!((h - 2.5).abs() < TOL);
        }

        #[test]
        fn test_refuses_step_from_infeasible_start() {
            let c = CropConstraints::new(100, 100).with_aspect(Some(1.0));
            // Anchor pinned at the very edge leaves no room at all.
            let start = Rect::new(95.0, 95.0, 5.0, 5.0);
            let r = resize_rect(start, Handle::BottomRight, 30.0, 30.0, &c);
            assert_eq!(r, start);
        }
    }

    mod editor_tests {
        use super::*;

        fn editor() -> CropEditor {
            // Image 400x200 shown at scale 2 in an 800x600 container, offset (0, 100).
            let vp = Viewport::new(800.0, 600.0, 400, 200).unwrap();
            CropEditor::new(vp, None).with_rect(Rect::new(100.0, 50.0, 100.0, 50.0))
        }

        #[test]
        fn test_initial_rect_with_aspect_is_largest_centered() {
            let vp = Viewport::new(800.0, 600.0, 400, 200).unwrap();
            let ed = CropEditor::new(vp, Some(1.0));
            assert_eq!(ed.rect(), Rect::new(100.0, 0.0, 200.0, 200.0));
        }

        #[test]
        fn test_hit_test_prefers_handles() {
            let ed = editor();
            // Top-left corner of rect (100, 50) is at screen (200, 200).
            assert_eq!(
                ed.hit_test(Point::new(205.0, 195.0)),
                Some(HitTarget::Handle(Handle::TopLeft))
            );
            assert_eq!(
                ed.hit_test(Point::new(300.0, 250.0)),
                Some(HitTarget::Body)
            );
            assert_eq!(ed.hit_test(Point::new(10.0, 10.0)), None);
        }

        #[test]
        fn test_drag_gesture_lifecycle() {
            let mut ed = editor();
            assert_eq!(ed.pointer_down(Point::new(300.0, 250.0)), Some(HitTarget::Body));
            assert!(matches!(ed.gesture(), Gesture::Dragging { .. }));

            // 40 screen px = 20 image px at scale 2.
            let moved = ed.pointer_move(Point::new(340.0, 250.0)).unwrap();
            assert_eq!(moved, Rect::new(120.0, 50.0, 100.0, 50.0));

            // Deltas are measured from the gesture origin, not the last move.
            let moved = ed.pointer_move(Point::new(320.0, 250.0)).unwrap();
            assert_eq!(moved, Rect::new(110.0, 50.0, 100.0, 50.0));

            assert_eq!(ed.pointer_up(), Rect::new(110.0, 50.0, 100.0, 50.0));
            assert_eq!(ed.gesture(), Gesture::Idle);
            assert_eq!(ed.pointer_move(Point::new(0.0, 0.0)), None);
        }

        #[test]
        fn test_resize_gesture_uses_handle() {
            let mut ed = editor();
            // Bottom-right corner of rect (200, 100) -> screen (400, 300).
            assert_eq!(
                ed.pointer_down(Point::new(400.0, 300.0)),
                Some(HitTarget::Handle(Handle::BottomRight))
            );
            let r = ed.pointer_move(Point::new(420.0, 320.0)).unwrap();
            assert_eq!(r, Rect::new(100.0, 50.0, 110.0, 60.0));
            ed.pointer_up();
        }

        #[test]
        fn test_pointer_down_ignored_while_active() {
            let mut ed = editor();
            ed.pointer_down(Point::new(300.0, 250.0));
            assert_eq!(ed.pointer_down(Point::new(400.0, 300.0)), None);
            assert!(matches!(ed.gesture(), Gesture::Dragging { .. }));
        }

        #[test]
        fn test_set_aspect_refits_around_center() {
            let mut ed = editor();
            let r = ed.set_aspect(Some(1.0));
            assert!((r.aspect_ratio() - 1.0).abs() < 1e-9);
            assert!((r.center().x - 150.0).abs() < TOL);
            assert!((r.center().y - 75.0).abs() < TOL);
            assert_inside(r, ed.constraints());
        }

        #[test]
        fn test_set_container_keeps_image_rect() {
            let mut ed = editor();
            let before = ed.rect();
            ed.set_container(400.0, 400.0).unwrap();
            assert_eq!(ed.rect(), before);
            assert!((ed.viewport().scale() - 1.0).abs() < TOL);
        }
    }
}
