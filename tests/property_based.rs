// tests/property_based.rs
//
// Property tests for crop geometry and draw planning.

use pixel_press::crop::{drag_rect, resize_rect, CropConstraints, Handle, Rect};
use pixel_press::engine::{calc_resize_dimensions, plan_draw};
use pixel_press::ops::{FitMode, OutputFormat, TransformOptions};
use proptest::prelude::*;

const TOLERANCE: f64 = 1e-6;

fn handle_strategy() -> impl Strategy<Value = Handle> {
    prop::sample::select(Handle::ALL.to_vec())
}

fn aspect_strategy() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        Just(None),
        Just(Some(1.0)),
        Just(Some(4.0 / 5.0)),
        Just(Some(16.0 / 9.0)),
        Just(Some(3.0)),
        (0.2f64..5.0).prop_map(Some),
    ]
}

/// Image size plus a valid starting rect for it.
fn scene_strategy() -> impl Strategy<Value = (CropConstraints, Rect)> {
    (40u32..=2000, 40u32..=2000, aspect_strategy()).prop_map(|(w, h, aspect)| {
        let constraints = CropConstraints::new(w, h).with_aspect(aspect);
        let start = constraints.normalize(Rect::new(
            w as f64 * 0.25,
            h as f64 * 0.25,
            w as f64 * 0.5,
            h as f64 * 0.5,
        ));
        (constraints, start)
    })
}

fn assert_valid(rect: Rect, constraints: &CropConstraints) -> Result<(), TestCaseError> {
    let (min_w, min_h) = constraints.min_dims();
    prop_assert!(rect.x >= -TOLERANCE, "x {}", rect.x);
    prop_assert!(rect.y >= -TOLERANCE, "y {}", rect.y);
    prop_assert!(rect.right() <= constraints.image_width + TOLERANCE, "right {}", rect.right());
    prop_assert!(rect.bottom() <= constraints.image_height + TOLERANCE, "bottom {}", rect.bottom());
    prop_assert!(rect.width >= min_w - TOLERANCE, "width {} < {}", rect.width, min_w);
    prop_assert!(rect.height >= min_h - TOLERANCE, "height {} < {}", rect.height, min_h);
    if let Some(ratio) = constraints.aspect {
        let actual = rect.width / rect.height;
        prop_assert!((actual - ratio).abs() <= TOLERANCE * ratio.max(1.0), "ratio {} vs {}", actual, ratio);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_drag_stays_inside(
        (constraints, start) in scene_strategy(),
        dx in -5000.0f64..5000.0,
        dy in -5000.0f64..5000.0,
    ) {
        let moved = drag_rect(start, dx, dy, &constraints);
        prop_assert_eq!(moved.width, start.width);
        prop_assert_eq!(moved.height, start.height);
        assert_valid(moved, &constraints)?;
    }

    #[test]
    fn prop_resize_keeps_invariants(
        (constraints, start) in scene_strategy(),
        handle in handle_strategy(),
        dx in -3000.0f64..3000.0,
        dy in -3000.0f64..3000.0,
    ) {
        let resized = resize_rect(start, handle, dx, dy, &constraints);
        assert_valid(resized, &constraints)?;
    }

    #[test]
    fn prop_gesture_sequence_keeps_invariants(
        (constraints, start) in scene_strategy(),
        steps in prop::collection::vec((handle_strategy(), -400.0f64..400.0, -400.0f64..400.0), 1..12),
    ) {
        let mut rect = start;
        for (handle, dx, dy) in steps {
            rect = resize_rect(rect, handle, dx, dy, &constraints);
            assert_valid(rect, &constraints)?;
            rect = drag_rect(rect, dy, dx, &constraints);
            assert_valid(rect, &constraints)?;
        }
    }

    #[test]
    fn prop_pixel_rect_inside_image(
        (constraints, start) in scene_strategy(),
        handle in handle_strategy(),
        dx in -3000.0f64..3000.0,
        dy in -3000.0f64..3000.0,
    ) {
        let rect = resize_rect(start, handle, dx, dy, &constraints);
        let (w, h) = (constraints.image_width as u32, constraints.image_height as u32);
        let px = rect.to_pixel_rect(w, h);
        prop_assert!(px.fits_within(w, h), "{:?} outside {}x{}", px, w, h);
    }

    #[test]
    fn prop_single_axis_resize_keeps_aspect(
        orig_w in 1u32..=4000,
        orig_h in 1u32..=4000,
        target_w in 1u32..=4000,
    ) {
        let (w, h) = calc_resize_dimensions(orig_w, orig_h, Some(target_w), None);
        prop_assert_eq!(w, target_w);
        let expected = orig_h as f64 * target_w as f64 / orig_w as f64;
        prop_assert!((h as f64 - expected).abs() <= 1.0, "h {} vs {}", h, expected);
    }

    #[test]
    fn prop_cover_fills_exact_target(
        src_w in 1u32..=6000,
        src_h in 1u32..=6000,
        dst_w in 1u32..=2000,
        dst_h in 1u32..=2000,
    ) {
        let options = TransformOptions::new(OutputFormat::Jpeg)
            .with_size(Some(dst_w), Some(dst_h))
            .with_fit(FitMode::Cover);
        let plan = plan_draw(src_w, src_h, &options).unwrap();
        prop_assert_eq!((plan.canvas_width, plan.canvas_height), (dst_w, dst_h));
        prop_assert!(plan.covers_canvas());
        let src_ratio = plan.source.width / plan.source.height;
        let dst_ratio = dst_w as f64 / dst_h as f64;
        prop_assert!((src_ratio - dst_ratio).abs() <= 1e-9 * dst_ratio.max(1.0));
        prop_assert!(plan.source.right() <= src_w as f64 + TOLERANCE);
        prop_assert!(plan.source.bottom() <= src_h as f64 + TOLERANCE);
    }

    #[test]
    fn prop_contain_fits_inside_canvas(
        src_w in 1u32..=6000,
        src_h in 1u32..=6000,
        dst_w in 1u32..=2000,
        dst_h in 1u32..=2000,
    ) {
        let options = TransformOptions::new(OutputFormat::Png)
            .with_size(Some(dst_w), Some(dst_h))
            .with_fit(FitMode::Contain);
        let plan = plan_draw(src_w, src_h, &options).unwrap();
        prop_assert_eq!((plan.canvas_width, plan.canvas_height), (dst_w, dst_h));
        prop_assert!(plan.draw_width >= 1 && plan.draw_height >= 1);
        prop_assert!(plan.draw_x + plan.draw_width <= dst_w);
        prop_assert!(plan.draw_y + plan.draw_height <= dst_h);
    }
}
