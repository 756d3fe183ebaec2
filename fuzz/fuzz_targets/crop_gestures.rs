#![no_main]

//! Fuzz target for the crop editor state machine. Any pointer sequence
//! must leave the rectangle inside the image, at or above the minimum
//! size, and at the locked ratio.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pixel_press::crop::{CropEditor, Point, Viewport};

#[derive(Arbitrary, Debug)]
enum Event {
    Down(i16, i16),
    Move(i16, i16),
    Up,
    Aspect(u8),
}

#[derive(Arbitrary, Debug)]
struct Session {
    image_w: u16,
    image_h: u16,
    container_w: u16,
    container_h: u16,
    events: Vec<Event>,
}

fn aspect_for(code: u8) -> Option<f64> {
    match code % 5 {
        0 => None,
        1 => Some(1.0),
        2 => Some(4.0 / 5.0),
        3 => Some(16.0 / 9.0),
        _ => Some(code as f64 / 64.0 + 0.1),
    }
}

fuzz_target!(|session: Session| {
    let image_w = (session.image_w as u32 % 8000).max(1);
    let image_h = (session.image_h as u32 % 8000).max(1);
    let container_w = (session.container_w as f64 % 2000.0).max(1.0);
    let container_h = (session.container_h as f64 % 2000.0).max(1.0);
    let viewport = match Viewport::new(container_w, container_h, image_w, image_h) {
        Ok(v) => v,
        Err(_) => return,
    };
    let mut editor = CropEditor::new(viewport, None);

    for event in session.events.into_iter().take(256) {
        match event {
            Event::Down(x, y) => {
                editor.pointer_down(Point::new(x as f64, y as f64));
            }
            Event::Move(x, y) => {
                editor.pointer_move(Point::new(x as f64, y as f64));
            }
            Event::Up => {
                editor.pointer_up();
            }
            Event::Aspect(code) => {
                editor.set_aspect(aspect_for(code));
            }
        }

        let rect = editor.rect();
        let c = editor.constraints();
        let (min_w, min_h) = c.min_dims();
        let eps = 1e-6 * c.image_width.max(c.image_height).max(1.0);
        assert!(rect.x >= -eps && rect.y >= -eps);
        assert!(rect.right() <= c.image_width + eps);
        assert!(rect.bottom() <= c.image_height + eps);
        assert!(rect.width >= min_w - eps && rect.height >= min_h - eps);
        if let Some(ratio) = c.aspect {
            assert!((rect.width / rect.height - ratio).abs() <= 1e-6 * ratio.max(1.0));
        }
        assert!(editor.pixel_rect().fits_within(image_w, image_h));
    }
});
