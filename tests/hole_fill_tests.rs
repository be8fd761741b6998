//! Hole Fill Tests
//!
//! Tests for:
//! - adopt_filled: front kept, back adopted, operator failure; each target
//!   dropped exactly once
//! - fill_holes_cpu: neighbor averaging, propagation, validity from the
//!   first image, early exit, size checks

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgba, RgbaImage};

use sheen::errors::{Result, SheenError};
use sheen::finalize::{FillOutcome, Side, adopt_filled, fill_holes_cpu};

// ============================================================================
// Ping-pong adoption
// ============================================================================

/// Stand-in render target that counts how often it is dropped.
struct Tracked {
    name: &'static str,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(name: &'static str) -> (Self, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                drops: drops.clone(),
            },
            drops,
        )
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn returning(side: Result<Side>) -> impl FnMut(&mut Tracked, &mut Tracked) -> Result<Side> {
    let mut side = Some(side);
    move |front, back| {
        assert_eq!(front.name, "primary");
        assert_eq!(back.name, "secondary");
        side.take().expect("operator called twice")
    }
}

#[test]
fn operator_returning_front_keeps_primary() {
    let (mut primary, primary_drops) = Tracked::new("primary");
    let (secondary, secondary_drops) = Tracked::new("secondary");

    let outcome = adopt_filled(&mut primary, secondary, &mut returning(Ok(Side::Front)));

    assert_eq!(outcome, FillOutcome::Kept);
    assert_eq!(primary.name, "primary");
    assert_eq!(primary_drops.load(Ordering::SeqCst), 0);
    assert_eq!(secondary_drops.load(Ordering::SeqCst), 1);

    drop(primary);
    assert_eq!(primary_drops.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_drops.load(Ordering::SeqCst), 1);
}

#[test]
fn operator_returning_back_adopts_secondary() {
    let (mut primary, primary_drops) = Tracked::new("primary");
    let (secondary, secondary_drops) = Tracked::new("secondary");

    let outcome = adopt_filled(&mut primary, secondary, &mut returning(Ok(Side::Back)));

    assert_eq!(outcome, FillOutcome::Swapped);
    assert_eq!(primary.name, "secondary");
    assert_eq!(primary_drops.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_drops.load(Ordering::SeqCst), 0);

    drop(primary);
    assert_eq!(primary_drops.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_drops.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_operator_keeps_primary_and_drops_secondary_once() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut primary, primary_drops) = Tracked::new("primary");
    let (secondary, secondary_drops) = Tracked::new("secondary");

    let outcome = adopt_filled(
        &mut primary,
        secondary,
        &mut returning(Err(SheenError::HoleFill("boom".into()))),
    );

    assert_eq!(outcome, FillOutcome::Failed);
    assert_eq!(primary.name, "primary");
    assert_eq!(primary_drops.load(Ordering::SeqCst), 0);
    assert_eq!(secondary_drops.load(Ordering::SeqCst), 1);

    drop(primary);
    assert_eq!(primary_drops.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_drops.load(Ordering::SeqCst), 1);
}

// ============================================================================
// CPU fill
// ============================================================================

const HOLE: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[test]
fn hole_takes_the_mean_of_valid_neighbors() {
    let mut image = RgbaImage::from_pixel(3, 3, HOLE);
    image.put_pixel(1, 0, Rgba([100, 0, 0, 255]));
    image.put_pixel(0, 1, Rgba([200, 0, 0, 255]));
    image.put_pixel(2, 1, Rgba([0, 90, 0, 255]));
    image.put_pixel(1, 2, Rgba([0, 0, 40, 255]));

    fill_holes_cpu(std::slice::from_mut(&mut image), 1, 0.5).unwrap();

    assert_eq!(*image.get_pixel(1, 1), Rgba([75, 23, 10, 255]));
    // Corners saw two valid neighbors in the first pass.
    assert_eq!(*image.get_pixel(0, 0), Rgba([150, 0, 0, 255]));
}

#[test]
fn a_single_seed_propagates_across_the_image() {
    let mut image = RgbaImage::from_pixel(5, 4, HOLE);
    image.put_pixel(0, 0, Rgba([10, 20, 30, 255]));

    let passes = fill_holes_cpu(std::slice::from_mut(&mut image), 20, 0.5).unwrap();

    // Seven passes reach the far corner, the eighth changes nothing.
    assert_eq!(passes, 8);
    assert!(image.pixels().all(|p| *p == Rgba([10, 20, 30, 255])));
}

#[test]
fn iteration_limit_bounds_propagation() {
    let mut image = RgbaImage::from_pixel(6, 1, HOLE);
    image.put_pixel(0, 0, Rgba([50, 50, 50, 255]));

    let passes = fill_holes_cpu(std::slice::from_mut(&mut image), 2, 0.5).unwrap();

    assert_eq!(passes, 2);
    assert_eq!(image.get_pixel(2, 0)[3], 255);
    assert_eq!(image.get_pixel(3, 0)[3], 0);
}

#[test]
fn fill_stops_once_nothing_changes() {
    let mut image = RgbaImage::from_pixel(4, 4, HOLE);
    let passes = fill_holes_cpu(std::slice::from_mut(&mut image), 100, 0.5).unwrap();
    assert_eq!(passes, 1);
    assert!(image.pixels().all(|p| *p == HOLE));
}

#[test]
fn validity_comes_from_the_first_image() {
    let mut diffuse = RgbaImage::from_pixel(2, 1, HOLE);
    diffuse.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    let mut normal = RgbaImage::from_pixel(2, 1, Rgba([128, 128, 255, 255]));
    normal.put_pixel(0, 0, Rgba([0, 255, 0, 10]));

    let mut images = [diffuse, normal];
    fill_holes_cpu(&mut images, 1, 0.5).unwrap();

    assert_eq!(*images[0].get_pixel(1, 0), Rgba([255, 0, 0, 255]));
    assert_eq!(*images[1].get_pixel(1, 0), Rgba([0, 255, 0, 255]));
}

#[test]
fn alpha_threshold_is_inclusive() {
    let mut image = RgbaImage::from_pixel(2, 1, HOLE);
    image.put_pixel(0, 0, Rgba([9, 9, 9, 128]));
    image.put_pixel(1, 0, Rgba([1, 1, 1, 127]));

    fill_holes_cpu(std::slice::from_mut(&mut image), 1, 0.5).unwrap();

    assert_eq!(*image.get_pixel(0, 0), Rgba([9, 9, 9, 128]));
    assert_eq!(*image.get_pixel(1, 0), Rgba([9, 9, 9, 255]));
}

#[test]
fn mismatched_sizes_are_rejected() {
    let mut images = [RgbaImage::new(2, 2), RgbaImage::new(3, 2)];
    assert!(matches!(
        fill_holes_cpu(&mut images, 1, 0.5),
        Err(SheenError::HoleFill(_))
    ));
}
