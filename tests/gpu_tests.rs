//! GPU Tests
//!
//! Tests for:
//! - Framebuffer: clear, readback of 8-bit and float attachments, upload,
//!   attachment copies, layout checks, size limits, formats the adapter
//!   cannot render to
//! - Shader library: template rendering and module caching
//! - Streaming views out of a real framebuffer
//! - Shader hole fill agreeing with the host fill
//!
//! Every test returns early when no adapter is available.

use std::sync::Arc;

use glam::Mat4;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;

use sheen::errors::SheenError;
use sheen::finalize::{FillOutcome, ShaderHoleFill, adopt_filled, fill_holes_cpu};
use sheen::gpu::{Framebuffer, FramebufferBuilder, GpuContext, Texture2D};
use sheen::pipeline::{ShaderDefines, ShaderLibrary};
use sheen::settings::FinalizeSettings;
use sheen::stream::{PixelBuffer, RenderTarget};
use sheen::views::ViewSet;

// ============================================================================
// Helpers
// ============================================================================

fn gpu() -> Option<Arc<GpuContext>> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuContext::new_blocking(&FinalizeSettings::default().gpu) {
        Ok(ctx) => Some(Arc::new(ctx)),
        Err(err) => {
            log::warn!("Skipping GPU test: {err}");
            None
        }
    }
}

fn rgba8_target(ctx: &Arc<GpuContext>, width: u32, height: u32, count: usize) -> Framebuffer {
    FramebufferBuilder::new(ctx.clone(), width, height)
        .label("Test Target")
        .add_color_attachments(wgpu::TextureFormat::Rgba8Unorm, count)
        .build()
        .unwrap()
}

fn read_image(target: &mut Framebuffer, index: usize) -> RgbaImage {
    let (width, height) = target.size();
    let mut bytes = vec![0; width as usize * height as usize * 4];
    target.read_attachment(index, &mut bytes).unwrap();
    RgbaImage::from_raw(width, height, bytes).unwrap()
}

// ============================================================================
// Framebuffer
// ============================================================================

#[test]
fn zero_sized_framebuffer_is_rejected() {
    let Some(ctx) = gpu() else { return };
    let result = FramebufferBuilder::new(ctx, 0, 4)
        .add_color_attachment(wgpu::TextureFormat::Rgba8Unorm)
        .build();
    assert!(matches!(result, Err(SheenError::InvalidDimensions { .. })));
}

#[test]
fn oversized_framebuffer_is_rejected() {
    let Some(ctx) = gpu() else { return };
    let too_wide = ctx.max_texture_dimension() + 1;
    let result = FramebufferBuilder::new(ctx.clone(), too_wide, 4)
        .add_color_attachment(wgpu::TextureFormat::Rgba8Unorm)
        .build();
    assert!(matches!(
        result,
        Err(SheenError::InvalidDimensions { width, .. }) if width == too_wide
    ));

    assert!(matches!(
        Texture2D::new(&ctx, "Too Tall", 4, too_wide, wgpu::TextureFormat::Rgba8Unorm),
        Err(SheenError::InvalidDimensions { .. })
    ));
}

#[test]
fn unrenderable_format_is_an_error() {
    let Some(ctx) = gpu() else { return };
    let format = wgpu::TextureFormat::Rgba32Float;
    let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
        | wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::COPY_SRC
        | wgpu::TextureUsages::COPY_DST;

    let result = FramebufferBuilder::new(ctx.clone(), 2, 2)
        .add_color_attachment(format)
        .build();
    if ctx.supports_format(format, usage) {
        assert!(result.is_ok());
    } else {
        // Downlevel adapters (GL) cannot render into 32-bit float targets.
        assert!(matches!(result, Err(SheenError::UnsupportedFormat(f)) if f == format));
    }

    assert!(ctx.supports_format(wgpu::TextureFormat::Rgba8Unorm, usage));
}

#[test]
fn cleared_attachments_read_back_tightly_packed() {
    let Some(ctx) = gpu() else { return };

    // 3 texels per row exercises the row padding of the staging buffer.
    let mut target = rgba8_target(&ctx, 3, 2, 1);
    target.clear_color_buffer(0, wgpu::Color::RED).unwrap();
    let image = read_image(&mut target, 0);
    assert!(image.pixels().all(|p| *p == Rgba([255, 0, 0, 255])));

    assert!(matches!(
        target.clear_color_buffer(2, wgpu::Color::BLACK),
        Err(SheenError::AttachmentMismatch { .. })
    ));

    let float_target = FramebufferBuilder::new(ctx, 3, 2)
        .add_color_attachment(wgpu::TextureFormat::Rgba32Float)
        .build();
    let Ok(mut float_target) = float_target else {
        log::warn!("Skipping float readback: Rgba32Float is not renderable here");
        return;
    };
    float_target
        .clear_color_buffer(0, wgpu::Color { r: 0.25, g: 0.5, b: 0.75, a: 1.0 })
        .unwrap();
    let mut floats = PixelBuffer::new(3, 2, wgpu::TextureFormat::Rgba32Float).unwrap();
    float_target.read_attachment(0, floats.as_mut_bytes()).unwrap();
    assert_eq!(floats.texels_f32().count(), 6);
    assert!(floats.texels_f32().all(|t| t == [0.25, 0.5, 0.75, 1.0]));
}

#[test]
fn clear_all_attachments_clears_every_attachment() {
    let Some(ctx) = gpu() else { return };

    let mut target = rgba8_target(&ctx, 2, 2, 3);
    for i in 0..3 {
        target.clear_color_buffer(i, wgpu::Color::WHITE).unwrap();
    }
    target.clear_all_attachments(wgpu::Color::BLUE).unwrap();

    for i in 0..3 {
        assert!(read_image(&mut target, i).pixels().all(|p| *p == Rgba([0, 0, 255, 255])));
    }
}

#[test]
fn uploads_and_copies_between_targets() {
    let Some(ctx) = gpu() else { return };

    let mut image = RgbaImage::new(4, 4);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        *pixel = Rgba([x as u8 * 60, y as u8 * 60, 7, 255]);
    }

    let source = rgba8_target(&ctx, 4, 4, 1);
    source.upload_rgba8(0, &image).unwrap();

    let mut copy = rgba8_target(&ctx, 4, 4, 1);
    assert!(copy.layout_matches(&source));
    copy.copy_attachment_from(&source, 0).unwrap();
    assert_eq!(read_image(&mut copy, 0), image);

    let other = rgba8_target(&ctx, 4, 4, 2);
    assert!(!copy.layout_matches(&other));
}

#[test]
fn upload_resizes_mismatched_images() {
    let Some(ctx) = gpu() else { return };

    let mut target = rgba8_target(&ctx, 2, 2, 1);
    let large = RgbaImage::from_pixel(8, 8, Rgba([90, 90, 90, 255]));
    target.upload_rgba8(0, &large).unwrap();

    assert!(read_image(&mut target, 0).pixels().all(|p| *p == Rgba([90, 90, 90, 255])));
}

// ============================================================================
// Shader library
// ============================================================================

#[test]
fn identical_sources_share_a_module() {
    let Some(ctx) = gpu() else { return };
    let mut library = ShaderLibrary::new(None).unwrap();

    let with_constant = ShaderDefines::new().define("CONSTANT_TEXTURE_ENABLED", true);
    let without = ShaderDefines::new().define("CONSTANT_TEXTURE_ENABLED", false);

    library.get_or_compile(&ctx.device, "estimate_diffuse", &with_constant).unwrap();
    library.get_or_compile(&ctx.device, "estimate_diffuse", &with_constant).unwrap();
    assert_eq!(library.cached_module_count(), 1);

    library.get_or_compile(&ctx.device, "estimate_diffuse", &without).unwrap();
    assert_eq!(library.cached_module_count(), 2);

    assert!(matches!(
        library.get_or_compile(&ctx.device, "no_such_shader", &without),
        Err(SheenError::ShaderNotFound(_))
    ));
}

// ============================================================================
// Streaming
// ============================================================================

#[test]
fn framebuffer_views_stream_in_parallel() {
    let Some(ctx) = gpu() else { return };

    let mut views = ViewSet::new();
    for _ in 0..6 {
        views.push(Mat4::IDENTITY, Mat4::IDENTITY, None);
    }

    let mut target = rgba8_target(&ctx, 8, 8, 2);
    let draw = |target: &mut Framebuffer, index: usize| {
        let level = index as f64 / 10.0;
        target.clear_color_buffer(0, wgpu::Color { r: level, g: 0.0, b: 0.0, a: 1.0 })?;
        target.clear_color_buffer(1, wgpu::Color::GREEN)
    };

    let seen = Mutex::new(Vec::new());
    {
        let stream = views.parallel_stream(draw, &mut target, 2, 2).unwrap();
        stream
            .for_each(|frame| {
                let red = frame.attachment(0).as_bytes()[0];
                let expected = (frame.index() as f64 / 10.0 * 255.0).round() as u8;
                assert!(red.abs_diff(expected) <= 1, "view {}: {red}", frame.index());
                assert_eq!(&frame.attachment(1).as_bytes()[..4], &[0, 255, 0, 255]);
                seen.lock().push(frame.index());
                Ok(())
            })
            .unwrap();
    }

    let mut seen = seen.into_inner();
    seen.sort_unstable();
    assert_eq!(seen, (0..6).collect::<Vec<_>>());
}

// ============================================================================
// Hole fill
// ============================================================================

#[test]
fn shader_hole_fill_matches_host_fill() {
    let Some(ctx) = gpu() else { return };

    let mut color = RgbaImage::from_pixel(6, 5, Rgba([0, 0, 0, 0]));
    color.put_pixel(0, 0, Rgba([200, 40, 10, 255]));
    color.put_pixel(5, 4, Rgba([20, 180, 90, 255]));
    color.put_pixel(3, 1, Rgba([100, 100, 100, 255]));
    let mut normal = RgbaImage::from_pixel(6, 5, Rgba([0, 0, 0, 0]));
    normal.put_pixel(0, 0, Rgba([128, 128, 255, 255]));
    normal.put_pixel(5, 4, Rgba([255, 128, 128, 255]));
    normal.put_pixel(3, 1, Rgba([128, 255, 128, 255]));

    // Odd pass count leaves the result in the back target.
    let iterations = 5;
    let mut expected = vec![color.clone(), normal.clone()];
    fill_holes_cpu(&mut expected, iterations, 0.5).unwrap();

    let mut library = ShaderLibrary::new(None).unwrap();
    let formats = [wgpu::TextureFormat::Rgba8Unorm; 2];
    let mut op = ShaderHoleFill::new(&ctx, &mut library, &formats, iterations, 0.5).unwrap();

    let mut front = rgba8_target(&ctx, 6, 5, 2);
    front.upload_rgba8(0, &color).unwrap();
    front.upload_rgba8(1, &normal).unwrap();
    let back = rgba8_target(&ctx, 6, 5, 2);

    assert_eq!(adopt_filled(&mut front, back, &mut op), FillOutcome::Swapped);

    for (index, want) in expected.iter().enumerate() {
        let got = read_image(&mut front, index);
        for (x, y, pixel) in want.enumerate_pixels() {
            let actual = got.get_pixel(x, y);
            let close = pixel.0.iter().zip(actual.0).all(|(a, b)| a.abs_diff(b) <= 4);
            assert!(close, "attachment {index} at ({x}, {y}): {actual:?} vs {pixel:?}");
        }
    }
}

#[test]
fn mismatched_ping_pong_targets_keep_the_front() {
    let Some(ctx) = gpu() else { return };

    let mut library = ShaderLibrary::new(None).unwrap();
    let formats = [wgpu::TextureFormat::Rgba8Unorm];
    let mut op = ShaderHoleFill::new(&ctx, &mut library, &formats, 4, 0.5).unwrap();

    let mut front = rgba8_target(&ctx, 4, 4, 1);
    front.clear_color_buffer(0, wgpu::Color::BLUE).unwrap();
    let back = rgba8_target(&ctx, 2, 2, 1);

    assert_eq!(adopt_filled(&mut front, back, &mut op), FillOutcome::Failed);
    assert!(read_image(&mut front, 0).pixels().all(|p| *p == Rgba([0, 0, 255, 255])));
}
