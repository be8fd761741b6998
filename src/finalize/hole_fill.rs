//! Hole Filling
//!
//! Texels with too little multi-view support come out of the diffuse pass
//! with alpha below a threshold. Hole filling propagates valid neighbors into
//! them over many passes, ping-ponging between two render targets of the
//! same layout.
//!
//! A [`HoleFill`] operator receives both targets and reports which one holds
//! the result. [`adopt_filled`] makes that one authoritative and drops the
//! other exactly once, whatever the operator did.

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;

use crate::errors::{Result, SheenError};
use crate::gpu::{Framebuffer, GpuContext};
use crate::pipeline::{FullscreenProgram, ProgramDesc, ShaderDefines, ShaderLibrary};

/// Which of the two targets holds a hole-fill result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
}

impl Side {
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

/// A hole-fill operator over a pair of identically laid out targets.
pub trait HoleFill<T> {
    /// Fills holes starting from `front`, using `back` as scratch space.
    fn fill(&mut self, front: &mut T, back: &mut T) -> Result<Side>;
}

impl<T, F> HoleFill<T> for F
where
    F: FnMut(&mut T, &mut T) -> Result<Side>,
{
    fn fill(&mut self, front: &mut T, back: &mut T) -> Result<Side> {
        self(front, back)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The primary target held the result and stays authoritative.
    Kept,
    /// The secondary target held the result and replaced the primary.
    Swapped,
    /// The operator failed; the unfilled primary stays authoritative.
    Failed,
}

/// Runs `op` over `primary` and `secondary`, leaving the filled result in
/// `primary`. The target that is not adopted is dropped exactly once.
pub fn adopt_filled<T, H>(primary: &mut T, mut secondary: T, op: &mut H) -> FillOutcome
where
    H: HoleFill<T> + ?Sized,
{
    let outcome = match op.fill(primary, &mut secondary) {
        Ok(Side::Front) => FillOutcome::Kept,
        Ok(Side::Back) => {
            std::mem::swap(primary, &mut secondary);
            FillOutcome::Swapped
        }
        Err(err) => {
            log::error!("Hole fill failed, keeping the unfilled result: {err}");
            FillOutcome::Failed
        }
    };
    drop(secondary);
    outcome
}

// ─── GPU operator ────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct HoleFillParams {
    min_fill_alpha: f32,
    _padding: [f32; 3],
}

/// Passes recorded per command buffer.
const PASSES_PER_SUBMIT: u32 = 64;

/// Iterative full-screen hole fill.
///
/// Each pass reads one target and writes the other. After `iterations`
/// passes the result sits in the front target if the count is even and in
/// the back target if it is odd.
pub struct ShaderHoleFill {
    program: FullscreenProgram,
    iterations: u32,
    min_fill_alpha: f32,
}

impl ShaderHoleFill {
    pub fn new(
        ctx: &GpuContext,
        library: &mut ShaderLibrary,
        formats: &[wgpu::TextureFormat],
        iterations: u32,
        min_fill_alpha: f32,
    ) -> Result<Self> {
        let program = FullscreenProgram::new(
            ctx,
            library,
            &ProgramDesc {
                label: "Hole Fill",
                template: "hole_fill",
                defines: ShaderDefines::new().set("attachment_count", formats.len()),
                input_count: formats.len(),
                targets: formats,
                uniform_size: std::mem::size_of::<HoleFillParams>() as u64,
            },
        )?;

        Ok(Self {
            program,
            iterations,
            min_fill_alpha,
        })
    }

    #[inline]
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl HoleFill<Framebuffer> for ShaderHoleFill {
    fn fill(&mut self, front: &mut Framebuffer, back: &mut Framebuffer) -> Result<Side> {
        if !front.layout_matches(back) {
            return Err(SheenError::HoleFill(
                "ping-pong targets differ in layout".to_string(),
            ));
        }

        let ctx = front.context().clone();
        self.program.write_uniforms(
            &ctx,
            &HoleFillParams {
                min_fill_alpha: self.min_fill_alpha,
                _padding: [0.0; 3],
            },
        );

        let front_inputs: Vec<_> = front.attachments().iter().collect();
        let back_inputs: Vec<_> = back.attachments().iter().collect();
        let read_front = self.program.bind(&ctx.device, &front_inputs)?;
        let read_back = self.program.bind(&ctx.device, &back_inputs)?;

        log::debug!("Hole fill: {} pass(es)", self.iterations);

        let mut side = Side::Front;
        let mut remaining = self.iterations;
        while remaining > 0 {
            let batch = remaining.min(PASSES_PER_SUBMIT);
            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Hole Fill"),
                });
            for _ in 0..batch {
                match side {
                    Side::Front => self.program.encode(&mut encoder, &read_front, back, None)?,
                    Side::Back => self.program.encode(&mut encoder, &read_back, front, None)?,
                }
                side = side.flip();
            }
            ctx.queue.submit(std::iter::once(encoder.finish()));
            remaining -= batch;
        }

        Ok(side)
    }
}

// ─── CPU operator ────────────────────────────────────────────────────────────

/// Fills holes on the host: reads the front target back, fills it with
/// [`fill_holes_cpu`] and uploads the result into the front target.
#[derive(Debug, Clone, Copy)]
pub struct CpuHoleFill {
    pub iterations: u32,
    pub min_fill_alpha: f32,
}

impl HoleFill<Framebuffer> for CpuHoleFill {
    fn fill(&mut self, front: &mut Framebuffer, _back: &mut Framebuffer) -> Result<Side> {
        let ctx = front.context().clone();
        let mut images = front
            .attachments()
            .iter()
            .map(|texture| texture.read_rgba8(&ctx))
            .collect::<Result<Vec<_>>>()?;

        let passes = fill_holes_cpu(&mut images, self.iterations, self.min_fill_alpha)?;
        log::debug!("CPU hole fill converged after {passes} pass(es)");

        for (index, image) in images.iter().enumerate() {
            front.upload_rgba8(index, image)?;
        }
        Ok(Side::Front)
    }
}

/// Neighbor-averaging hole fill over a group of equally sized images.
///
/// Validity comes from the alpha of `images[0]`: a texel is valid when its
/// alpha is at least `min_fill_alpha`. Each pass gives every invalid texel
/// with at least one valid in-bounds 4-neighbor the mean of those neighbors
/// (in every image) and marks it valid. Stops early once a pass changes
/// nothing. Returns the number of passes run.
pub fn fill_holes_cpu(images: &mut [RgbaImage], iterations: u32, min_fill_alpha: f32) -> Result<u32> {
    let Some(first) = images.first() else {
        return Ok(0);
    };
    let (width, height) = first.dimensions();
    if images.iter().any(|image| image.dimensions() != (width, height)) {
        return Err(SheenError::HoleFill("images differ in size".to_string()));
    }

    let threshold = (min_fill_alpha.clamp(0.0, 1.0) * 255.0).ceil() as u8;
    let is_valid = |image: &RgbaImage, x: u32, y: u32| image.get_pixel(x, y)[3] >= threshold;

    let mut passes = 0;
    while passes < iterations {
        let previous: Vec<RgbaImage> = images.to_vec();
        let mut changed = false;

        for y in 0..height {
            for x in 0..width {
                if is_valid(&previous[0], x, y) {
                    continue;
                }

                let neighbors = [
                    (x.checked_add(1).filter(|&nx| nx < width), Some(y)),
                    (x.checked_sub(1), Some(y)),
                    (Some(x), y.checked_add(1).filter(|&ny| ny < height)),
                    (Some(x), y.checked_sub(1)),
                ];
                let valid: Vec<(u32, u32)> = neighbors
                    .into_iter()
                    .filter_map(|(nx, ny)| Some((nx?, ny?)))
                    .filter(|&(nx, ny)| is_valid(&previous[0], nx, ny))
                    .collect();
                if valid.is_empty() {
                    continue;
                }

                for (image, source) in images.iter_mut().zip(&previous) {
                    let mut sum = [0u32; 3];
                    for &(nx, ny) in &valid {
                        let texel = source.get_pixel(nx, ny);
                        for (total, &channel) in sum.iter_mut().zip(&texel.0[..3]) {
                            *total += u32::from(channel);
                        }
                    }
                    let count = valid.len() as u32;
                    let mean = sum.map(|total| ((total + count / 2) / count) as u8);
                    image.put_pixel(x, y, image::Rgba([mean[0], mean[1], mean[2], 255]));
                }
                changed = true;
            }
        }

        passes += 1;
        if !changed {
            break;
        }
    }

    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_flips() {
        assert_eq!(Side::Front.flip(), Side::Back);
        assert_eq!(Side::Back.flip().flip(), Side::Back);
    }

    #[test]
    fn closures_are_operators() {
        let mut primary = vec![1];
        let outcome = adopt_filled(&mut primary, vec![2], &mut |_: &mut Vec<i32>, _: &mut Vec<i32>| {
            Ok(Side::Back)
        });
        assert_eq!(outcome, FillOutcome::Swapped);
        assert_eq!(primary, vec![2]);
    }
}
