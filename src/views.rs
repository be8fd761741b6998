//! Views and the view-stream factory.
//!
//! A [`ViewSet`] is the ordered, fixed-size collection of calibrated
//! photographs a reconstruction works from. It is the entry point for
//! building [`ViewStream`]s: the set fixes the number of views, the caller
//! supplies the draw step and the render target.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::errors::Result;
use crate::gpu::Texture2D;
use crate::stream::{RenderTarget, StreamMode, ViewStream};

/// One calibrated photograph.
#[derive(Debug, Clone)]
pub struct View {
    pub index: usize,
    /// Object space to camera space.
    pub model_view: Mat4,
    pub projection: Mat4,
    pub photograph: Option<Arc<Texture2D>>,
}

/// Per-draw parameters for a view, laid out for a uniform buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewUniforms {
    pub model_view: Mat4,
    pub projection: Mat4,
    pub view_index: u32,
    pub _padding: [u32; 3],
}

#[derive(Debug, Clone, Default)]
pub struct ViewSet {
    views: Vec<View>,
}

impl ViewSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a view; its index is its position in the set.
    pub fn push(&mut self, model_view: Mat4, projection: Mat4, photograph: Option<Arc<Texture2D>>) -> usize {
        let index = self.views.len();
        self.views.push(View {
            index,
            model_view,
            projection,
            photograph,
        });
        index
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&View> {
        self.views.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, View> {
        self.views.iter()
    }

    #[must_use]
    pub fn uniforms(&self, index: usize) -> Option<ViewUniforms> {
        self.views.get(index).map(|view| ViewUniforms {
            model_view: view.model_view,
            projection: view.projection,
            view_index: view.index as u32,
            _padding: [0; 3],
        })
    }

    /// A sequential stream over every view in the set.
    pub fn stream<'a, T: RenderTarget>(
        &self,
        draw: impl FnMut(&mut T, usize) -> Result<()> + 'a,
        target: &'a mut T,
        attachment_count: usize,
    ) -> Result<ViewStream<'a, T>> {
        ViewStream::new(self.len(), draw, target, attachment_count)
    }

    /// A parallel stream with at most `max_running_threads` consumers.
    pub fn parallel_stream<'a, T: RenderTarget>(
        &self,
        draw: impl FnMut(&mut T, usize) -> Result<()> + 'a,
        target: &'a mut T,
        attachment_count: usize,
        max_running_threads: usize,
    ) -> Result<ViewStream<'a, T>> {
        Ok(self
            .stream(draw, target, attachment_count)?
            .with_mode(StreamMode::parallel(max_running_threads)))
    }

    /// Sequential stream that reads back attachment 0 only.
    pub fn stream_single<'a, T: RenderTarget>(
        &self,
        draw: impl FnMut(&mut T, usize) -> Result<()> + 'a,
        target: &'a mut T,
    ) -> Result<ViewStream<'a, T>> {
        self.stream(draw, target, 1)
    }

    pub fn parallel_stream_single<'a, T: RenderTarget>(
        &self,
        draw: impl FnMut(&mut T, usize) -> Result<()> + 'a,
        target: &'a mut T,
        max_running_threads: usize,
    ) -> Result<ViewStream<'a, T>> {
        self.parallel_stream(draw, target, 1, max_running_threads)
    }
}

impl<'s> IntoIterator for &'s ViewSet {
    type Item = &'s View;
    type IntoIter = std::slice::Iter<'s, View>;

    fn into_iter(self) -> Self::IntoIter {
        self.views.iter()
    }
}
