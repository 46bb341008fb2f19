//! Translation of pending transitions into native barriers.
//!
//! The tracking algorithm never looks at which native API it records for. Everything that
//! depends on the API is behind the [`Backend`] trait, which has one implementation per API:
//! [`VulkanBackend`] and [`D3d12Backend`]. Each of them translates the abstract states through its
//! own mapping table and hands the result to a sink that records into a native command buffer.

pub use self::{
    d3d12::{
        convert_resource_states, D3d12Backend, D3d12Box, D3d12CommandSink, D3d12ResourceBarrier,
        D3d12ResourceStates,
    },
    vulkan::{
        convert_resource_state, AshCommandBuffer, ResourceStateMapping, VulkanBackend,
        VulkanCommandSink,
    },
};
use crate::{
    Buffer, BufferBarrier, ClearValue, Framebuffer, ResourceStates, Texture, TextureBarrier,
    TextureSlice, TextureSubresourceSet,
};

pub mod d3d12;
pub mod vulkan;

/// The native side of a [`CommandList`].
///
/// [`CommandList`]: crate::CommandList
pub trait Backend {
    /// Begins rendering to `framebuffer`.
    fn begin_render_pass(&mut self, framebuffer: &Framebuffer);

    /// Ends the render pass that was begun last. Only called while a render pass is active.
    fn end_render_pass(&mut self);

    /// Records all of the given transitions as a single batch. Only called outside of a render
    /// pass, and never with two empty slices.
    fn commit_barriers(
        &mut self,
        texture_barriers: &[TextureBarrier],
        buffer_barriers: &[BufferBarrier],
    );

    /// Returns the state that [`clear_buffer_uint`] needs the buffer to be in.
    ///
    /// [`clear_buffer_uint`]: Self::clear_buffer_uint
    fn buffer_clear_state(&self) -> ResourceStates;

    /// Returns the state that [`clear_texture`] needs `texture` to be in.
    ///
    /// [`clear_texture`]: Self::clear_texture
    fn texture_clear_state(&self, texture: &Texture) -> ResourceStates;

    // The transfer commands below are only called outside of a render pass, after the pending
    // transitions were committed. Their arguments are validated and the slices resolved.

    /// Copies `size` bytes from `src` to `dst`, which are in the `COPY_SOURCE` and `COPY_DEST`
    /// states.
    fn copy_buffer(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    );

    /// Copies `src_slice` of `src` to the offset of `dst_slice` in `dst`. The two slices have the
    /// same extent.
    fn copy_texture(
        &mut self,
        dst: &Texture,
        dst_slice: &TextureSlice,
        src: &Texture,
        src_slice: &TextureSlice,
    );

    /// Writes `data` to `buffer` at `offset`. `buffer` is in the `COPY_DEST` state.
    fn write_buffer(&mut self, buffer: &Buffer, data: &[u8], offset: u64);

    fn clear_buffer_uint(&mut self, buffer: &Buffer, value: u32);

    fn clear_texture(
        &mut self,
        texture: &Texture,
        subresources: &TextureSubresourceSet,
        value: ClearValue,
    );
}

impl<B: Backend + ?Sized> Backend for &mut B {
    #[inline]
    fn begin_render_pass(&mut self, framebuffer: &Framebuffer) {
        (**self).begin_render_pass(framebuffer);
    }

    #[inline]
    fn end_render_pass(&mut self) {
        (**self).end_render_pass();
    }

    #[inline]
    fn commit_barriers(
        &mut self,
        texture_barriers: &[TextureBarrier],
        buffer_barriers: &[BufferBarrier],
    ) {
        (**self).commit_barriers(texture_barriers, buffer_barriers);
    }

    #[inline]
    fn buffer_clear_state(&self) -> ResourceStates {
        (**self).buffer_clear_state()
    }

    #[inline]
    fn texture_clear_state(&self, texture: &Texture) -> ResourceStates {
        (**self).texture_clear_state(texture)
    }

    #[inline]
    fn copy_buffer(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) {
        (**self).copy_buffer(dst, dst_offset, src, src_offset, size);
    }

    #[inline]
    fn copy_texture(
        &mut self,
        dst: &Texture,
        dst_slice: &TextureSlice,
        src: &Texture,
        src_slice: &TextureSlice,
    ) {
        (**self).copy_texture(dst, dst_slice, src, src_slice);
    }

    #[inline]
    fn write_buffer(&mut self, buffer: &Buffer, data: &[u8], offset: u64) {
        (**self).write_buffer(buffer, data, offset);
    }

    #[inline]
    fn clear_buffer_uint(&mut self, buffer: &Buffer, value: u32) {
        (**self).clear_buffer_uint(buffer, value);
    }

    #[inline]
    fn clear_texture(
        &mut self,
        texture: &Texture,
        subresources: &TextureSubresourceSet,
        value: ClearValue,
    ) {
        (**self).clear_texture(texture, subresources, value);
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    #[inline]
    fn begin_render_pass(&mut self, framebuffer: &Framebuffer) {
        (**self).begin_render_pass(framebuffer);
    }

    #[inline]
    fn end_render_pass(&mut self) {
        (**self).end_render_pass();
    }

    #[inline]
    fn commit_barriers(
        &mut self,
        texture_barriers: &[TextureBarrier],
        buffer_barriers: &[BufferBarrier],
    ) {
        (**self).commit_barriers(texture_barriers, buffer_barriers);
    }

    #[inline]
    fn buffer_clear_state(&self) -> ResourceStates {
        (**self).buffer_clear_state()
    }

    #[inline]
    fn texture_clear_state(&self, texture: &Texture) -> ResourceStates {
        (**self).texture_clear_state(texture)
    }

    #[inline]
    fn copy_buffer(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) {
        (**self).copy_buffer(dst, dst_offset, src, src_offset, size);
    }

    #[inline]
    fn copy_texture(
        &mut self,
        dst: &Texture,
        dst_slice: &TextureSlice,
        src: &Texture,
        src_slice: &TextureSlice,
    ) {
        (**self).copy_texture(dst, dst_slice, src, src_slice);
    }

    #[inline]
    fn write_buffer(&mut self, buffer: &Buffer, data: &[u8], offset: u64) {
        (**self).write_buffer(buffer, data, offset);
    }

    #[inline]
    fn clear_buffer_uint(&mut self, buffer: &Buffer, value: u32) {
        (**self).clear_buffer_uint(buffer, value);
    }

    #[inline]
    fn clear_texture(
        &mut self,
        texture: &Texture,
        subresources: &TextureSubresourceSet,
        value: ClearValue,
    ) {
        (**self).clear_texture(texture, subresources, value);
    }
}
