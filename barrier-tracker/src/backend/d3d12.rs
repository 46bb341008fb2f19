//! The Direct3D 12 backend.
//!
//! Barriers are described with plain data that mirrors `D3D12_RESOURCE_BARRIER`, so that the sink
//! can build the native structures with whichever bindings the application uses. Resources are
//! referenced by their raw `ID3D12Resource` pointer, as stored in [`Texture::handle`].
//!
//! [`Texture::handle`]: crate::Texture::handle

use super::Backend;
use crate::{
    Buffer, BufferBarrier, ClearValue, Framebuffer, ResourceStates, Texture, TextureBarrier,
    TextureDesc, TextureSlice, TextureSubresourceSet,
};
use smallvec::SmallVec;
use std::ops::{BitOr, BitOrAssign};

/// A set of `D3D12_RESOURCE_STATES` flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct D3d12ResourceStates(pub u32);

impl D3d12ResourceStates {
    pub const COMMON: Self = Self(0);
    pub const VERTEX_AND_CONSTANT_BUFFER: Self = Self(0x1);
    pub const INDEX_BUFFER: Self = Self(0x2);
    pub const RENDER_TARGET: Self = Self(0x4);
    pub const UNORDERED_ACCESS: Self = Self(0x8);
    pub const DEPTH_WRITE: Self = Self(0x10);
    pub const DEPTH_READ: Self = Self(0x20);
    pub const NON_PIXEL_SHADER_RESOURCE: Self = Self(0x40);
    pub const PIXEL_SHADER_RESOURCE: Self = Self(0x80);
    pub const STREAM_OUT: Self = Self(0x100);
    pub const INDIRECT_ARGUMENT: Self = Self(0x200);
    pub const COPY_DEST: Self = Self(0x400);
    pub const COPY_SOURCE: Self = Self(0x800);
    pub const RESOLVE_DEST: Self = Self(0x1000);
    pub const RESOLVE_SOURCE: Self = Self(0x2000);
    pub const RAYTRACING_ACCELERATION_STRUCTURE: Self = Self(0x40_0000);
    pub const SHADING_RATE_SOURCE: Self = Self(0x100_0000);
    pub const PRESENT: Self = Self(0);

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for D3d12ResourceStates {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for D3d12ResourceStates {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Returns the Direct3D 12 equivalent of `states`.
///
/// [`ResourceStates::UNKNOWN`] maps to `COMMON`, which is the state that resources are created
/// in.
pub fn convert_resource_states(states: ResourceStates) -> D3d12ResourceStates {
    let mut result = D3d12ResourceStates::COMMON;

    for state in states.iter() {
        result |= match state {
            ResourceStates::CONSTANT_BUFFER | ResourceStates::VERTEX_BUFFER => {
                D3d12ResourceStates::VERTEX_AND_CONSTANT_BUFFER
            }
            ResourceStates::INDEX_BUFFER => D3d12ResourceStates::INDEX_BUFFER,
            ResourceStates::INDIRECT_ARGUMENT => D3d12ResourceStates::INDIRECT_ARGUMENT,
            ResourceStates::SHADER_RESOURCE => {
                D3d12ResourceStates::PIXEL_SHADER_RESOURCE
                    | D3d12ResourceStates::NON_PIXEL_SHADER_RESOURCE
            }
            ResourceStates::UNORDERED_ACCESS => D3d12ResourceStates::UNORDERED_ACCESS,
            ResourceStates::RENDER_TARGET => D3d12ResourceStates::RENDER_TARGET,
            ResourceStates::DEPTH_WRITE => D3d12ResourceStates::DEPTH_WRITE,
            ResourceStates::DEPTH_READ => D3d12ResourceStates::DEPTH_READ,
            ResourceStates::STREAM_OUT => D3d12ResourceStates::STREAM_OUT,
            ResourceStates::COPY_DEST => D3d12ResourceStates::COPY_DEST,
            ResourceStates::COPY_SOURCE => D3d12ResourceStates::COPY_SOURCE,
            ResourceStates::RESOLVE_DEST => D3d12ResourceStates::RESOLVE_DEST,
            ResourceStates::RESOLVE_SOURCE => D3d12ResourceStates::RESOLVE_SOURCE,
            ResourceStates::ACCEL_STRUCT_READ
            | ResourceStates::ACCEL_STRUCT_WRITE
            | ResourceStates::ACCEL_STRUCT_BUILD_BLAS
            | ResourceStates::OPACITY_MICROMAP_WRITE => {
                D3d12ResourceStates::RAYTRACING_ACCELERATION_STRUCTURE
            }
            ResourceStates::ACCEL_STRUCT_BUILD_INPUT
            | ResourceStates::OPACITY_MICROMAP_BUILD_INPUT => {
                D3d12ResourceStates::NON_PIXEL_SHADER_RESOURCE
            }
            ResourceStates::SHADING_RATE_SURFACE => D3d12ResourceStates::SHADING_RATE_SOURCE,
            // `COMMON` and `PRESENT` are both zero.
            _ => D3d12ResourceStates::COMMON,
        };
    }

    result
}

/// One `D3D12_RESOURCE_BARRIER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum D3d12ResourceBarrier {
    Transition {
        resource: u64,
        subresource: u32,
        state_before: D3d12ResourceStates,
        state_after: D3d12ResourceStates,
    },
    Uav {
        resource: u64,
    },
}

impl D3d12ResourceBarrier {
    /// `D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES`.
    pub const ALL_SUBRESOURCES: u32 = 0xffff_ffff;
}

/// A `D3D12_BOX`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct D3d12Box {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

/// Records translated commands into an `ID3D12GraphicsCommandList`.
///
/// Texture subresources are identified by their `D3D12CalcSubresource` index.
pub trait D3d12CommandSink {
    /// Records all of `barriers` with one `ResourceBarrier` call.
    fn resource_barrier(&mut self, barriers: &[D3d12ResourceBarrier]);

    fn copy_buffer_region(
        &mut self,
        dst: u64,
        dst_offset: u64,
        src: u64,
        src_offset: u64,
        num_bytes: u64,
    );

    /// Records `CopyTextureRegion` between two subresource indices.
    fn copy_texture_region(
        &mut self,
        dst: u64,
        dst_subresource: u32,
        dst_origin: [u32; 3],
        src: u64,
        src_subresource: u32,
        src_box: &D3d12Box,
    );

    /// Writes `data` to `buffer` at `offset`, usually through an upload heap and
    /// `CopyBufferRegion`.
    fn write_buffer(&mut self, buffer: u64, offset: u64, data: &[u8]);

    /// Records `ClearUnorderedAccessViewUint` on a view of one subresource. Buffers are
    /// subresource `0`.
    fn clear_unordered_access_view_uint(
        &mut self,
        resource: u64,
        subresource: u32,
        values: [u32; 4],
    );

    fn clear_unordered_access_view_float(
        &mut self,
        resource: u64,
        subresource: u32,
        values: [f32; 4],
    );

    /// Records `ClearDepthStencilView` on a view of one subresource.
    fn clear_depth_stencil_view(
        &mut self,
        resource: u64,
        subresource: u32,
        depth: f32,
        stencil: u8,
    );

    fn begin_render_pass(&mut self, framebuffer: &Framebuffer) {
        let _ = framebuffer;
    }

    fn end_render_pass(&mut self) {}
}

/// A [`Backend`] that records Direct3D 12 commands into a [`D3d12CommandSink`].
///
/// Color textures and buffers are cleared through unordered-access views, depth textures through
/// depth-stencil views.
#[derive(Debug)]
pub struct D3d12Backend<S> {
    sink: S,
}

impl<S: D3d12CommandSink> D3d12Backend<S> {
    #[inline]
    pub fn new(sink: S) -> Self {
        D3d12Backend { sink }
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    #[inline]
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: D3d12CommandSink> Backend for D3d12Backend<S> {
    fn begin_render_pass(&mut self, framebuffer: &Framebuffer) {
        self.sink.begin_render_pass(framebuffer);
    }

    fn end_render_pass(&mut self) {
        self.sink.end_render_pass();
    }

    fn commit_barriers(
        &mut self,
        texture_barriers: &[TextureBarrier],
        buffer_barriers: &[BufferBarrier],
    ) {
        let mut barriers: SmallVec<[D3d12ResourceBarrier; 16]> = SmallVec::new();

        for barrier in texture_barriers {
            let state_before = convert_resource_states(barrier.state_before);
            let state_after = convert_resource_states(barrier.state_after);
            let resource = barrier.texture.handle();

            if state_before != state_after {
                if barrier.entire_texture {
                    barriers.push(D3d12ResourceBarrier::Transition {
                        resource,
                        subresource: D3d12ResourceBarrier::ALL_SUBRESOURCES,
                        state_before,
                        state_after,
                    });
                } else {
                    let desc = barrier.texture.desc();
                    let plane_count = if desc.format.has_stencil() { 2 } else { 1 };

                    for plane_slice in 0..plane_count {
                        for (mip_level, array_slice) in barrier.subresources.iter() {
                            barriers.push(D3d12ResourceBarrier::Transition {
                                resource,
                                subresource: subresource_index(desc, mip_level, array_slice)
                                    + plane_slice * desc.mip_levels * desc.array_size,
                                state_before,
                                state_after,
                            });
                        }
                    }
                }
            } else if state_after.intersects(D3d12ResourceStates::UNORDERED_ACCESS) {
                barriers.push(D3d12ResourceBarrier::Uav { resource });
            }
        }

        for barrier in buffer_barriers {
            let state_before = convert_resource_states(barrier.state_before);
            let state_after = convert_resource_states(barrier.state_after);
            let resource = barrier.buffer.handle();

            if state_before != state_after {
                barriers.push(D3d12ResourceBarrier::Transition {
                    resource,
                    subresource: D3d12ResourceBarrier::ALL_SUBRESOURCES,
                    state_before,
                    state_after,
                });
            } else if state_after.intersects(D3d12ResourceStates::UNORDERED_ACCESS) {
                barriers.push(D3d12ResourceBarrier::Uav { resource });
            }
        }

        if !barriers.is_empty() {
            self.sink.resource_barrier(&barriers);
        }
    }

    #[inline]
    fn buffer_clear_state(&self) -> ResourceStates {
        ResourceStates::UNORDERED_ACCESS
    }

    #[inline]
    fn texture_clear_state(&self, texture: &Texture) -> ResourceStates {
        if texture.desc().format.has_depth() {
            ResourceStates::DEPTH_WRITE
        } else {
            ResourceStates::UNORDERED_ACCESS
        }
    }

    fn copy_buffer(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) {
        self.sink
            .copy_buffer_region(dst.handle(), dst_offset, src.handle(), src_offset, size);
    }

    fn copy_texture(
        &mut self,
        dst: &Texture,
        dst_slice: &TextureSlice,
        src: &Texture,
        src_slice: &TextureSlice,
    ) {
        let src_box = D3d12Box {
            left: src_slice.x,
            top: src_slice.y,
            front: src_slice.z,
            right: src_slice.x + src_slice.width,
            bottom: src_slice.y + src_slice.height,
            back: src_slice.z + src_slice.depth,
        };

        self.sink.copy_texture_region(
            dst.handle(),
            subresource_index(dst.desc(), dst_slice.mip_level, dst_slice.array_slice),
            [dst_slice.x, dst_slice.y, dst_slice.z],
            src.handle(),
            subresource_index(src.desc(), src_slice.mip_level, src_slice.array_slice),
            &src_box,
        );
    }

    fn write_buffer(&mut self, buffer: &Buffer, data: &[u8], offset: u64) {
        self.sink.write_buffer(buffer.handle(), offset, data);
    }

    fn clear_buffer_uint(&mut self, buffer: &Buffer, value: u32) {
        self.sink
            .clear_unordered_access_view_uint(buffer.handle(), 0, [value; 4]);
    }

    fn clear_texture(
        &mut self,
        texture: &Texture,
        subresources: &TextureSubresourceSet,
        value: ClearValue,
    ) {
        let resource = texture.handle();

        for (mip_level, array_slice) in subresources.iter() {
            let subresource = subresource_index(texture.desc(), mip_level, array_slice);

            match value {
                ClearValue::Float(values) => {
                    self.sink
                        .clear_unordered_access_view_float(resource, subresource, values);
                }
                ClearValue::Uint(values) => {
                    self.sink
                        .clear_unordered_access_view_uint(resource, subresource, values);
                }
                ClearValue::Int(values) => {
                    self.sink.clear_unordered_access_view_uint(
                        resource,
                        subresource,
                        values.map(|value| value as u32),
                    );
                }
                ClearValue::DepthStencil { depth, stencil } => {
                    self.sink
                        .clear_depth_stencil_view(resource, subresource, depth, stencil);
                }
            }
        }
    }
}

/// Returns the `D3D12CalcSubresource` index in plane `0`.
fn subresource_index(desc: &TextureDesc, mip_level: u32, array_slice: u32) -> u32 {
    mip_level + array_slice * desc.mip_levels
}
