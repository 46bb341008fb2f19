//! The Vulkan backend, recording through `ash`.

use super::Backend;
use crate::{
    Buffer, BufferBarrier, ClearValue, Format, Framebuffer, ResourceStates, Texture,
    TextureBarrier, TextureSlice, TextureSubresourceSet,
};
use ash::vk::{self, Handle};
use smallvec::SmallVec;

/// The Vulkan equivalent of a set of [`ResourceStates`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceStateMapping {
    pub stage_mask: vk::PipelineStageFlags2,
    pub access_mask: vk::AccessFlags2,

    /// The image layout. Always `UNDEFINED` for buffers, and for states that don't constrain the
    /// layout.
    pub image_layout: vk::ImageLayout,
}

macro_rules! state_mappings {
    (
        $(
            $state:ident {
                stage_mask: $($stage_flag:ident)|+,
                access_mask: $($access_flag:ident)|+,
                image_layout: $image_layout:ident,
            }
        )*
    ) => {
        const STATE_MAPPINGS: &[(ResourceStates, ResourceStateMapping)] = &[
            $(
                (
                    ResourceStates::$state,
                    ResourceStateMapping {
                        stage_mask: vk::PipelineStageFlags2::from_raw(
                            0 $(| vk::PipelineStageFlags2::$stage_flag.as_raw())+
                        ),
                        access_mask: vk::AccessFlags2::from_raw(
                            0 $(| vk::AccessFlags2::$access_flag.as_raw())+
                        ),
                        image_layout: vk::ImageLayout::$image_layout,
                    },
                ),
            )*
        ];
    };
}

state_mappings! {
    COMMON {
        stage_mask: TOP_OF_PIPE,
        access_mask: NONE,
        image_layout: UNDEFINED,
    }

    CONSTANT_BUFFER {
        stage_mask: ALL_COMMANDS,
        access_mask: UNIFORM_READ,
        image_layout: UNDEFINED,
    }

    VERTEX_BUFFER {
        stage_mask: VERTEX_INPUT,
        access_mask: VERTEX_ATTRIBUTE_READ,
        image_layout: UNDEFINED,
    }

    INDEX_BUFFER {
        stage_mask: VERTEX_INPUT,
        access_mask: INDEX_READ,
        image_layout: UNDEFINED,
    }

    INDIRECT_ARGUMENT {
        stage_mask: DRAW_INDIRECT,
        access_mask: INDIRECT_COMMAND_READ,
        image_layout: UNDEFINED,
    }

    SHADER_RESOURCE {
        stage_mask: ALL_COMMANDS,
        access_mask: SHADER_READ,
        image_layout: SHADER_READ_ONLY_OPTIMAL,
    }

    UNORDERED_ACCESS {
        stage_mask: ALL_COMMANDS,
        access_mask: SHADER_READ | SHADER_WRITE,
        image_layout: GENERAL,
    }

    RENDER_TARGET {
        stage_mask: COLOR_ATTACHMENT_OUTPUT,
        access_mask: COLOR_ATTACHMENT_READ | COLOR_ATTACHMENT_WRITE,
        image_layout: COLOR_ATTACHMENT_OPTIMAL,
    }

    DEPTH_WRITE {
        stage_mask: EARLY_FRAGMENT_TESTS | LATE_FRAGMENT_TESTS,
        access_mask: DEPTH_STENCIL_ATTACHMENT_READ | DEPTH_STENCIL_ATTACHMENT_WRITE,
        image_layout: DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    }

    DEPTH_READ {
        stage_mask: EARLY_FRAGMENT_TESTS | LATE_FRAGMENT_TESTS,
        access_mask: DEPTH_STENCIL_ATTACHMENT_READ,
        image_layout: DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    }

    STREAM_OUT {
        stage_mask: TRANSFORM_FEEDBACK_EXT,
        access_mask: TRANSFORM_FEEDBACK_WRITE_EXT,
        image_layout: UNDEFINED,
    }

    COPY_DEST {
        stage_mask: TRANSFER,
        access_mask: TRANSFER_WRITE,
        image_layout: TRANSFER_DST_OPTIMAL,
    }

    COPY_SOURCE {
        stage_mask: TRANSFER,
        access_mask: TRANSFER_READ,
        image_layout: TRANSFER_SRC_OPTIMAL,
    }

    RESOLVE_DEST {
        stage_mask: TRANSFER,
        access_mask: TRANSFER_WRITE,
        image_layout: TRANSFER_DST_OPTIMAL,
    }

    RESOLVE_SOURCE {
        stage_mask: TRANSFER,
        access_mask: TRANSFER_READ,
        image_layout: TRANSFER_SRC_OPTIMAL,
    }

    PRESENT {
        stage_mask: ALL_COMMANDS,
        access_mask: MEMORY_READ,
        image_layout: PRESENT_SRC_KHR,
    }

    ACCEL_STRUCT_READ {
        stage_mask: RAY_TRACING_SHADER_KHR | COMPUTE_SHADER,
        access_mask: ACCELERATION_STRUCTURE_READ_KHR,
        image_layout: UNDEFINED,
    }

    ACCEL_STRUCT_WRITE {
        stage_mask: ACCELERATION_STRUCTURE_BUILD_KHR,
        access_mask: ACCELERATION_STRUCTURE_WRITE_KHR,
        image_layout: UNDEFINED,
    }

    ACCEL_STRUCT_BUILD_INPUT {
        stage_mask: ACCELERATION_STRUCTURE_BUILD_KHR,
        access_mask: ACCELERATION_STRUCTURE_READ_KHR,
        image_layout: UNDEFINED,
    }

    ACCEL_STRUCT_BUILD_BLAS {
        stage_mask: ACCELERATION_STRUCTURE_BUILD_KHR,
        access_mask: ACCELERATION_STRUCTURE_READ_KHR,
        image_layout: UNDEFINED,
    }

    SHADING_RATE_SURFACE {
        stage_mask: FRAGMENT_SHADING_RATE_ATTACHMENT_KHR,
        access_mask: FRAGMENT_SHADING_RATE_ATTACHMENT_READ_KHR,
        image_layout: FRAGMENT_SHADING_RATE_ATTACHMENT_OPTIMAL_KHR,
    }

    OPACITY_MICROMAP_WRITE {
        stage_mask: MICROMAP_BUILD_EXT,
        access_mask: MICROMAP_WRITE_EXT,
        image_layout: UNDEFINED,
    }

    OPACITY_MICROMAP_BUILD_INPUT {
        stage_mask: MICROMAP_BUILD_EXT,
        access_mask: SHADER_READ,
        image_layout: UNDEFINED,
    }
}

/// Returns the Vulkan stages, accesses and layout of `states`.
///
/// The masks of the individual states are combined. At most one layout-constraining state may be
/// set for a texture. [`ResourceStates::UNKNOWN`] maps to empty masks and the `UNDEFINED` layout,
/// which discards the contents of an image.
pub fn convert_resource_state(states: ResourceStates, is_texture: bool) -> ResourceStateMapping {
    let mut result = ResourceStateMapping {
        stage_mask: vk::PipelineStageFlags2::empty(),
        access_mask: vk::AccessFlags2::empty(),
        image_layout: vk::ImageLayout::UNDEFINED,
    };

    for &(state, mapping) in STATE_MAPPINGS {
        if !states.intersects(state) {
            continue;
        }

        debug_assert!(
            result.image_layout == vk::ImageLayout::UNDEFINED
                || mapping.image_layout == vk::ImageLayout::UNDEFINED
                || result.image_layout == mapping.image_layout,
            "{states:?} combines states with conflicting image layouts",
        );

        result.stage_mask |= mapping.stage_mask;
        result.access_mask |= mapping.access_mask;

        if is_texture && mapping.image_layout != vk::ImageLayout::UNDEFINED {
            result.image_layout = mapping.image_layout;
        }
    }

    result
}

fn image_aspects(format: Format) -> vk::ImageAspectFlags {
    let mut aspect_mask = vk::ImageAspectFlags::empty();

    if format.has_depth() {
        aspect_mask |= vk::ImageAspectFlags::DEPTH;
    }

    if format.has_stencil() {
        aspect_mask |= vk::ImageAspectFlags::STENCIL;
    }

    if aspect_mask.is_empty() {
        aspect_mask = vk::ImageAspectFlags::COLOR;
    }

    aspect_mask
}

/// The largest amount of data that one `vkCmdUpdateBuffer` can write.
const MAX_UPDATE_BUFFER_SIZE: usize = 65536;

/// Records translated Vulkan commands into a command buffer.
///
/// Each method corresponds to the `vkCmd*` function of the same name.
pub trait VulkanCommandSink {
    /// Records one pipeline barrier holding all of the given barriers.
    fn pipeline_barrier(
        &mut self,
        image_memory_barriers: &[vk::ImageMemoryBarrier2<'_>],
        buffer_memory_barriers: &[vk::BufferMemoryBarrier2<'_>],
    );

    fn copy_buffer(&mut self, copy_buffer_info: &vk::CopyBufferInfo2<'_>);

    fn copy_image(&mut self, copy_image_info: &vk::CopyImageInfo2<'_>);

    /// `data` is at most 65536 bytes long.
    fn update_buffer(&mut self, dst_buffer: vk::Buffer, dst_offset: vk::DeviceSize, data: &[u8]);

    fn fill_buffer(
        &mut self,
        dst_buffer: vk::Buffer,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
        data: u32,
    );

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        image_layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    );

    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        image_layout: vk::ImageLayout,
        depth_stencil: &vk::ClearDepthStencilValue,
        ranges: &[vk::ImageSubresourceRange],
    );

    /// Begins rendering to `framebuffer`. Does nothing by default, for sinks whose render passes
    /// are managed by the application.
    fn begin_render_pass(&mut self, framebuffer: &Framebuffer) {
        let _ = framebuffer;
    }

    fn end_render_pass(&mut self) {}
}

/// A [`Backend`] that records Vulkan commands into a [`VulkanCommandSink`].
///
/// Transfers use the `TRANSFER_SRC_OPTIMAL` and `TRANSFER_DST_OPTIMAL` layouts, so textures are
/// cleared in the [`COPY_DEST`] state.
///
/// [`COPY_DEST`]: ResourceStates::COPY_DEST
#[derive(Debug)]
pub struct VulkanBackend<S> {
    sink: S,
}

impl<S: VulkanCommandSink> VulkanBackend<S> {
    #[inline]
    pub fn new(sink: S) -> Self {
        VulkanBackend { sink }
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

impl<S: VulkanCommandSink> Backend for VulkanBackend<S> {
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
        let image_memory_barriers_vk: SmallVec<[_; 8]> = texture_barriers
            .iter()
            .map(|barrier| {
                let before = convert_resource_state(barrier.state_before, true);
                let after = convert_resource_state(barrier.state_after, true);

                // The tracker only accepts texture states that constrain the layout.
                debug_assert_ne!(after.image_layout, vk::ImageLayout::UNDEFINED);

                let desc = barrier.texture.desc();
                let subresource_range = if barrier.entire_texture {
                    vk::ImageSubresourceRange::default()
                        .base_mip_level(0)
                        .level_count(desc.mip_levels)
                        .base_array_layer(0)
                        .layer_count(desc.array_size)
                } else {
                    vk::ImageSubresourceRange::default()
                        .base_mip_level(barrier.subresources.base_mip_level)
                        .level_count(barrier.subresources.num_mip_levels)
                        .base_array_layer(barrier.subresources.base_array_slice)
                        .layer_count(barrier.subresources.num_array_slices)
                };

                vk::ImageMemoryBarrier2::default()
                    .src_stage_mask(before.stage_mask)
                    .src_access_mask(before.access_mask)
                    .dst_stage_mask(after.stage_mask)
                    .dst_access_mask(after.access_mask)
                    .old_layout(before.image_layout)
                    .new_layout(after.image_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(vk::Image::from_raw(barrier.texture.handle()))
                    .subresource_range(subresource_range.aspect_mask(image_aspects(desc.format)))
            })
            .collect();

        let buffer_memory_barriers_vk: SmallVec<[_; 8]> = buffer_barriers
            .iter()
            .map(|barrier| {
                let before = convert_resource_state(barrier.state_before, false);
                let after = convert_resource_state(barrier.state_after, false);

                vk::BufferMemoryBarrier2::default()
                    .src_stage_mask(before.stage_mask)
                    .src_access_mask(before.access_mask)
                    .dst_stage_mask(after.stage_mask)
                    .dst_access_mask(after.access_mask)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(vk::Buffer::from_raw(barrier.buffer.handle()))
                    .offset(0)
                    .size(barrier.buffer.desc().byte_size)
            })
            .collect();

        if image_memory_barriers_vk.is_empty() && buffer_memory_barriers_vk.is_empty() {
            return;
        }

        self.sink
            .pipeline_barrier(&image_memory_barriers_vk, &buffer_memory_barriers_vk);
    }

    #[inline]
    fn buffer_clear_state(&self) -> ResourceStates {
        ResourceStates::COPY_DEST
    }

    #[inline]
    fn texture_clear_state(&self, _texture: &Texture) -> ResourceStates {
        ResourceStates::COPY_DEST
    }

    fn copy_buffer(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) {
        let regions_vk = [vk::BufferCopy2::default()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size)];
        let copy_buffer_info_vk = vk::CopyBufferInfo2::default()
            .src_buffer(vk::Buffer::from_raw(src.handle()))
            .dst_buffer(vk::Buffer::from_raw(dst.handle()))
            .regions(&regions_vk);

        self.sink.copy_buffer(&copy_buffer_info_vk);
    }

    fn copy_texture(
        &mut self,
        dst: &Texture,
        dst_slice: &TextureSlice,
        src: &Texture,
        src_slice: &TextureSlice,
    ) {
        let regions_vk = [vk::ImageCopy2::default()
            .src_subresource(subresource_layers(src, src_slice))
            .src_offset(slice_offset(src_slice))
            .dst_subresource(subresource_layers(dst, dst_slice))
            .dst_offset(slice_offset(dst_slice))
            .extent(vk::Extent3D {
                width: src_slice.width,
                height: src_slice.height,
                depth: src_slice.depth,
            })];
        let copy_image_info_vk = vk::CopyImageInfo2::default()
            .src_image(vk::Image::from_raw(src.handle()))
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(vk::Image::from_raw(dst.handle()))
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .regions(&regions_vk);

        self.sink.copy_image(&copy_image_info_vk);
    }

    fn write_buffer(&mut self, buffer: &Buffer, data: &[u8], offset: u64) {
        let buffer_vk = vk::Buffer::from_raw(buffer.handle());

        for (index, chunk) in data.chunks(MAX_UPDATE_BUFFER_SIZE).enumerate() {
            let chunk_offset = offset + (index * MAX_UPDATE_BUFFER_SIZE) as vk::DeviceSize;
            self.sink.update_buffer(buffer_vk, chunk_offset, chunk);
        }
    }

    fn clear_buffer_uint(&mut self, buffer: &Buffer, value: u32) {
        self.sink.fill_buffer(
            vk::Buffer::from_raw(buffer.handle()),
            0,
            vk::WHOLE_SIZE,
            value,
        );
    }

    fn clear_texture(
        &mut self,
        texture: &Texture,
        subresources: &TextureSubresourceSet,
        value: ClearValue,
    ) {
        let image = vk::Image::from_raw(texture.handle());
        let ranges_vk = [vk::ImageSubresourceRange::default()
            .aspect_mask(image_aspects(texture.desc().format))
            .base_mip_level(subresources.base_mip_level)
            .level_count(subresources.num_mip_levels)
            .base_array_layer(subresources.base_array_slice)
            .layer_count(subresources.num_array_slices)];

        let color_vk = match value {
            ClearValue::Float(float32) => vk::ClearColorValue { float32 },
            ClearValue::Int(int32) => vk::ClearColorValue { int32 },
            ClearValue::Uint(uint32) => vk::ClearColorValue { uint32 },
            ClearValue::DepthStencil { depth, stencil } => {
                let depth_stencil_vk = vk::ClearDepthStencilValue {
                    depth,
                    stencil: stencil.into(),
                };
                self.sink.clear_depth_stencil_image(
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &depth_stencil_vk,
                    &ranges_vk,
                );

                return;
            }
        };

        self.sink.clear_color_image(
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &color_vk,
            &ranges_vk,
        );
    }
}

fn subresource_layers(texture: &Texture, slice: &TextureSlice) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(image_aspects(texture.desc().format))
        .mip_level(slice.mip_level)
        .base_array_layer(slice.array_slice)
        .layer_count(1)
}

fn slice_offset(slice: &TextureSlice) -> vk::Offset3D {
    vk::Offset3D {
        x: slice.x as i32,
        y: slice.y as i32,
        z: slice.z as i32,
    }
}

/// A [`VulkanCommandSink`] that records into a raw `ash` command buffer.
///
/// Render passes are left to the application.
#[derive(Clone, Copy)]
pub struct AshCommandBuffer<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
}

impl<'a> AshCommandBuffer<'a> {
    /// # Safety
    ///
    /// - `command_buffer` must have been allocated from `device`.
    /// - `command_buffer` must be in the recording state for as long as the returned sink is
    ///   used.
    /// - `device` must support Vulkan 1.3, and the [`synchronization2`] feature must be enabled
    ///   on it.
    ///
    /// [`synchronization2`]: vk::PhysicalDeviceVulkan13Features::synchronization2
    #[inline]
    pub unsafe fn new(device: &'a ash::Device, command_buffer: vk::CommandBuffer) -> Self {
        AshCommandBuffer {
            device,
            command_buffer,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl VulkanCommandSink for AshCommandBuffer<'_> {
    fn pipeline_barrier(
        &mut self,
        image_memory_barriers: &[vk::ImageMemoryBarrier2<'_>],
        buffer_memory_barriers: &[vk::BufferMemoryBarrier2<'_>],
    ) {
        let dependency_info_vk = vk::DependencyInfo::default()
            .image_memory_barriers(image_memory_barriers)
            .buffer_memory_barriers(buffer_memory_barriers);

        // SAFETY: `AshCommandBuffer::new` requires the command buffer to be recording on a device
        // with `synchronization2` enabled.
        unsafe {
            self.device
                .cmd_pipeline_barrier2(self.command_buffer, &dependency_info_vk)
        };
    }

    fn copy_buffer(&mut self, copy_buffer_info: &vk::CopyBufferInfo2<'_>) {
        // SAFETY: `AshCommandBuffer::new` requires the command buffer to be recording on a Vulkan
        // 1.3 device.
        unsafe {
            self.device
                .cmd_copy_buffer2(self.command_buffer, copy_buffer_info)
        };
    }

    fn copy_image(&mut self, copy_image_info: &vk::CopyImageInfo2<'_>) {
        // SAFETY: Same as above.
        unsafe {
            self.device
                .cmd_copy_image2(self.command_buffer, copy_image_info)
        };
    }

    fn update_buffer(&mut self, dst_buffer: vk::Buffer, dst_offset: vk::DeviceSize, data: &[u8]) {
        // SAFETY: `AshCommandBuffer::new` requires the command buffer to be recording.
        unsafe {
            self.device
                .cmd_update_buffer(self.command_buffer, dst_buffer, dst_offset, data)
        };
    }

    fn fill_buffer(
        &mut self,
        dst_buffer: vk::Buffer,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
        data: u32,
    ) {
        // SAFETY: `AshCommandBuffer::new` requires the command buffer to be recording.
        unsafe {
            self.device
                .cmd_fill_buffer(self.command_buffer, dst_buffer, dst_offset, size, data)
        };
    }

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        image_layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        // SAFETY: `AshCommandBuffer::new` requires the command buffer to be recording.
        unsafe {
            self.device.cmd_clear_color_image(
                self.command_buffer,
                image,
                image_layout,
                color,
                ranges,
            )
        };
    }

    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        image_layout: vk::ImageLayout,
        depth_stencil: &vk::ClearDepthStencilValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        // SAFETY: `AshCommandBuffer::new` requires the command buffer to be recording.
        unsafe {
            self.device.cmd_clear_depth_stencil_image(
                self.command_buffer,
                image,
                image_layout,
                depth_stencil,
                ranges,
            )
        };
    }
}

impl std::fmt::Debug for AshCommandBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AshCommandBuffer")
            .field("device", &self.device.handle())
            .field("command_buffer", &self.command_buffer)
            .finish()
    }
}
