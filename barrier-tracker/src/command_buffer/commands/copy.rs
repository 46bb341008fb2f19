use crate::{
    backend::Backend, command_buffer::CommandList, Buffer, Format, ResourceStates, Texture,
    TextureSlice, TextureSubresourceSet, ValidationError,
};
use std::sync::Arc;

/// The value that [`CommandList::clear_texture`] fills a texture with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Float([f32; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
    DepthStencil { depth: f32, stencil: u8 },
}

impl Default for ClearValue {
    #[inline]
    fn default() -> Self {
        ClearValue::Float([0.0; 4])
    }
}

impl ClearValue {
    fn validate(&self, format: Format) -> Result<(), Box<ValidationError>> {
        match self {
            ClearValue::DepthStencil { .. } if !format.has_depth() => Err(ValidationError::new(
                "",
                "is a depth/stencil value, but the format of the texture has no depth component",
            )),
            ClearValue::Float(_) | ClearValue::Int(_) | ClearValue::Uint(_)
                if format.has_depth() =>
            {
                Err(ValidationError::new(
                    "",
                    "is a color value, but the format of the texture is a depth/stencil format",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// # Commands to copy, fill and clear resources
///
/// Each of these ends the current render pass and records every pending transition before the
/// native command. If automatic barriers are enabled, the resources are transitioned to the
/// states that the command needs first. Otherwise they must already be in those states.
impl<B: Backend> CommandList<B> {
    /// Copies `size` bytes from `src` at `src_offset` to `dst` at `dst_offset`.
    ///
    /// `dst` is used in the [`COPY_DEST`] state and `src` in the [`COPY_SOURCE`] state.
    ///
    /// [`COPY_DEST`]: ResourceStates::COPY_DEST
    /// [`COPY_SOURCE`]: ResourceStates::COPY_SOURCE
    pub fn copy_buffer(
        &mut self,
        dst: &Arc<Buffer>,
        dst_offset: u64,
        src: &Arc<Buffer>,
        src_offset: u64,
        size: u64,
    ) -> &mut Self {
        if !self.ensure_open("copy_buffer") {
            return self;
        }

        if let Err(err) = validate_copy_buffer(dst, dst_offset, src, src_offset, size) {
            self.report(err.add_context("copy_buffer"));
            return self;
        }

        if self.enable_automatic_barriers {
            let dst_required = self.require_buffer_state(dst, ResourceStates::COPY_DEST);
            let src_required = self.require_buffer_state(src, ResourceStates::COPY_SOURCE);

            if !(dst_required && src_required) {
                return self;
            }
        }

        self.flush_before_transfer();
        self.backend
            .copy_buffer(dst, dst_offset, src, src_offset, size);

        self
    }

    /// Copies the box `src_slice` of `src` to `dst`, at the offset, mip level and array slice of
    /// `dst_slice`. The extent of `dst_slice` is ignored: the extent of `src_slice` is copied.
    ///
    /// Only the two subresources involved are transitioned: the one of `dst` to [`COPY_DEST`] and
    /// the one of `src` to [`COPY_SOURCE`].
    ///
    /// [`COPY_DEST`]: ResourceStates::COPY_DEST
    /// [`COPY_SOURCE`]: ResourceStates::COPY_SOURCE
    pub fn copy_texture(
        &mut self,
        dst: &Arc<Texture>,
        dst_slice: TextureSlice,
        src: &Arc<Texture>,
        src_slice: TextureSlice,
    ) -> &mut Self {
        if !self.ensure_open("copy_texture") {
            return self;
        }

        let (dst_slice, src_slice) = match validate_copy_texture(dst, dst_slice, src, src_slice) {
            Ok(slices) => slices,
            Err(err) => {
                self.report(err.add_context("copy_texture"));
                return self;
            }
        };

        if self.enable_automatic_barriers {
            let dst_required = self.require_texture_state(
                dst,
                dst_slice.subresources(),
                ResourceStates::COPY_DEST,
            );
            let src_required = self.require_texture_state(
                src,
                src_slice.subresources(),
                ResourceStates::COPY_SOURCE,
            );

            if !(dst_required && src_required) {
                return self;
            }
        }

        self.flush_before_transfer();
        self.backend.copy_texture(dst, &dst_slice, src, &src_slice);

        self
    }

    /// Writes `data` to `buffer` at `offset`, in the [`COPY_DEST`] state.
    ///
    /// `offset` and the length of `data` must be multiples of 4.
    ///
    /// [`COPY_DEST`]: ResourceStates::COPY_DEST
    pub fn write_buffer(&mut self, buffer: &Arc<Buffer>, data: &[u8], offset: u64) -> &mut Self {
        if !self.ensure_open("write_buffer") {
            return self;
        }

        if let Err(err) = validate_write_buffer(buffer, data, offset) {
            self.report(err.add_context("write_buffer"));
            return self;
        }

        if self.enable_automatic_barriers
            && !self.require_buffer_state(buffer, ResourceStates::COPY_DEST)
        {
            return self;
        }

        self.flush_before_transfer();
        self.backend.write_buffer(buffer, data, offset);

        self
    }

    /// Fills the whole of `buffer` with repeated copies of `value`.
    ///
    /// The state that the buffer is used in depends on the backend, see
    /// [`Backend::buffer_clear_state`].
    pub fn clear_buffer_uint(&mut self, buffer: &Arc<Buffer>, value: u32) -> &mut Self {
        if !self.ensure_open("clear_buffer_uint") {
            return self;
        }

        let state = self.backend.buffer_clear_state();

        if self.enable_automatic_barriers && !self.require_buffer_state(buffer, state) {
            return self;
        }

        self.flush_before_transfer();
        self.backend.clear_buffer_uint(buffer, value);

        self
    }

    /// Clears `subresources` of `texture` to `value`.
    ///
    /// `value` must be a [`ClearValue::DepthStencil`] if the format of the texture has a depth
    /// component, and a color value otherwise. The state that the texture is used in depends on
    /// the backend and the format, see [`Backend::texture_clear_state`].
    pub fn clear_texture(
        &mut self,
        texture: &Arc<Texture>,
        subresources: TextureSubresourceSet,
        value: ClearValue,
    ) -> &mut Self {
        if !self.ensure_open("clear_texture") {
            return self;
        }

        let subresources = match validate_clear_texture(texture, subresources, &value) {
            Ok(subresources) => subresources,
            Err(err) => {
                self.report(err.add_context("clear_texture"));
                return self;
            }
        };

        let state = self.backend.texture_clear_state(texture);

        if self.enable_automatic_barriers
            && !self.require_texture_state(texture, subresources, state)
        {
            return self;
        }

        self.flush_before_transfer();
        self.backend.clear_texture(texture, &subresources, value);

        self
    }

    fn flush_before_transfer(&mut self) {
        self.end_render_pass();
        self.commit_barriers_internal();
    }
}

fn validate_copy_buffer(
    dst: &Arc<Buffer>,
    dst_offset: u64,
    src: &Arc<Buffer>,
    src_offset: u64,
    size: u64,
) -> Result<(), Box<ValidationError>> {
    if size == 0 {
        return Err(ValidationError::new("size", "is zero"));
    }

    if Arc::ptr_eq(dst, src) {
        return Err(ValidationError::new(
            "dst",
            "is the same buffer as `src`, which can't be in two states at once",
        ));
    }

    validate_buffer_range(dst, dst_offset, size, "dst_offset")?;
    validate_buffer_range(src, src_offset, size, "src_offset")?;

    Ok(())
}

fn validate_copy_texture(
    dst: &Arc<Texture>,
    dst_slice: TextureSlice,
    src: &Arc<Texture>,
    src_slice: TextureSlice,
) -> Result<(TextureSlice, TextureSlice), Box<ValidationError>> {
    let src_slice = src_slice
        .resolve(src.desc())
        .map_err(|err| err.add_context("src_slice"))?;
    let dst_slice = TextureSlice {
        width: src_slice.width,
        height: src_slice.height,
        depth: src_slice.depth,
        ..dst_slice
    }
    .resolve(dst.desc())
    .map_err(|err| err.add_context("dst_slice"))?;

    if Arc::ptr_eq(dst, src)
        && dst_slice.mip_level == src_slice.mip_level
        && dst_slice.array_slice == src_slice.array_slice
    {
        return Err(ValidationError::new(
            "dst_slice",
            "is in the same subresource as `src_slice`, which can't be in two states at once",
        ));
    }

    Ok((dst_slice, src_slice))
}

fn validate_write_buffer(
    buffer: &Buffer,
    data: &[u8],
    offset: u64,
) -> Result<(), Box<ValidationError>> {
    if data.is_empty() {
        return Err(ValidationError::new("data", "is empty"));
    }

    if data.len() % 4 != 0 {
        return Err(ValidationError::new("data", "has a length that is not a multiple of 4"));
    }

    if offset % 4 != 0 {
        return Err(ValidationError::new("offset", "is not a multiple of 4"));
    }

    validate_buffer_range(buffer, offset, data.len() as u64, "offset")
}

fn validate_clear_texture(
    texture: &Texture,
    subresources: TextureSubresourceSet,
    value: &ClearValue,
) -> Result<TextureSubresourceSet, Box<ValidationError>> {
    value
        .validate(texture.desc().format)
        .map_err(|err| err.add_context("value"))?;

    subresources
        .resolve(texture.desc(), false)
        .map_err(|err| err.add_context("subresources"))
}

fn validate_buffer_range(
    buffer: &Buffer,
    offset: u64,
    size: u64,
    context: &'static str,
) -> Result<(), Box<ValidationError>> {
    match offset.checked_add(size) {
        Some(end) if end <= buffer.desc().byte_size => Ok(()),
        _ => Err(ValidationError::new(
            context,
            format!(
                "plus the size of the region is greater than the size of buffer `{}`",
                buffer.desc().debug_name,
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command_buffer::tests::{buffer, command_list, texture, Event},
        Framebuffer, MessageSeverity, TextureDesc,
    };

    #[test]
    fn copy_buffer_transitions_both_buffers() {
        let (mut command_list, messages) = command_list(true);
        let dst = buffer(1);
        let src = buffer(2);

        command_list
            .open()
            .begin_tracking_buffer_state(&dst, ResourceStates::SHADER_RESOURCE)
            .begin_tracking_buffer_state(&src, ResourceStates::COPY_SOURCE)
            .copy_buffer(&dst, 16, &src, 0, 256);

        assert!(messages.take().is_empty());
        assert!(!command_list.has_barriers());
        assert_eq!(
            command_list.backend_mut().take_events(),
            [
                Event::Barriers {
                    textures: vec![],
                    buffers: vec![(
                        1,
                        ResourceStates::SHADER_RESOURCE,
                        ResourceStates::COPY_DEST,
                    )],
                },
                Event::Transfer("copy_buffer", vec![1, 2]),
            ],
        );
        assert_eq!(command_list.buffer_state(&dst), ResourceStates::COPY_DEST);

        // Already in the right states.
        command_list.copy_buffer(&dst, 0, &src, 512, 512);
        assert_eq!(
            command_list.backend_mut().take_events(),
            [Event::Transfer("copy_buffer", vec![1, 2])],
        );
    }

    #[test]
    fn transfers_without_automatic_barriers() {
        let (mut command_list, messages) = command_list(false);
        let buffer = buffer(3);
        let texture = texture(4, 2);

        command_list
            .open()
            .set_enable_automatic_barriers(false)
            .write_buffer(&buffer, &[0; 16], 0)
            .clear_buffer_uint(&buffer, 7)
            .clear_texture(&texture, TextureSubresourceSet::ALL, ClearValue::default());

        // Explicit transitions are still recorded before the command.
        command_list
            .set_texture_state(
                &texture,
                TextureSubresourceSet::single(0, 0),
                ResourceStates::COPY_SOURCE,
            )
            .set_texture_state(
                &texture,
                TextureSubresourceSet::single(1, 0),
                ResourceStates::COPY_DEST,
            )
            .copy_texture(
                &texture,
                TextureSlice::subresource(1, 0),
                &texture,
                TextureSlice {
                    width: 64,
                    height: 64,
                    ..TextureSlice::subresource(0, 0)
                },
            );

        assert!(messages.take().is_empty());
        assert_eq!(
            command_list.backend_mut().take_events(),
            [
                Event::Transfer("write_buffer", vec![3]),
                Event::Transfer("clear_buffer_uint", vec![3]),
                Event::Transfer("clear_texture", vec![4]),
                Event::Barriers {
                    textures: vec![
                        (
                            4,
                            TextureSubresourceSet::single(0, 0),
                            ResourceStates::UNKNOWN,
                            ResourceStates::COPY_SOURCE,
                        ),
                        (
                            4,
                            TextureSubresourceSet::single(1, 0),
                            ResourceStates::UNKNOWN,
                            ResourceStates::COPY_DEST,
                        ),
                    ],
                    buffers: vec![],
                },
                Event::Transfer("copy_texture", vec![4, 4]),
            ],
        );
        assert_eq!(command_list.buffer_state(&buffer), ResourceStates::UNKNOWN);
    }

    #[test]
    fn clear_texture_uses_the_backend_clear_state() {
        let (mut command_list, messages) = command_list(true);
        let color = texture(5, 3);
        let depth = Texture::from_handle(
            6,
            TextureDesc {
                format: Format::D32,
                width: 64,
                height: 64,
                initial_state: ResourceStates::DEPTH_READ,
                keep_initial_state: true,
                ..Default::default()
            },
        )
        .unwrap();

        command_list
            .open()
            .begin_tracking_texture_state(
                &color,
                TextureSubresourceSet::ALL,
                ResourceStates::SHADER_RESOURCE,
            )
            .clear_texture(
                &color,
                TextureSubresourceSet::mip_levels(1..3),
                ClearValue::Uint([1; 4]),
            )
            .clear_texture(
                &depth,
                TextureSubresourceSet::ALL,
                ClearValue::DepthStencil {
                    depth: 1.0,
                    stencil: 0,
                },
            );

        assert!(messages.take().is_empty());
        assert_eq!(
            command_list.backend_mut().take_events(),
            [
                Event::Barriers {
                    textures: vec![(
                        5,
                        TextureSubresourceSet::new(1, 2, 0, 1),
                        ResourceStates::SHADER_RESOURCE,
                        ResourceStates::COPY_DEST,
                    )],
                    buffers: vec![],
                },
                Event::Transfer("clear_texture", vec![5]),
                Event::Barriers {
                    textures: vec![(
                        6,
                        TextureSubresourceSet::new(0, 1, 0, 1),
                        ResourceStates::DEPTH_READ,
                        ResourceStates::DEPTH_WRITE,
                    )],
                    buffers: vec![],
                },
                Event::Transfer("clear_texture", vec![6]),
            ],
        );
        assert_eq!(
            command_list.texture_subresource_state(&color, 0, 0),
            ResourceStates::SHADER_RESOURCE,
        );
    }

    #[test]
    fn transfers_end_the_render_pass() {
        let (mut command_list, messages) = command_list(true);
        let buffer = buffer(7);
        let framebuffer = Framebuffer::new([], None).unwrap();

        command_list
            .open()
            .begin_tracking_buffer_state(&buffer, ResourceStates::COPY_DEST);
        command_list.begin_render_pass(&framebuffer);
        command_list.write_buffer(&buffer, &[1, 2, 3, 4], 4);

        assert!(messages.take().is_empty());
        assert_eq!(
            command_list.backend_mut().take_events(),
            [
                Event::BeginRenderPass,
                Event::EndRenderPass,
                Event::Transfer("write_buffer", vec![7]),
            ],
        );
    }

    #[test]
    fn invalid_transfers_are_skipped() {
        let (mut command_list, messages) = command_list(true);
        let small = buffer(8);
        let other = buffer(9);
        let color = texture(10, 2);
        let unseeded = buffer(11);

        command_list
            .open()
            .begin_tracking_buffer_state(&small, ResourceStates::COMMON)
            .begin_tracking_buffer_state(&other, ResourceStates::COMMON)
            .begin_tracking_texture_state(
                &color,
                TextureSubresourceSet::ALL,
                ResourceStates::SHADER_RESOURCE,
            )
            .copy_buffer(&small, 1000, &other, 0, 32)
            .copy_buffer(&small, 0, &small, 512, 32)
            .write_buffer(&small, &[0; 6], 0)
            .write_buffer(&small, &[0; 4], 2)
            .copy_texture(
                &color,
                TextureSlice {
                    x: 16,
                    ..TextureSlice::subresource(1, 0)
                },
                &color,
                TextureSlice::subresource(0, 0),
            )
            .copy_texture(
                &color,
                TextureSlice::subresource(1, 0),
                &color,
                TextureSlice::subresource(1, 0),
            )
            .clear_texture(
                &color,
                TextureSubresourceSet::ALL,
                ClearValue::DepthStencil {
                    depth: 0.0,
                    stencil: 0,
                },
            )
            .clear_buffer_uint(&unseeded, 0);

        let reported: Vec<_> = messages
            .take()
            .into_iter()
            .map(|(severity, text)| {
                assert_eq!(severity, MessageSeverity::Error);
                text.split(':').next().unwrap_or_default().to_owned()
            })
            .collect();
        assert_eq!(
            reported,
            [
                "copy_buffer.dst_offset",
                "copy_buffer.dst",
                "write_buffer.data",
                "write_buffer.offset",
                "copy_texture.dst_slice.width",
                "copy_texture.dst_slice",
                "clear_texture.value",
                "buffer",
            ],
        );
        assert!(!command_list.has_barriers());
        assert!(command_list.backend_mut().take_events().is_empty());
    }
}
