//! Resources whose states are tracked, and the descriptors they are created from.
//!
//! Resource creation and memory allocation happen outside of this crate. A [`Texture`] or
//! [`Buffer`] wraps a native handle that was created elsewhere together with its descriptor, and
//! owns the persistent state record that the [`StateTracker`] reads and updates.
//!
//! [`StateTracker`]: crate::StateTracker

pub use self::state::{BufferState, TextureState};
use crate::{ResourceStates, ValidationError};
use parking_lot::{Mutex, MutexGuard};
use std::{ops::Range, sync::Arc};

pub mod state;

/// The dimensionality of a texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    Texture1D,
    Texture1DArray,
    #[default]
    Texture2D,
    Texture2DArray,
    TextureCube,
    TextureCubeArray,
    Texture2DMS,
    Texture2DMSArray,
    Texture3D,
}

impl TextureDimension {
    /// Returns whether textures of this dimension have addressable array slices.
    #[inline]
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            Self::Texture1DArray
                | Self::Texture2DArray
                | Self::TextureCube
                | Self::TextureCubeArray
                | Self::Texture2DMSArray,
        )
    }
}

/// The subset of texel formats that matters for barriers: which aspects an image has.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Format {
    #[default]
    Unknown,
    R8Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Uint,
    R32Float,
    D16,
    D24S8,
    D32,
    D32S8,
}

impl Format {
    /// Returns whether the format has a depth component.
    #[inline]
    pub const fn has_depth(self) -> bool {
        matches!(self, Self::D16 | Self::D24S8 | Self::D32 | Self::D32S8)
    }

    /// Returns whether the format has a stencil component.
    #[inline]
    pub const fn has_stencil(self) -> bool {
        matches!(self, Self::D24S8 | Self::D32S8)
    }
}

/// Describes a texture.
#[derive(Clone, Debug)]
pub struct TextureDesc {
    /// The dimensionality of the texture.
    ///
    /// The default value is [`TextureDimension::Texture2D`].
    pub dimension: TextureDimension,

    /// The format of the texels.
    ///
    /// The default value is [`Format::Unknown`].
    pub format: Format,

    /// The default value is `1`.
    pub width: u32,

    /// The default value is `1`.
    pub height: u32,

    /// The depth of a 3D texture. Must be `1` for all other dimensions.
    ///
    /// The default value is `1`.
    pub depth: u32,

    /// The number of array slices. Must be `1` unless the dimension [is an array].
    ///
    /// The default value is `1`.
    ///
    /// [is an array]: TextureDimension::is_array
    pub array_size: u32,

    /// The number of mip levels.
    ///
    /// The default value is `1`.
    pub mip_levels: u32,

    /// The state that the texture is in when it is created.
    ///
    /// The default value is [`ResourceStates::UNKNOWN`].
    pub initial_state: ResourceStates,

    /// If set, the state record starts out at `initial_state` instead of unknown, and every
    /// command list that touches the texture transitions it back to `initial_state` when it is
    /// closed.
    ///
    /// The default value is `false`.
    pub keep_initial_state: bool,

    /// A name used in diagnostics.
    ///
    /// The default value is empty.
    pub debug_name: String,

    pub _ne: crate::NonExhaustive,
}

impl Default for TextureDesc {
    #[inline]
    fn default() -> Self {
        TextureDesc {
            dimension: TextureDimension::Texture2D,
            format: Format::Unknown,
            width: 1,
            height: 1,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            initial_state: ResourceStates::UNKNOWN,
            keep_initial_state: false,
            debug_name: String::new(),
            _ne: crate::NE,
        }
    }
}

impl TextureDesc {
    /// Returns the number of subresources, one per mip level and array slice.
    #[inline]
    pub fn subresource_count(&self) -> usize {
        self.mip_levels as usize * self.array_size as usize
    }

    /// Returns the index of the given subresource in the flat state array.
    #[inline]
    pub fn subresource_index(&self, mip_level: u32, array_slice: u32) -> usize {
        debug_assert!(mip_level < self.mip_levels && array_slice < self.array_size);

        mip_level as usize * self.array_size as usize + array_slice as usize
    }

    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &TextureDesc {
            dimension,
            format: _,
            width,
            height,
            depth,
            array_size,
            mip_levels,
            initial_state,
            keep_initial_state,
            debug_name: _,
            _ne: _,
        } = self;

        if width == 0 || height == 0 || depth == 0 {
            return Err(ValidationError::new(
                "width",
                "`width`, `height` or `depth` is zero",
            ));
        }

        if array_size == 0 {
            return Err(ValidationError::new("array_size", "is zero"));
        }

        if !dimension.is_array() && array_size != 1 {
            return Err(ValidationError::new(
                "array_size",
                "is not `1`, but `dimension` is not an array dimension",
            ));
        }

        if matches!(
            dimension,
            TextureDimension::TextureCube | TextureDimension::TextureCubeArray
        ) && array_size % 6 != 0
        {
            return Err(ValidationError::new(
                "array_size",
                "is not a multiple of 6, but `dimension` is a cube dimension",
            ));
        }

        if dimension != TextureDimension::Texture3D && depth != 1 {
            return Err(ValidationError::new(
                "depth",
                "is not `1`, but `dimension` is not `TextureDimension::Texture3D`",
            ));
        }

        if mip_levels == 0 {
            return Err(ValidationError::new("mip_levels", "is zero"));
        }

        let max_extent = width.max(height).max(depth);
        let max_mip_levels = u32::BITS - max_extent.leading_zeros();

        if mip_levels > max_mip_levels {
            return Err(ValidationError::new(
                "mip_levels",
                "is greater than the number of mip levels that the extent allows",
            ));
        }

        if keep_initial_state && initial_state.is_unknown() {
            return Err(ValidationError::new(
                "initial_state",
                "is `ResourceStates::UNKNOWN`, but `keep_initial_state` is set",
            ));
        }

        if keep_initial_state && !initial_state.constrains_texture_layout() {
            return Err(ValidationError::new(
                "initial_state",
                "does not include a state in `ResourceStates::TEXTURE_LAYOUT_STATES`, but \
                `keep_initial_state` is set",
            ));
        }

        Ok(())
    }
}

/// A set of texture subresources, as a range of mip levels and a range of array slices.
///
/// The [`ALL_MIP_LEVELS`] and [`ALL_ARRAY_SLICES`] wildcards stand for "from the base to the end".
/// Before a set is stored or compared, it is [resolved] against the texture's descriptor, which
/// expands the wildcards.
///
/// [`ALL_MIP_LEVELS`]: Self::ALL_MIP_LEVELS
/// [`ALL_ARRAY_SLICES`]: Self::ALL_ARRAY_SLICES
/// [resolved]: Self::resolve
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSubresourceSet {
    pub base_mip_level: u32,
    pub num_mip_levels: u32,
    pub base_array_slice: u32,
    pub num_array_slices: u32,
}

impl TextureSubresourceSet {
    pub const ALL_MIP_LEVELS: u32 = u32::MAX;

    pub const ALL_ARRAY_SLICES: u32 = u32::MAX;

    /// Every subresource of the texture.
    pub const ALL: Self = TextureSubresourceSet {
        base_mip_level: 0,
        num_mip_levels: Self::ALL_MIP_LEVELS,
        base_array_slice: 0,
        num_array_slices: Self::ALL_ARRAY_SLICES,
    };

    #[inline]
    pub const fn new(
        base_mip_level: u32,
        num_mip_levels: u32,
        base_array_slice: u32,
        num_array_slices: u32,
    ) -> Self {
        TextureSubresourceSet {
            base_mip_level,
            num_mip_levels,
            base_array_slice,
            num_array_slices,
        }
    }

    /// Returns the set of the given mip levels in every array slice.
    #[inline]
    pub const fn mip_levels(mip_levels: Range<u32>) -> Self {
        TextureSubresourceSet {
            base_mip_level: mip_levels.start,
            num_mip_levels: mip_levels.end.saturating_sub(mip_levels.start),
            base_array_slice: 0,
            num_array_slices: Self::ALL_ARRAY_SLICES,
        }
    }

    /// Returns the set of a single subresource.
    #[inline]
    pub const fn single(mip_level: u32, array_slice: u32) -> Self {
        TextureSubresourceSet::new(mip_level, 1, array_slice, 1)
    }

    /// Returns the range of mip levels. Only meaningful on a resolved set.
    #[inline]
    pub fn mip_level_range(&self) -> Range<u32> {
        self.base_mip_level..self.base_mip_level + self.num_mip_levels
    }

    /// Returns the range of array slices. Only meaningful on a resolved set.
    #[inline]
    pub fn array_slice_range(&self) -> Range<u32> {
        self.base_array_slice..self.base_array_slice + self.num_array_slices
    }

    /// Returns the number of subresources in the set. Only meaningful on a resolved set.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_mip_levels as usize * self.num_array_slices as usize
    }

    /// Expands the wildcards against `desc` and checks that the set lies within the texture.
    ///
    /// If `single_mip_level` is set, only the base mip level is kept, which is what attachments
    /// and views of a single level need. Array slices of textures whose dimension isn't an array
    /// dimension always resolve to slice `0`.
    pub fn resolve(
        &self,
        desc: &TextureDesc,
        single_mip_level: bool,
    ) -> Result<Self, Box<ValidationError>> {
        let &TextureSubresourceSet {
            base_mip_level,
            num_mip_levels,
            base_array_slice,
            num_array_slices,
        } = self;

        if base_mip_level >= desc.mip_levels {
            return Err(ValidationError::new(
                "base_mip_level",
                "is not less than `desc.mip_levels`",
            ));
        }

        let num_mip_levels = if single_mip_level {
            1
        } else if num_mip_levels == Self::ALL_MIP_LEVELS {
            desc.mip_levels - base_mip_level
        } else {
            resolve_count(
                base_mip_level,
                num_mip_levels,
                desc.mip_levels,
                "num_mip_levels",
                "`base_mip_level + num_mip_levels` is greater than `desc.mip_levels`",
            )?
        };

        let (base_array_slice, num_array_slices) = if desc.dimension.is_array() {
            if base_array_slice >= desc.array_size {
                return Err(ValidationError::new(
                    "base_array_slice",
                    "is not less than `desc.array_size`",
                ));
            }

            let num_array_slices = if num_array_slices == Self::ALL_ARRAY_SLICES {
                desc.array_size - base_array_slice
            } else {
                resolve_count(
                    base_array_slice,
                    num_array_slices,
                    desc.array_size,
                    "num_array_slices",
                    "`base_array_slice + num_array_slices` is greater than `desc.array_size`",
                )?
            };

            (base_array_slice, num_array_slices)
        } else {
            if base_array_slice != 0 {
                return Err(ValidationError::new(
                    "base_array_slice",
                    "is not `0`, but the texture is not an array texture",
                ));
            }

            (0, 1)
        };

        Ok(TextureSubresourceSet {
            base_mip_level,
            num_mip_levels,
            base_array_slice,
            num_array_slices,
        })
    }

    /// Returns whether the set covers every subresource of a texture with descriptor `desc`.
    pub fn is_entire_texture(&self, desc: &TextureDesc) -> bool {
        if self.base_mip_level > 0
            || self.base_mip_level.saturating_add(self.num_mip_levels) < desc.mip_levels
        {
            return false;
        }

        if desc.dimension.is_array()
            && (self.base_array_slice > 0
                || self.base_array_slice.saturating_add(self.num_array_slices) < desc.array_size)
        {
            return false;
        }

        true
    }

    /// Returns an iterator over the `(mip_level, array_slice)` pairs of a resolved set, mip level
    /// major.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> {
        let array_slices = self.array_slice_range();

        self.mip_level_range().flat_map(move |mip_level| {
            array_slices
                .clone()
                .map(move |array_slice| (mip_level, array_slice))
        })
    }
}

fn resolve_count(
    base: u32,
    count: u32,
    limit: u32,
    context: &'static str,
    problem: &'static str,
) -> Result<u32, Box<ValidationError>> {
    if count == 0 {
        return Err(ValidationError::new(context, "is zero"));
    }

    match base.checked_add(count) {
        Some(end) if end <= limit => Ok(count),
        _ => Err(ValidationError::new(context, problem)),
    }
}

/// A box within one subresource of a texture, as copied by [`CommandList::copy_texture`].
///
/// An extent of [`WHOLE_SIZE`] stands for "from the offset to the edge of the mip level".
///
/// [`CommandList::copy_texture`]: crate::CommandList::copy_texture
/// [`WHOLE_SIZE`]: Self::WHOLE_SIZE
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSlice {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_level: u32,
    pub array_slice: u32,
}

impl Default for TextureSlice {
    #[inline]
    fn default() -> Self {
        Self::subresource(0, 0)
    }
}

impl TextureSlice {
    pub const WHOLE_SIZE: u32 = u32::MAX;

    /// Returns a slice covering the whole of one subresource.
    #[inline]
    pub const fn subresource(mip_level: u32, array_slice: u32) -> Self {
        TextureSlice {
            x: 0,
            y: 0,
            z: 0,
            width: Self::WHOLE_SIZE,
            height: Self::WHOLE_SIZE,
            depth: Self::WHOLE_SIZE,
            mip_level,
            array_slice,
        }
    }

    /// Expands the wildcard extents against `desc` and checks that the box lies within its mip
    /// level.
    pub fn resolve(&self, desc: &TextureDesc) -> Result<Self, Box<ValidationError>> {
        let &TextureSlice {
            x,
            y,
            z,
            width,
            height,
            depth,
            mip_level,
            array_slice,
        } = self;

        if mip_level >= desc.mip_levels {
            return Err(ValidationError::new(
                "mip_level",
                "is not less than `desc.mip_levels`",
            ));
        }

        if array_slice >= desc.array_size {
            return Err(ValidationError::new(
                "array_slice",
                "is not less than `desc.array_size`",
            ));
        }

        let mip_width = (desc.width >> mip_level).max(1);
        let mip_height = (desc.height >> mip_level).max(1);
        let mip_depth = (desc.depth >> mip_level).max(1);

        Ok(TextureSlice {
            x,
            y,
            z,
            width: resolve_extent(x, width, mip_width, "x", "width")?,
            height: resolve_extent(y, height, mip_height, "y", "height")?,
            depth: resolve_extent(z, depth, mip_depth, "z", "depth")?,
            mip_level,
            array_slice,
        })
    }

    /// Returns the subresource that the slice lies in.
    #[inline]
    pub const fn subresources(&self) -> TextureSubresourceSet {
        TextureSubresourceSet::single(self.mip_level, self.array_slice)
    }
}

fn resolve_extent(
    offset: u32,
    extent: u32,
    limit: u32,
    offset_context: &'static str,
    extent_context: &'static str,
) -> Result<u32, Box<ValidationError>> {
    if offset >= limit {
        return Err(ValidationError::new(
            offset_context,
            "is not less than the extent of the mip level",
        ));
    }

    if extent == TextureSlice::WHOLE_SIZE {
        return Ok(limit - offset);
    }

    resolve_count(
        offset,
        extent,
        limit,
        extent_context,
        "reaches past the edge of the mip level",
    )
}

/// A texture whose subresource states are tracked.
#[derive(Debug)]
pub struct Texture {
    handle: u64,
    desc: TextureDesc,
    state: Mutex<TextureState>,
}

impl Texture {
    /// Wraps a native texture object that was created elsewhere.
    ///
    /// `handle` is the raw native handle (a `VkImage` or an `ID3D12Resource` pointer). The state
    /// record starts out unknown, or at `desc.initial_state` if `desc.keep_initial_state` is set.
    pub fn from_handle(handle: u64, desc: TextureDesc) -> Result<Arc<Self>, Box<ValidationError>> {
        desc.validate().map_err(|err| err.add_context("desc"))?;

        Ok(Arc::new(unsafe { Texture::from_handle_unchecked(handle, desc) }))
    }

    /// # Safety
    ///
    /// - `desc` must be valid.
    pub unsafe fn from_handle_unchecked(handle: u64, desc: TextureDesc) -> Self {
        let mut state = TextureState::new(desc.subresource_count());

        if desc.keep_initial_state {
            state.set_all(desc.initial_state);
            state.state_initialized = true;
        }

        Texture {
            handle,
            desc,
            state: Mutex::new(state),
        }
    }

    /// Returns the raw native handle.
    #[inline]
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Returns the descriptor the texture was created with.
    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// Locks the state record of the texture.
    #[inline]
    pub(crate) fn state(&self) -> MutexGuard<'_, TextureState> {
        self.state.lock()
    }
}

/// Describes a buffer.
#[derive(Clone, Debug)]
pub struct BufferDesc {
    /// The size of the buffer in bytes.
    ///
    /// The default value is `0`, which must be overridden.
    pub byte_size: u64,

    /// The state that the buffer is in when it is created.
    ///
    /// The default value is [`ResourceStates::UNKNOWN`].
    pub initial_state: ResourceStates,

    /// If set, the state record starts out at `initial_state` instead of unknown, and every
    /// command list that touches the buffer transitions it back to `initial_state` when it is
    /// closed.
    ///
    /// The default value is `false`.
    pub keep_initial_state: bool,

    /// A name used in diagnostics.
    ///
    /// The default value is empty.
    pub debug_name: String,

    pub _ne: crate::NonExhaustive,
}

impl Default for BufferDesc {
    #[inline]
    fn default() -> Self {
        BufferDesc {
            byte_size: 0,
            initial_state: ResourceStates::UNKNOWN,
            keep_initial_state: false,
            debug_name: String::new(),
            _ne: crate::NE,
        }
    }
}

impl BufferDesc {
    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        if self.byte_size == 0 {
            return Err(ValidationError::new("byte_size", "is zero"));
        }

        if self.keep_initial_state && self.initial_state.is_unknown() {
            return Err(ValidationError::new(
                "initial_state",
                "is `ResourceStates::UNKNOWN`, but `keep_initial_state` is set",
            ));
        }

        Ok(())
    }
}

/// A buffer whose state is tracked as a whole.
#[derive(Debug)]
pub struct Buffer {
    handle: u64,
    desc: BufferDesc,
    state: Mutex<BufferState>,
}

impl Buffer {
    /// Wraps a native buffer object that was created elsewhere.
    ///
    /// `handle` is the raw native handle (a `VkBuffer` or an `ID3D12Resource` pointer).
    pub fn from_handle(handle: u64, desc: BufferDesc) -> Result<Arc<Self>, Box<ValidationError>> {
        desc.validate().map_err(|err| err.add_context("desc"))?;

        Ok(Arc::new(unsafe { Buffer::from_handle_unchecked(handle, desc) }))
    }

    /// # Safety
    ///
    /// - `desc` must be valid.
    pub unsafe fn from_handle_unchecked(handle: u64, desc: BufferDesc) -> Self {
        let mut state = BufferState::new();

        if desc.keep_initial_state {
            state.set(desc.initial_state);
            state.state_initialized = true;
        }

        Buffer {
            handle,
            desc,
            state: Mutex::new(state),
        }
    }

    /// Returns the raw native handle.
    #[inline]
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Returns the descriptor the buffer was created with.
    #[inline]
    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    #[inline]
    pub(crate) fn state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock()
    }
}

/// An acceleration structure. Its state is the state of the buffer that holds its data.
#[derive(Debug)]
pub struct AccelStruct {
    data_buffer: Arc<Buffer>,
    is_top_level: bool,
}

impl AccelStruct {
    #[inline]
    pub fn new(data_buffer: Arc<Buffer>, is_top_level: bool) -> Arc<Self> {
        Arc::new(AccelStruct {
            data_buffer,
            is_top_level,
        })
    }

    /// Returns the buffer that holds the data of the acceleration structure.
    #[inline]
    pub fn data_buffer(&self) -> &Arc<Buffer> {
        &self.data_buffer
    }

    #[inline]
    pub fn is_top_level(&self) -> bool {
        self.is_top_level
    }
}
