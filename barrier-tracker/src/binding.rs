//! Binding state that is applied to a [`CommandList`] before a draw, dispatch or trace.
//!
//! The command list diffs each new state against the state of the previous such call, so that
//! only the bindings that changed have to go through the [`StateTracker`] again.
//!
//! [`CommandList`]: crate::CommandList
//! [`StateTracker`]: crate::StateTracker

use crate::{AccelStruct, Buffer, ResourceStates, Texture, TextureSubresourceSet, ValidationError};
use smallvec::SmallVec;
use std::sync::Arc;

/// The maximum number of binding sets bound at the same time. Bounds the width of the binding
/// diff mask.
pub const MAX_BINDING_SETS: usize = 8;

/// The maximum number of vertex buffers bound at the same time.
pub const MAX_VERTEX_BUFFERS: usize = 16;

/// The maximum number of color attachments of a framebuffer.
pub const MAX_RENDER_TARGETS: usize = 8;

const _: () = assert!(MAX_BINDING_SETS <= u32::BITS as usize);

/// The kind of a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BindingSetItemType {
    TextureSrv,
    TextureUav,
    TypedBufferSrv,
    TypedBufferUav,
    StructuredBufferSrv,
    StructuredBufferUav,
    RawBufferSrv,
    RawBufferUav,
    ConstantBuffer,
    RayTracingAccelStruct,
    Sampler,
    PushConstants,
}

impl BindingSetItemType {
    /// Returns whether the binding grants unordered access.
    #[inline]
    pub const fn is_uav(self) -> bool {
        matches!(
            self,
            Self::TextureUav | Self::TypedBufferUav | Self::StructuredBufferUav | Self::RawBufferUav,
        )
    }

    /// Returns the state that the bound resource must be in, or `None` if the binding doesn't
    /// reference a tracked resource.
    pub const fn required_state(self) -> Option<ResourceStates> {
        match self {
            Self::TextureSrv
            | Self::TypedBufferSrv
            | Self::StructuredBufferSrv
            | Self::RawBufferSrv => Some(ResourceStates::SHADER_RESOURCE),
            Self::TextureUav
            | Self::TypedBufferUav
            | Self::StructuredBufferUav
            | Self::RawBufferUav => Some(ResourceStates::UNORDERED_ACCESS),
            Self::ConstantBuffer => Some(ResourceStates::CONSTANT_BUFFER),
            Self::RayTracingAccelStruct => Some(ResourceStates::ACCEL_STRUCT_READ),
            Self::Sampler | Self::PushConstants => None,
        }
    }
}

/// The resource referenced by a binding.
#[derive(Clone, Debug)]
pub enum BindingResource {
    None,
    Texture(Arc<Texture>),
    Buffer(Arc<Buffer>),
    AccelStruct(Arc<AccelStruct>),
}

/// One binding of a [`BindingSet`].
#[derive(Clone, Debug)]
pub struct BindingSetItem {
    pub slot: u32,
    pub ty: BindingSetItemType,
    pub resource: BindingResource,

    /// The subresources of a texture binding. Ignored for other bindings.
    pub subresources: TextureSubresourceSet,
}

impl BindingSetItem {
    #[inline]
    pub fn texture_srv(
        slot: u32,
        texture: Arc<Texture>,
        subresources: TextureSubresourceSet,
    ) -> Self {
        Self::texture(slot, BindingSetItemType::TextureSrv, texture, subresources)
    }

    #[inline]
    pub fn texture_uav(
        slot: u32,
        texture: Arc<Texture>,
        subresources: TextureSubresourceSet,
    ) -> Self {
        Self::texture(slot, BindingSetItemType::TextureUav, texture, subresources)
    }

    #[inline]
    pub fn typed_buffer_srv(slot: u32, buffer: Arc<Buffer>) -> Self {
        Self::buffer(slot, BindingSetItemType::TypedBufferSrv, buffer)
    }

    #[inline]
    pub fn typed_buffer_uav(slot: u32, buffer: Arc<Buffer>) -> Self {
        Self::buffer(slot, BindingSetItemType::TypedBufferUav, buffer)
    }

    #[inline]
    pub fn structured_buffer_srv(slot: u32, buffer: Arc<Buffer>) -> Self {
        Self::buffer(slot, BindingSetItemType::StructuredBufferSrv, buffer)
    }

    #[inline]
    pub fn structured_buffer_uav(slot: u32, buffer: Arc<Buffer>) -> Self {
        Self::buffer(slot, BindingSetItemType::StructuredBufferUav, buffer)
    }

    #[inline]
    pub fn raw_buffer_srv(slot: u32, buffer: Arc<Buffer>) -> Self {
        Self::buffer(slot, BindingSetItemType::RawBufferSrv, buffer)
    }

    #[inline]
    pub fn raw_buffer_uav(slot: u32, buffer: Arc<Buffer>) -> Self {
        Self::buffer(slot, BindingSetItemType::RawBufferUav, buffer)
    }

    #[inline]
    pub fn constant_buffer(slot: u32, buffer: Arc<Buffer>) -> Self {
        Self::buffer(slot, BindingSetItemType::ConstantBuffer, buffer)
    }

    #[inline]
    pub fn accel_struct(slot: u32, accel_struct: Arc<AccelStruct>) -> Self {
        BindingSetItem {
            slot,
            ty: BindingSetItemType::RayTracingAccelStruct,
            resource: BindingResource::AccelStruct(accel_struct),
            subresources: TextureSubresourceSet::ALL,
        }
    }

    #[inline]
    pub fn sampler(slot: u32) -> Self {
        BindingSetItem {
            slot,
            ty: BindingSetItemType::Sampler,
            resource: BindingResource::None,
            subresources: TextureSubresourceSet::ALL,
        }
    }

    #[inline]
    pub fn push_constants(slot: u32) -> Self {
        BindingSetItem {
            slot,
            ty: BindingSetItemType::PushConstants,
            resource: BindingResource::None,
            subresources: TextureSubresourceSet::ALL,
        }
    }

    fn texture(
        slot: u32,
        ty: BindingSetItemType,
        texture: Arc<Texture>,
        subresources: TextureSubresourceSet,
    ) -> Self {
        BindingSetItem {
            slot,
            ty,
            resource: BindingResource::Texture(texture),
            subresources,
        }
    }

    fn buffer(slot: u32, ty: BindingSetItemType, buffer: Arc<Buffer>) -> Self {
        BindingSetItem {
            slot,
            ty,
            resource: BindingResource::Buffer(buffer),
            subresources: TextureSubresourceSet::ALL,
        }
    }

    fn is_pinned(&self) -> bool {
        match &self.resource {
            BindingResource::None => true,
            BindingResource::Texture(texture) => texture.state().is_permanent(),
            BindingResource::Buffer(buffer) => buffer.state().is_permanent(),
            BindingResource::AccelStruct(accel_struct) => {
                accel_struct.data_buffer().state().is_permanent()
            }
        }
    }

    fn validate(&self) -> Result<(), Box<ValidationError>> {
        let matches = match (&self.resource, self.ty) {
            (BindingResource::Texture(_), ty) => {
                matches!(ty, BindingSetItemType::TextureSrv | BindingSetItemType::TextureUav)
            }
            (BindingResource::AccelStruct(_), ty) => ty == BindingSetItemType::RayTracingAccelStruct,
            (BindingResource::None, ty) => ty.required_state().is_none(),
            (BindingResource::Buffer(_), ty) => ty.required_state().is_some()
                && !matches!(
                    ty,
                    BindingSetItemType::TextureSrv
                        | BindingSetItemType::TextureUav
                        | BindingSetItemType::RayTracingAccelStruct
                ),
        };

        if !matches {
            return Err(ValidationError::new(
                "resource",
                "does not match the binding type `ty`",
            ));
        }

        if let BindingResource::Texture(texture) = &self.resource {
            self.subresources
                .resolve(texture.desc(), false)
                .map_err(|err| err.add_context("subresources"))?;
        }

        Ok(())
    }
}

/// A group of bindings that is bound as a unit.
///
/// The bindings that need state transitions are determined once, when the set is created.
#[derive(Debug)]
pub struct BindingSet {
    // `None` for a bindless descriptor table, whose resources are never tracked automatically.
    items: Option<Vec<BindingSetItem>>,
    bindings_that_need_transitions: SmallVec<[u16; 16]>,
    has_uav_bindings: bool,
}

impl BindingSet {
    /// Creates a binding set from its bindings.
    pub fn new(items: Vec<BindingSetItem>) -> Result<Arc<Self>, Box<ValidationError>> {
        if items.len() > u16::MAX as usize {
            return Err(ValidationError::new("items", "has more than 65535 elements"));
        }

        for (index, item) in items.iter().enumerate() {
            item.validate()
                .map_err(|err| err.add_context(format!("items[{index}]")))?;
        }

        let bindings_that_need_transitions = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_pinned())
            .map(|(index, _)| index as u16)
            .collect();
        let has_uav_bindings = items.iter().any(|item| item.ty.is_uav());

        Ok(Arc::new(BindingSet {
            items: Some(items),
            bindings_that_need_transitions,
            has_uav_bindings,
        }))
    }

    /// Creates a bindless descriptor table. Resources accessed through it have to be transitioned
    /// explicitly.
    pub fn bindless() -> Arc<Self> {
        Arc::new(BindingSet {
            items: None,
            bindings_that_need_transitions: SmallVec::new(),
            has_uav_bindings: false,
        })
    }

    /// Returns the bindings, or `None` for a bindless set.
    #[inline]
    pub fn items(&self) -> Option<&[BindingSetItem]> {
        self.items.as_deref()
    }

    #[inline]
    pub fn is_bindless(&self) -> bool {
        self.items.is_none()
    }

    #[inline]
    pub fn has_uav_bindings(&self) -> bool {
        self.has_uav_bindings
    }

    /// Returns the bindings whose resources weren't pinned when the set was created.
    pub(crate) fn bindings_that_need_transitions(
        &self,
    ) -> impl Iterator<Item = &BindingSetItem> + '_ {
        let items = self.items.as_deref().unwrap_or(&[]);

        self.bindings_that_need_transitions
            .iter()
            .map(move |&index| &items[usize::from(index)])
    }
}

/// One attachment of a [`Framebuffer`].
#[derive(Clone, Debug)]
pub struct FramebufferAttachment {
    pub texture: Arc<Texture>,

    /// The subresources rendered to. Only the base mip level is used.
    ///
    /// The default value is mip level `0` of array slice `0`.
    pub subresources: TextureSubresourceSet,

    /// Whether a depth attachment is only read from.
    ///
    /// The default value is `false`.
    pub is_read_only: bool,
}

impl FramebufferAttachment {
    #[inline]
    pub fn new(texture: Arc<Texture>) -> Self {
        FramebufferAttachment {
            texture,
            subresources: TextureSubresourceSet::single(0, 0),
            is_read_only: false,
        }
    }

    #[inline]
    pub fn with_subresources(mut self, subresources: TextureSubresourceSet) -> Self {
        self.subresources = subresources;
        self
    }

    #[inline]
    pub fn read_only(mut self) -> Self {
        self.is_read_only = true;
        self
    }

    fn resolve(mut self) -> Result<Self, Box<ValidationError>> {
        self.subresources = self
            .subresources
            .resolve(self.texture.desc(), true)
            .map_err(|err| err.add_context("subresources"))?;

        Ok(self)
    }
}

/// A set of attachments that a render pass renders to.
#[derive(Debug)]
pub struct Framebuffer {
    color_attachments: SmallVec<[FramebufferAttachment; MAX_RENDER_TARGETS]>,
    depth_attachment: Option<FramebufferAttachment>,
}

impl Framebuffer {
    pub fn new(
        color_attachments: impl IntoIterator<Item = FramebufferAttachment>,
        depth_attachment: Option<FramebufferAttachment>,
    ) -> Result<Arc<Self>, Box<ValidationError>> {
        let color_attachments = color_attachments
            .into_iter()
            .enumerate()
            .map(|(index, attachment)| {
                if attachment.is_read_only {
                    return Err(ValidationError::new(
                        format!("color_attachments[{index}].is_read_only"),
                        "is set, but only a depth attachment can be read-only",
                    ));
                }

                attachment
                    .resolve()
                    .map_err(|err| err.add_context(format!("color_attachments[{index}]")))
            })
            .collect::<Result<SmallVec<[_; MAX_RENDER_TARGETS]>, _>>()?;

        if color_attachments.len() > MAX_RENDER_TARGETS {
            return Err(ValidationError::new(
                "color_attachments",
                "has more than `MAX_RENDER_TARGETS` elements",
            ));
        }

        let depth_attachment = depth_attachment
            .map(|attachment| {
                if !attachment.texture.desc().format.has_depth() {
                    return Err(ValidationError::new(
                        "depth_attachment.texture",
                        "does not have a depth format",
                    ));
                }

                attachment
                    .resolve()
                    .map_err(|err| err.add_context("depth_attachment"))
            })
            .transpose()?;

        Ok(Arc::new(Framebuffer {
            color_attachments,
            depth_attachment,
        }))
    }

    #[inline]
    pub fn color_attachments(&self) -> &[FramebufferAttachment] {
        &self.color_attachments
    }

    #[inline]
    pub fn depth_attachment(&self) -> Option<&FramebufferAttachment> {
        self.depth_attachment.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct IndexBufferBinding {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
}

#[derive(Clone, Debug)]
pub struct VertexBufferBinding {
    pub buffer: Arc<Buffer>,
    pub slot: u32,
    pub offset: u64,
}

impl PartialEq for VertexBufferBinding {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
            && self.slot == other.slot
            && self.offset == other.offset
    }
}

/// The bindings of a draw.
#[derive(Clone, Debug, Default)]
pub struct GraphicsState {
    pub bindings: SmallVec<[Arc<BindingSet>; MAX_BINDING_SETS]>,

    /// The framebuffer rendered to. If `None`, no render pass is begun.
    pub framebuffer: Option<Arc<Framebuffer>>,

    pub index_buffer: Option<IndexBufferBinding>,

    pub vertex_buffers: SmallVec<[VertexBufferBinding; MAX_VERTEX_BUFFERS]>,

    /// The buffer holding the arguments of indirect draws.
    pub indirect_params: Option<Arc<Buffer>>,

    /// The buffer holding the draw count of indirect draws.
    pub indirect_count_params: Option<Arc<Buffer>>,
}

/// The bindings of a dispatch.
#[derive(Clone, Debug, Default)]
pub struct ComputeState {
    pub bindings: SmallVec<[Arc<BindingSet>; MAX_BINDING_SETS]>,
    pub indirect_params: Option<Arc<Buffer>>,
}

/// The bindings of a mesh shader dispatch.
#[derive(Clone, Debug, Default)]
pub struct MeshletState {
    pub bindings: SmallVec<[Arc<BindingSet>; MAX_BINDING_SETS]>,
    pub framebuffer: Option<Arc<Framebuffer>>,
    pub indirect_params: Option<Arc<Buffer>>,
}

/// The bindings of a ray tracing dispatch.
#[derive(Clone, Debug, Default)]
pub struct RayTracingState {
    pub bindings: SmallVec<[Arc<BindingSet>; MAX_BINDING_SETS]>,
}

/// Returns a mask with one bit set for every slot in which `new` and `old` hold different binding
/// sets. If the lengths differ, every bit is set.
pub fn array_difference_mask<T>(new: &[Arc<T>], old: &[Arc<T>]) -> u32 {
    if new.len() != old.len() {
        return !0;
    }

    debug_assert!(new.len() <= u32::BITS as usize);

    new.iter()
        .zip(old)
        .enumerate()
        .filter(|(_, (new, old))| !Arc::ptr_eq(new, old))
        .fold(0, |mask, (index, _)| mask | (1 << index))
}

pub(crate) fn option_ptr_eq<T>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
