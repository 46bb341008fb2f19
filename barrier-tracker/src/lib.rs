//! Automatic resource state tracking and barrier synthesis for a GPU rendering abstraction.
//!
//! Every GPU resource occupies one of a fixed set of access/layout states (see
//! [`ResourceStates`]). Moving a resource from one state to another requires the driver to be
//! told explicitly through a barrier. This crate decides, for every resource touched while
//! recording a [`CommandList`], whether such a transition is required, synthesizes the minimal
//! set of transitions and hands them to a native [`Backend`] in batches.
//!
//! # Overview
//!
//! - The last known state of every [`Texture`] subresource and every [`Buffer`] is stored on the
//!   resource itself and survives across recordings.
//! - A [`StateTracker`] accepts *require state* requests, compares them against the stored state
//!   and accumulates pending [`TextureBarrier`] and [`BufferBarrier`] records.
//! - [`CommandList::commit_barriers`] translates the pending records into native barriers and
//!   submits them as a single batch.
//! - [`CommandList::set_graphics_state`] and friends diff the bound resources against the
//!   previous state, so that unchanged bindings don't have to be re-evaluated.
//! - [`CommandList::copy_buffer`] and the other transfer commands transition what they touch,
//!   commit, and forward the native command to the backend.
//!
//! # Threading
//!
//! The state record of a resource is shared by every command list that uses the resource. A given
//! resource must be used by at most one recording command list at a time. If two recordings need
//! to touch the same resource, they have to be serialized externally, or the state has to be
//! re-seeded with [`CommandList::begin_tracking_texture_state`] once the order of the recordings
//! is known. The per-resource mutex only keeps the record itself coherent; it does not order the
//! recordings.

pub use self::{
    backend::{Backend, D3d12Backend, VulkanBackend},
    binding::{
        BindingSet, BindingSetItem, BindingSetItemType, ComputeState, Framebuffer,
        FramebufferAttachment, GraphicsState, IndexBufferBinding, MeshletState, RayTracingState,
        VertexBufferBinding, MAX_BINDING_SETS, MAX_RENDER_TARGETS, MAX_VERTEX_BUFFERS,
    },
    command_buffer::{ClearValue, CommandList, CommandListCreateInfo},
    message::{MessageCallback, MessageSeverity, TracingMessageCallback},
    resource::{
        AccelStruct, Buffer, BufferDesc, Format, Texture, TextureDesc, TextureDimension,
        TextureSlice, TextureSubresourceSet,
    },
    state::ResourceStates,
    tracker::{BufferBarrier, StateTracker, TextureBarrier},
};
use std::{borrow::Cow, error::Error, fmt};

pub mod backend;
pub mod binding;
pub mod command_buffer;
pub mod message;
pub mod resource;
mod state;
pub mod tracker;

/// A request that could not be honored because it violates a precondition of the operation.
///
/// This is what the crate's documentation calls a *precondition violation*: an out-of-range
/// subresource, an unseeded resource when validation is enabled, or a recording call on a
/// command list that isn't open. It is a programming error on the caller's side.
#[derive(Clone, Debug, Default)]
pub struct ValidationError {
    /// The context in which the problem exists (e.g. a specific parameter).
    pub context: Cow<'static, str>,

    /// A description of the problem.
    pub problem: Cow<'static, str>,

    /// Identifiers of the rules that were violated, if the problem corresponds to a rule of the
    /// native API.
    pub vuids: &'static [&'static str],
}

impl ValidationError {
    fn new(
        context: impl Into<Cow<'static, str>>,
        problem: impl Into<Cow<'static, str>>,
    ) -> Box<Self> {
        Box::new(ValidationError {
            context: context.into(),
            problem: problem.into(),
            vuids: &[],
        })
    }

    pub(crate) fn add_context(self: Box<Self>, context: impl Into<Cow<'static, str>>) -> Box<Self> {
        let context = context.into();

        if self.context.is_empty() {
            Box::new(ValidationError { context, ..*self })
        } else {
            Box::new(ValidationError {
                context: format!("{}.{}", context, self.context).into(),
                ..*self
            })
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}", self.problem)?;
        } else {
            write!(f, "{}: {}", self.context, self.problem)?;
        }

        if !self.vuids.is_empty() {
            write!(f, " ({})", self.vuids.join(", "))?;
        }

        Ok(())
    }
}

impl Error for ValidationError {}

/// Used in structs to prevent users from using struct literal syntax without
/// `..Default::default()`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NonExhaustive(pub(crate) ());

impl fmt::Debug for NonExhaustive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("NonExhaustive")
    }
}

const NE: NonExhaustive = NonExhaustive(());

#[cfg(test)]
mod tests {
    use super::ValidationError;

    #[test]
    fn validation_error_display() {
        let err = ValidationError::new("mip_level", "is not less than `desc.mip_levels`");
        assert_eq!(err.to_string(), "mip_level: is not less than `desc.mip_levels`");

        let err = err.add_context("subresources");
        assert_eq!(
            err.to_string(),
            "subresources.mip_level: is not less than `desc.mip_levels`",
        );

        let err = ValidationError::new("", "the command list is not open");
        assert_eq!(err.to_string(), "the command list is not open");
    }
}
