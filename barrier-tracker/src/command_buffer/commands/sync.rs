use crate::{
    backend::Backend, command_buffer::CommandList, AccelStruct, Buffer, ResourceStates, Texture,
    TextureSubresourceSet,
};
use std::sync::Arc;

/// # Commands to transition resources
impl<B: Backend> CommandList<B> {
    /// Requires `subresources` of `texture` to be in `state` for the commands that follow.
    ///
    /// The transition is recorded with the next [`commit_barriers`](Self::commit_barriers),
    /// which the state setters do implicitly.
    pub fn set_texture_state(
        &mut self,
        texture: &Arc<Texture>,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) -> &mut Self {
        if self.ensure_open("set_texture_state") {
            self.require_texture_state(texture, subresources, state);
        }

        self
    }

    /// Requires `buffer` to be in `state` for the commands that follow.
    pub fn set_buffer_state(&mut self, buffer: &Arc<Buffer>, state: ResourceStates) -> &mut Self {
        if self.ensure_open("set_buffer_state") {
            self.require_buffer_state(buffer, state);
        }

        self
    }

    /// Requires the buffer holding the data of `accel_struct` to be in `state`.
    pub fn set_accel_struct_state(
        &mut self,
        accel_struct: &AccelStruct,
        state: ResourceStates,
    ) -> &mut Self {
        if self.ensure_open("set_accel_struct_state") {
            self.require_buffer_state(accel_struct.data_buffer(), state);
        }

        self
    }

    /// Transitions `texture` to `state` and pins it there. See
    /// [`StateTracker::set_permanent_texture_state`].
    ///
    /// [`StateTracker::set_permanent_texture_state`]: crate::StateTracker::set_permanent_texture_state
    pub fn set_permanent_texture_state(
        &mut self,
        texture: &Arc<Texture>,
        state: ResourceStates,
    ) -> &mut Self {
        if self.ensure_open("set_permanent_texture_state") {
            if let Err(err) = self.state_tracker.set_permanent_texture_state(texture, state) {
                self.report(err.add_context("set_permanent_texture_state"));
            }
        }

        self
    }

    /// Transitions `buffer` to `state` and pins it there.
    pub fn set_permanent_buffer_state(
        &mut self,
        buffer: &Arc<Buffer>,
        state: ResourceStates,
    ) -> &mut Self {
        if self.ensure_open("set_permanent_buffer_state") {
            if let Err(err) = self.state_tracker.set_permanent_buffer_state(buffer, state) {
                self.report(err.add_context("set_permanent_buffer_state"));
            }
        }

        self
    }

    /// Declares that `subresources` of `texture` already are in `state`. No barrier is recorded.
    pub fn begin_tracking_texture_state(
        &mut self,
        texture: &Arc<Texture>,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) -> &mut Self {
        if self.ensure_open("begin_tracking_texture_state") {
            if let Err(err) =
                self.state_tracker
                    .begin_tracking_texture_state(texture, subresources, state)
            {
                self.report(err.add_context("begin_tracking_texture_state"));
            }
        }

        self
    }

    /// Declares that `buffer` already is in `state`. No barrier is recorded.
    pub fn begin_tracking_buffer_state(
        &mut self,
        buffer: &Arc<Buffer>,
        state: ResourceStates,
    ) -> &mut Self {
        if self.ensure_open("begin_tracking_buffer_state") {
            if let Err(err) = self.state_tracker.begin_tracking_buffer_state(buffer, state) {
                self.report(err.add_context("begin_tracking_buffer_state"));
            }
        }

        self
    }

    /// Records every pending transition as a single batch, ending the current render pass first.
    /// Does nothing if no transitions are pending.
    pub fn commit_barriers(&mut self) -> &mut Self {
        if !self.state_tracker.has_barriers() {
            return self;
        }

        self.end_render_pass();
        self.commit_barriers_internal();

        self
    }

    pub(in crate::command_buffer) fn commit_barriers_internal(&mut self) {
        if !self.state_tracker.has_barriers() {
            return;
        }

        let texture_barriers = self.state_tracker.texture_barriers();
        let buffer_barriers = self.state_tracker.buffer_barriers();

        tracing::trace!(
            texture_barriers = texture_barriers.len(),
            buffer_barriers = buffer_barriers.len(),
            "committing barriers",
        );

        self.backend
            .commit_barriers(texture_barriers, buffer_barriers);
        self.state_tracker.clear_barriers();
    }

    /// Discards every pending transition without recording it.
    ///
    /// The states recorded on the resources are not rolled back: this is only correct if the
    /// command list is discarded as well, and the resources are re-seeded before their next use.
    pub fn clear_barriers(&mut self) -> &mut Self {
        self.state_tracker.clear_barriers();

        self
    }

    /// Returns whether any transitions are pending.
    #[inline]
    pub fn has_barriers(&self) -> bool {
        self.state_tracker.has_barriers()
    }

    /// Returns the last known state of one subresource of `texture`, or
    /// [`ResourceStates::UNKNOWN`] after reporting an error if the subresource doesn't exist.
    pub fn texture_subresource_state(
        &self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
    ) -> ResourceStates {
        self.state_tracker
            .texture_subresource_state(texture, array_slice, mip_level)
            .unwrap_or_else(|err| {
                self.report(err.add_context("texture_subresource_state"));

                ResourceStates::UNKNOWN
            })
    }

    /// Returns the last known state of `buffer`.
    #[inline]
    pub fn buffer_state(&self, buffer: &Buffer) -> ResourceStates {
        self.state_tracker.buffer_state(buffer)
    }

    /// Enables or disables UAV hazard barriers between back-to-back unordered accesses of
    /// `texture`.
    pub fn set_enable_uav_barriers_for_texture(
        &mut self,
        texture: &Texture,
        enable: bool,
    ) -> &mut Self {
        self.state_tracker
            .set_enable_uav_barriers_for_texture(texture, enable);

        self
    }

    pub fn set_enable_uav_barriers_for_buffer(&mut self, buffer: &Buffer, enable: bool) -> &mut Self {
        self.state_tracker
            .set_enable_uav_barriers_for_buffer(buffer, enable);

        self
    }

    /// Enables or disables the automatic transitions of bound resources.
    ///
    /// While disabled, the application is responsible for transitioning every resource that the
    /// bindings reference. This is not validated.
    pub fn set_enable_automatic_barriers(&mut self, enable: bool) -> &mut Self {
        self.enable_automatic_barriers = enable;

        self
    }

    #[inline]
    pub fn automatic_barriers_enabled(&self) -> bool {
        self.enable_automatic_barriers
    }

    /// Returns `false` after reporting the error if the request is invalid.
    pub(in crate::command_buffer) fn require_texture_state(
        &mut self,
        texture: &Arc<Texture>,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) -> bool {
        match self
            .state_tracker
            .require_texture_state(texture, subresources, state)
        {
            Ok(()) => true,
            Err(err) => {
                self.report(err);
                false
            }
        }
    }

    pub(in crate::command_buffer) fn require_buffer_state(
        &mut self,
        buffer: &Arc<Buffer>,
        state: ResourceStates,
    ) -> bool {
        match self.state_tracker.require_buffer_state(buffer, state) {
            Ok(()) => true,
            Err(err) => {
                self.report(err);
                false
            }
        }
    }
}
