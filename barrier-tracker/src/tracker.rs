//! Per-recording state tracking.
//!
//! A [`StateTracker`] belongs to one command list. It compares the state that a resource is
//! required to be in against the state recorded on the resource, updates the record, and
//! accumulates the transitions that have to be submitted before the next GPU operation.

use crate::{
    resource::TextureState, Buffer, ResourceStates, Texture, TextureSubresourceSet,
    ValidationError,
};
use foldhash::HashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// A pending transition of a set of texture subresources.
#[derive(Clone, Debug)]
pub struct TextureBarrier {
    pub texture: Arc<Texture>,

    /// The resolved set of subresources that the transition applies to.
    pub subresources: TextureSubresourceSet,

    /// Whether `subresources` covers the entire texture.
    pub entire_texture: bool,

    pub state_before: ResourceStates,

    pub state_after: ResourceStates,
}

impl TextureBarrier {
    /// Returns whether this is a UAV hazard barrier rather than a state change.
    #[inline]
    pub fn is_uav_barrier(&self) -> bool {
        self.state_before == self.state_after && self.state_after.is_unordered_access()
    }
}

/// A pending transition of a buffer.
#[derive(Clone, Debug)]
pub struct BufferBarrier {
    pub buffer: Arc<Buffer>,

    pub state_before: ResourceStates,

    pub state_after: ResourceStates,
}

impl BufferBarrier {
    /// Returns whether this is a UAV hazard barrier rather than a state change.
    #[inline]
    pub fn is_uav_barrier(&self) -> bool {
        self.state_before == self.state_after && self.state_after.is_unordered_access()
    }
}

/// Accumulates the transitions required by one recording.
///
/// The tracker doesn't own any resource state: the records live on the resources themselves, and
/// the tracker only holds the pending transitions until they are committed or discarded.
#[derive(Debug, Default)]
pub struct StateTracker {
    texture_barriers: Vec<TextureBarrier>,
    buffer_barriers: Vec<BufferBarrier>,
    // Resources with `keep_initial_state` that were touched since the last restoration, keyed by
    // address.
    initial_state_textures: HashMap<usize, Arc<Texture>>,
    initial_state_buffers: HashMap<usize, Arc<Buffer>>,
    validate: bool,
}

impl StateTracker {
    /// Creates a new tracker. If `validate` is set, using a resource whose state was never seeded
    /// is reported as an error instead of being treated as its first use.
    pub fn new(validate: bool) -> Self {
        StateTracker {
            validate,
            ..Default::default()
        }
    }

    /// Returns the pending texture transitions.
    #[inline]
    pub fn texture_barriers(&self) -> &[TextureBarrier] {
        &self.texture_barriers
    }

    /// Returns the pending buffer transitions.
    #[inline]
    pub fn buffer_barriers(&self) -> &[BufferBarrier] {
        &self.buffer_barriers
    }

    /// Returns whether any transitions are pending.
    #[inline]
    pub fn has_barriers(&self) -> bool {
        !self.texture_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    /// Requires `subresources` of `texture` to be in `state` for the next GPU operation.
    ///
    /// Subresources that are in a different state get a transition. Subresources that already are
    /// in an unordered-access state get a UAV hazard barrier, unless UAV barriers are disabled for
    /// the texture or one was already placed for that subresource since the last commit. If every
    /// subresource of the set needs the same transition, a single transition is recorded for the
    /// whole set.
    ///
    /// `state` must constrain the layout of the texture (see
    /// [`ResourceStates::TEXTURE_LAYOUT_STATES`]). Does nothing if the texture is pinned to a
    /// permanent state.
    pub fn require_texture_state(
        &mut self,
        texture: &Arc<Texture>,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) -> Result<(), Box<ValidationError>> {
        let subresources = self.validate_require_texture_state(texture, subresources, state)?;

        if texture.state().permanent_transition {
            return Ok(());
        }

        self.require_texture_state_resolved(texture, subresources, state);

        Ok(())
    }

    fn validate_require_texture_state(
        &self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) -> Result<TextureSubresourceSet, Box<ValidationError>> {
        validate_required_texture_state(state)?;

        let subresources = subresources
            .resolve(texture.desc(), false)
            .map_err(|err| err.add_context("subresources"))?;

        if self.validate {
            let record = texture.state();

            if !record.state_initialized
                && subresources.iter().any(|(mip_level, array_slice)| {
                    let index = texture.desc().subresource_index(mip_level, array_slice);
                    record.subresource_state(index).is_unknown()
                })
            {
                return Err(ValidationError::new(
                    "texture",
                    format!(
                        "the prior state of texture `{}` is unknown; call \
                        `begin_tracking_texture_state` before using the texture, or set \
                        `keep_initial_state` and `initial_state` in its descriptor",
                        texture.desc().debug_name,
                    ),
                ));
            }
        }

        Ok(subresources)
    }

    fn require_texture_state_resolved(
        &mut self,
        texture: &Arc<Texture>,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) {
        let desc = texture.desc();

        if desc.keep_initial_state {
            self.initial_state_textures
                .entry(Arc::as_ptr(texture) as usize)
                .or_insert_with(|| texture.clone());
        }

        let mut record = texture.state();
        let mut pending: SmallVec<[(u32, u32, ResourceStates); 16]> = SmallVec::new();

        for (mip_level, array_slice) in subresources.iter() {
            let index = desc.subresource_index(mip_level, array_slice);
            let prior_state = record.subresource_state(index);
            let uav_barrier_needed = state.is_unordered_access()
                && record.enable_uav_barriers
                && !record.uav_barrier_placed(index);

            if prior_state != state || uav_barrier_needed {
                pending.push((mip_level, array_slice, prior_state));

                // Both a transition into the unordered-access state and a UAV hazard barrier
                // synchronize against earlier unordered accesses of this subresource.
                record.set_uav_barrier_placed(index, state.is_unordered_access());
            }

            record.set_subresource_state(index, state);
        }

        drop(record);

        if pending.is_empty() {
            return;
        }

        self.push_texture_barriers(texture, subresources, &pending, state);
    }

    fn push_texture_barriers(
        &mut self,
        texture: &Arc<Texture>,
        subresources: TextureSubresourceSet,
        pending: &[(u32, u32, ResourceStates)],
        state: ResourceStates,
    ) {
        let desc = texture.desc();
        let first_state_before = pending[0].2;

        if pending.len() == subresources.len()
            && pending
                .iter()
                .all(|&(_, _, state_before)| state_before == first_state_before)
        {
            self.texture_barriers.push(TextureBarrier {
                texture: texture.clone(),
                subresources,
                entire_texture: subresources.is_entire_texture(desc),
                state_before: first_state_before,
                state_after: state,
            });
        } else {
            self.texture_barriers.extend(pending.iter().map(
                |&(mip_level, array_slice, state_before)| {
                    let subresources = TextureSubresourceSet::single(mip_level, array_slice);

                    TextureBarrier {
                        texture: texture.clone(),
                        subresources,
                        entire_texture: subresources.is_entire_texture(desc),
                        state_before,
                        state_after: state,
                    }
                },
            ));
        }
    }

    /// Requires `buffer` to be in `state` for the next GPU operation.
    ///
    /// Does nothing if the buffer is pinned to a permanent state.
    pub fn require_buffer_state(
        &mut self,
        buffer: &Arc<Buffer>,
        state: ResourceStates,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_require_buffer_state(buffer, state)?;

        if buffer.state().permanent_transition {
            return Ok(());
        }

        self.require_buffer_state_unchecked(buffer, state);

        Ok(())
    }

    fn validate_require_buffer_state(
        &self,
        buffer: &Buffer,
        state: ResourceStates,
    ) -> Result<(), Box<ValidationError>> {
        validate_required_state(state)?;

        if self.validate {
            let record = buffer.state();

            if !record.state_initialized && record.get().is_unknown() {
                return Err(ValidationError::new(
                    "buffer",
                    format!(
                        "the prior state of buffer `{}` is unknown; call \
                        `begin_tracking_buffer_state` before using the buffer, or set \
                        `keep_initial_state` and `initial_state` in its descriptor",
                        buffer.desc().debug_name,
                    ),
                ));
            }
        }

        Ok(())
    }

    fn require_buffer_state_unchecked(&mut self, buffer: &Arc<Buffer>, state: ResourceStates) {
        if buffer.desc().keep_initial_state {
            self.initial_state_buffers
                .entry(Arc::as_ptr(buffer) as usize)
                .or_insert_with(|| buffer.clone());
        }

        let mut record = buffer.state();
        let prior_state = record.get();

        let uav_barrier_needed = state.is_unordered_access()
            && record.enable_uav_barriers
            && !record.uav_barrier_placed;

        if prior_state == state && !uav_barrier_needed {
            return;
        }

        record.set(state);
        record.uav_barrier_placed = state.is_unordered_access();
        drop(record);

        self.buffer_barriers.push(BufferBarrier {
            buffer: buffer.clone(),
            state_before: prior_state,
            state_after: state,
        });
    }

    /// Transitions every subresource of `texture` to `state` one last time and pins it there.
    ///
    /// Every later request on the texture is a no-op, which removes the tracking overhead for
    /// resources whose state never changes once set up. Pinning an already pinned texture does
    /// nothing.
    pub fn set_permanent_texture_state(
        &mut self,
        texture: &Arc<Texture>,
        state: ResourceStates,
    ) -> Result<(), Box<ValidationError>> {
        validate_required_texture_state(state)?;

        let desc = texture.desc();
        let mut record = texture.state();

        if record.permanent_transition {
            return Ok(());
        }

        let subresources = TextureSubresourceSet::new(0, desc.mip_levels, 0, desc.array_size);
        let pending: SmallVec<[(u32, u32, ResourceStates); 16]> = subresources
            .iter()
            .filter_map(|(mip_level, array_slice)| {
                let prior_state =
                    record.subresource_state(desc.subresource_index(mip_level, array_slice));

                (prior_state != state).then_some((mip_level, array_slice, prior_state))
            })
            .collect();

        pin_texture(&mut record, state);
        drop(record);

        tracing::debug!(
            texture = %desc.debug_name,
            ?state,
            transitions = pending.len(),
            "pinned texture to a permanent state",
        );

        if !pending.is_empty() {
            self.push_texture_barriers(texture, subresources, &pending, state);
        }

        Ok(())
    }

    /// Transitions `buffer` to `state` one last time and pins it there.
    pub fn set_permanent_buffer_state(
        &mut self,
        buffer: &Arc<Buffer>,
        state: ResourceStates,
    ) -> Result<(), Box<ValidationError>> {
        validate_required_state(state)?;

        let mut record = buffer.state();

        if record.permanent_transition {
            return Ok(());
        }

        let prior_state = record.get();
        record.set(state);
        record.permanent_transition = true;
        record.state_initialized = true;
        drop(record);

        tracing::debug!(
            buffer = %buffer.desc().debug_name,
            ?state,
            "pinned buffer to a permanent state",
        );

        if prior_state != state {
            self.buffer_barriers.push(BufferBarrier {
                buffer: buffer.clone(),
                state_before: prior_state,
                state_after: state,
            });
        }

        Ok(())
    }

    /// Declares that `subresources` of `texture` already are in `state`, without placing any
    /// barrier. Use this when the state is known by external contract, for example for a texture
    /// that was just imported from another API.
    pub fn begin_tracking_texture_state(
        &mut self,
        texture: &Arc<Texture>,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) -> Result<(), Box<ValidationError>> {
        validate_required_state(state)?;

        let desc = texture.desc();
        let subresources = subresources
            .resolve(desc, false)
            .map_err(|err| err.add_context("subresources"))?;
        let mut record = texture.state();

        if record.permanent_transition {
            return Ok(());
        }

        record.set_range(&subresources, desc.array_size, state);
        record.reset_uav_barriers_placed(&subresources, desc.array_size);
        record.state_initialized = true;

        Ok(())
    }

    /// Declares that `buffer` already is in `state`, without placing any barrier.
    pub fn begin_tracking_buffer_state(
        &mut self,
        buffer: &Arc<Buffer>,
        state: ResourceStates,
    ) -> Result<(), Box<ValidationError>> {
        validate_required_state(state)?;

        let mut record = buffer.state();

        if record.permanent_transition {
            return Ok(());
        }

        record.set(state);
        record.state_initialized = true;
        record.uav_barrier_placed = false;

        Ok(())
    }

    /// Enables or disables UAV hazard barriers between back-to-back unordered accesses of
    /// `texture`. Disabling them is only correct if the accesses don't overlap.
    pub fn set_enable_uav_barriers_for_texture(&mut self, texture: &Texture, enable: bool) {
        let mut record = texture.state();
        record.enable_uav_barriers = enable;
        record.reset_all_uav_barriers_placed();
    }

    pub fn set_enable_uav_barriers_for_buffer(&mut self, buffer: &Buffer, enable: bool) {
        let mut record = buffer.state();
        record.enable_uav_barriers = enable;
        record.uav_barrier_placed = false;
    }

    /// Returns the last known state of one subresource of `texture`.
    pub fn texture_subresource_state(
        &self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
    ) -> Result<ResourceStates, Box<ValidationError>> {
        let desc = texture.desc();

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

        Ok(texture
            .state()
            .subresource_state(desc.subresource_index(mip_level, array_slice)))
    }

    /// Returns the last known state of `buffer`.
    #[inline]
    pub fn buffer_state(&self, buffer: &Buffer) -> ResourceStates {
        buffer.state().get()
    }

    /// Transitions every resource with `keep_initial_state` that was used since the last call
    /// back to its initial state.
    pub fn restore_initial_states(&mut self) {
        let textures: SmallVec<[_; 8]> = self
            .initial_state_textures
            .drain()
            .map(|(_, texture)| texture)
            .collect();
        let buffers: SmallVec<[_; 8]> = self
            .initial_state_buffers
            .drain()
            .map(|(_, buffer)| buffer)
            .collect();

        for texture in &textures {
            if texture.state().permanent_transition {
                continue;
            }

            let desc = texture.desc();
            let subresources = TextureSubresourceSet::new(0, desc.mip_levels, 0, desc.array_size);
            self.require_texture_state_resolved(texture, subresources, desc.initial_state);
        }

        for buffer in &buffers {
            if buffer.state().permanent_transition {
                continue;
            }

            self.require_buffer_state_unchecked(buffer, buffer.desc().initial_state);
        }

        // The requests above register the resources again.
        self.initial_state_textures.clear();
        self.initial_state_buffers.clear();

        if !textures.is_empty() || !buffers.is_empty() {
            tracing::debug!(
                textures = textures.len(),
                buffers = buffers.len(),
                "restored initial resource states",
            );
        }
    }

    /// Discards the pending transitions.
    ///
    /// This is also how the pending list is emptied after the transitions were submitted. Either
    /// way, the next unordered access to a resource that had a transition into an unordered-access
    /// state pending is separated from the previous one by a new UAV hazard barrier.
    pub fn clear_barriers(&mut self) {
        for barrier in &self.texture_barriers {
            if barrier.state_after.is_unordered_access() {
                let array_size = barrier.texture.desc().array_size;
                barrier
                    .texture
                    .state()
                    .reset_uav_barriers_placed(&barrier.subresources, array_size);
            }
        }

        for barrier in &self.buffer_barriers {
            if barrier.state_after.is_unordered_access() {
                barrier.buffer.state().uav_barrier_placed = false;
            }
        }

        self.texture_barriers.clear();
        self.buffer_barriers.clear();
    }
}

fn pin_texture(record: &mut TextureState, state: ResourceStates) {
    record.set_all(state);
    record.permanent_transition = true;
    record.state_initialized = true;
}

fn validate_required_state(state: ResourceStates) -> Result<(), Box<ValidationError>> {
    if state.is_unknown() {
        return Err(ValidationError::new(
            "state",
            "is `ResourceStates::UNKNOWN`, which a resource can't be transitioned to",
        ));
    }

    Ok(())
}

fn validate_required_texture_state(state: ResourceStates) -> Result<(), Box<ValidationError>> {
    validate_required_state(state)?;

    if !state.constrains_texture_layout() {
        return Err(ValidationError::new(
            "state",
            format!(
                "`{state:?}` is not a state that a texture can be transitioned to; it must \
                include a state in `ResourceStates::TEXTURE_LAYOUT_STATES`",
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferDesc, TextureDesc, TextureDimension};

    fn texture(mip_levels: u32, array_size: u32) -> Arc<Texture> {
        Texture::from_handle(
            0x1000,
            TextureDesc {
                dimension: if array_size > 1 {
                    TextureDimension::Texture2DArray
                } else {
                    TextureDimension::Texture2D
                },
                width: 256,
                height: 256,
                array_size,
                mip_levels,
                debug_name: "test texture".into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn buffer() -> Arc<Buffer> {
        Buffer::from_handle(
            0x2000,
            BufferDesc {
                byte_size: 1024,
                debug_name: "test buffer".into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn state_of(tracker: &StateTracker, texture: &Texture, mip_level: u32) -> ResourceStates {
        tracker
            .texture_subresource_state(texture, 0, mip_level)
            .unwrap()
    }

    #[test]
    fn mip_range_transitions() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(4, 1);

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::mip_levels(0..4),
                ResourceStates::SHADER_RESOURCE,
            )
            .unwrap();

        assert_eq!(tracker.texture_barriers().len(), 1);
        let barrier = &tracker.texture_barriers()[0];
        assert_eq!(barrier.state_before, ResourceStates::UNKNOWN);
        assert_eq!(barrier.state_after, ResourceStates::SHADER_RESOURCE);
        assert_eq!(barrier.subresources, TextureSubresourceSet::new(0, 4, 0, 1));
        assert!(barrier.entire_texture);

        tracker.clear_barriers();

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::mip_levels(0..2),
                ResourceStates::UNORDERED_ACCESS,
            )
            .unwrap();

        assert_eq!(tracker.texture_barriers().len(), 1);
        let barrier = &tracker.texture_barriers()[0];
        assert_eq!(barrier.state_before, ResourceStates::SHADER_RESOURCE);
        assert_eq!(barrier.state_after, ResourceStates::UNORDERED_ACCESS);
        assert_eq!(barrier.subresources, TextureSubresourceSet::new(0, 2, 0, 1));
        assert!(!barrier.entire_texture);

        assert_eq!(state_of(&tracker, &texture, 0), ResourceStates::UNORDERED_ACCESS);
        assert_eq!(state_of(&tracker, &texture, 1), ResourceStates::UNORDERED_ACCESS);
        assert_eq!(state_of(&tracker, &texture, 2), ResourceStates::SHADER_RESOURCE);
        assert_eq!(state_of(&tracker, &texture, 3), ResourceStates::SHADER_RESOURCE);
    }

    #[test]
    fn second_request_is_a_no_op() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(3, 2);

        for _ in 0..2 {
            tracker
                .require_texture_state(
                    &texture,
                    TextureSubresourceSet::ALL,
                    ResourceStates::COPY_DEST,
                )
                .unwrap();
        }

        assert_eq!(tracker.texture_barriers().len(), 1);
    }

    #[test]
    fn coverage() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(5, 4);
        let subresources = TextureSubresourceSet::new(1, 3, 1, 2);

        tracker
            .require_texture_state(&texture, subresources, ResourceStates::RENDER_TARGET)
            .unwrap();
        tracker.clear_barriers();

        for mip_level in 0..5 {
            for array_slice in 0..4 {
                let state = tracker
                    .texture_subresource_state(&texture, array_slice, mip_level)
                    .unwrap();
                let inside = (1..4).contains(&mip_level) && (1..3).contains(&array_slice);

                if inside {
                    assert_eq!(state, ResourceStates::RENDER_TARGET);
                } else {
                    assert_eq!(state, ResourceStates::UNKNOWN);
                }
            }
        }
    }

    #[test]
    fn mixed_prior_states_are_not_coalesced() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(3, 1);

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::single(1, 0),
                ResourceStates::COPY_SOURCE,
            )
            .unwrap();
        tracker.clear_barriers();

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::SHADER_RESOURCE,
            )
            .unwrap();

        let barriers = tracker.texture_barriers();
        assert_eq!(barriers.len(), 3);
        assert_eq!(barriers[0].subresources, TextureSubresourceSet::single(0, 0));
        assert_eq!(barriers[0].state_before, ResourceStates::UNKNOWN);
        assert_eq!(barriers[1].subresources, TextureSubresourceSet::single(1, 0));
        assert_eq!(barriers[1].state_before, ResourceStates::COPY_SOURCE);
        assert_eq!(barriers[2].subresources, TextureSubresourceSet::single(2, 0));
        assert!(barriers.iter().all(|b| !b.entire_texture));
    }

    #[test]
    fn partially_matching_range_emits_only_changed_subresources() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(4, 1);

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::mip_levels(0..2),
                ResourceStates::SHADER_RESOURCE,
            )
            .unwrap();
        tracker.clear_barriers();

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::SHADER_RESOURCE,
            )
            .unwrap();

        let barriers = tracker.texture_barriers();
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].subresources, TextureSubresourceSet::single(2, 0));
        assert_eq!(barriers[1].subresources, TextureSubresourceSet::single(3, 0));
    }

    #[test]
    fn uav_hazard_barriers() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(2, 1);

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::UNORDERED_ACCESS,
            )
            .unwrap();

        // The transition into the unordered-access state already covers the hazard.
        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::UNORDERED_ACCESS,
            )
            .unwrap();
        assert_eq!(tracker.texture_barriers().len(), 1);

        tracker.clear_barriers();

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::UNORDERED_ACCESS,
            )
            .unwrap();
        assert_eq!(tracker.texture_barriers().len(), 1);
        let barrier = &tracker.texture_barriers()[0];
        assert!(barrier.is_uav_barrier());
        assert!(barrier.entire_texture);

        // Only one hazard barrier until the next commit.
        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::UNORDERED_ACCESS,
            )
            .unwrap();
        assert_eq!(tracker.texture_barriers().len(), 1);
    }

    #[test]
    fn uav_barriers_disabled() {
        let mut tracker = StateTracker::new(false);
        let buffer = buffer();

        tracker
            .require_buffer_state(&buffer, ResourceStates::UNORDERED_ACCESS)
            .unwrap();
        tracker.clear_barriers();

        tracker.set_enable_uav_barriers_for_buffer(&buffer, false);
        tracker
            .require_buffer_state(&buffer, ResourceStates::UNORDERED_ACCESS)
            .unwrap();
        assert!(!tracker.has_barriers());

        tracker.set_enable_uav_barriers_for_buffer(&buffer, true);
        tracker
            .require_buffer_state(&buffer, ResourceStates::UNORDERED_ACCESS)
            .unwrap();
        assert_eq!(tracker.buffer_barriers().len(), 1);
        assert!(tracker.buffer_barriers()[0].is_uav_barrier());
    }

    #[test]
    fn buffer_transitions() {
        let mut tracker = StateTracker::new(false);
        let buffer = buffer();

        tracker
            .require_buffer_state(&buffer, ResourceStates::COPY_DEST)
            .unwrap();
        tracker
            .require_buffer_state(&buffer, ResourceStates::COPY_DEST)
            .unwrap();
        tracker
            .require_buffer_state(&buffer, ResourceStates::VERTEX_BUFFER)
            .unwrap();

        let barriers = tracker.buffer_barriers();
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].state_before, ResourceStates::UNKNOWN);
        assert_eq!(barriers[0].state_after, ResourceStates::COPY_DEST);
        assert_eq!(barriers[1].state_before, ResourceStates::COPY_DEST);
        assert_eq!(barriers[1].state_after, ResourceStates::VERTEX_BUFFER);
        assert_eq!(tracker.buffer_state(&buffer), ResourceStates::VERTEX_BUFFER);
    }

    #[test]
    fn permanent_texture_state() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(2, 1);

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::single(0, 0),
                ResourceStates::COPY_DEST,
            )
            .unwrap();
        tracker.clear_barriers();

        tracker
            .set_permanent_texture_state(&texture, ResourceStates::SHADER_RESOURCE)
            .unwrap();
        assert_eq!(tracker.texture_barriers().len(), 2);
        tracker.clear_barriers();

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::RENDER_TARGET,
            )
            .unwrap();
        tracker
            .begin_tracking_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::COPY_SOURCE,
            )
            .unwrap();
        tracker
            .set_permanent_texture_state(&texture, ResourceStates::PRESENT)
            .unwrap();

        assert!(!tracker.has_barriers());
        assert_eq!(state_of(&tracker, &texture, 0), ResourceStates::SHADER_RESOURCE);
        assert_eq!(state_of(&tracker, &texture, 1), ResourceStates::SHADER_RESOURCE);
    }

    #[test]
    fn pinned_texture_requests_are_still_validated() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(2, 1);

        tracker
            .set_permanent_texture_state(&texture, ResourceStates::SHADER_RESOURCE)
            .unwrap();
        tracker.clear_barriers();

        let err = tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::single(2, 0),
                ResourceStates::SHADER_RESOURCE,
            )
            .unwrap_err();
        assert_eq!(err.context, "subresources.base_mip_level");

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::single(1, 0),
                ResourceStates::COPY_DEST,
            )
            .unwrap();
        assert!(!tracker.has_barriers());
    }

    #[test]
    fn uav_hazard_barriers_per_subresource() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(2, 1);

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::UNORDERED_ACCESS,
            )
            .unwrap();
        tracker.clear_barriers();

        // A hazard barrier on one mip level doesn't synchronize the other one.
        for mip_level in 0..2 {
            tracker
                .require_texture_state(
                    &texture,
                    TextureSubresourceSet::single(mip_level, 0),
                    ResourceStates::UNORDERED_ACCESS,
                )
                .unwrap();
        }

        let barriers = tracker.texture_barriers();
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].subresources, TextureSubresourceSet::single(0, 0));
        assert_eq!(barriers[1].subresources, TextureSubresourceSet::single(1, 0));
        assert!(barriers.iter().all(TextureBarrier::is_uav_barrier));

        // Both are covered until the next commit.
        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::UNORDERED_ACCESS,
            )
            .unwrap();
        assert_eq!(tracker.texture_barriers().len(), 2);

        // After the commit, every subresource gets one hazard barrier again.
        tracker.clear_barriers();
        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::single(1, 0),
                ResourceStates::UNORDERED_ACCESS,
            )
            .unwrap();
        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::UNORDERED_ACCESS,
            )
            .unwrap();

        let barriers = tracker.texture_barriers();
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].subresources, TextureSubresourceSet::single(1, 0));
        assert_eq!(barriers[1].subresources, TextureSubresourceSet::single(0, 0));
    }

    #[test]
    fn texture_states_without_a_layout() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(1, 1);

        for state in [
            ResourceStates::COMMON,
            ResourceStates::STREAM_OUT,
            ResourceStates::ACCEL_STRUCT_READ,
        ] {
            let err = tracker
                .require_texture_state(&texture, TextureSubresourceSet::ALL, state)
                .unwrap_err();
            assert_eq!(err.context, "state");

            let err = tracker
                .set_permanent_texture_state(&texture, state)
                .unwrap_err();
            assert_eq!(err.context, "state");
        }

        assert!(!tracker.has_barriers());
        assert!(!texture.state().is_permanent());

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::COMMON | ResourceStates::COPY_SOURCE,
            )
            .unwrap();
        assert!(tracker.has_barriers());
    }

    #[test]
    fn permanent_buffer_state() {
        let mut tracker = StateTracker::new(false);
        let buffer = buffer();

        tracker
            .set_permanent_buffer_state(&buffer, ResourceStates::ACCEL_STRUCT_READ)
            .unwrap();
        assert_eq!(tracker.buffer_barriers().len(), 1);
        tracker.clear_barriers();

        tracker
            .require_buffer_state(&buffer, ResourceStates::COPY_DEST)
            .unwrap();

        assert!(!tracker.has_barriers());
        assert_eq!(tracker.buffer_state(&buffer), ResourceStates::ACCEL_STRUCT_READ);
    }

    #[test]
    fn begin_tracking_places_no_barrier() {
        let mut tracker = StateTracker::new(true);
        let texture = texture(2, 3);
        let buffer = buffer();

        tracker
            .begin_tracking_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::COPY_DEST,
            )
            .unwrap();
        tracker
            .begin_tracking_buffer_state(&buffer, ResourceStates::INDEX_BUFFER)
            .unwrap();
        assert!(!tracker.has_barriers());

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::SHADER_RESOURCE,
            )
            .unwrap();
        tracker
            .require_buffer_state(&buffer, ResourceStates::INDEX_BUFFER)
            .unwrap();

        assert_eq!(tracker.texture_barriers().len(), 1);
        assert_eq!(
            tracker.texture_barriers()[0].state_before,
            ResourceStates::COPY_DEST,
        );
        assert!(tracker.buffer_barriers().is_empty());
    }

    #[test]
    fn unseeded_resource_with_validation() {
        let mut tracker = StateTracker::new(true);
        let texture = texture(1, 1);
        let buffer = buffer();

        let err = tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::ALL,
                ResourceStates::SHADER_RESOURCE,
            )
            .unwrap_err();
        assert_eq!(err.context, "texture");
        assert!(err.problem.contains("test texture"));

        let err = tracker
            .require_buffer_state(&buffer, ResourceStates::SHADER_RESOURCE)
            .unwrap_err();
        assert_eq!(err.context, "buffer");

        assert!(!tracker.has_barriers());
        assert!(tracker.buffer_state(&buffer).is_unknown());
    }

    #[test]
    fn out_of_range_requests() {
        let mut tracker = StateTracker::new(false);
        let texture = texture(2, 1);

        let err = tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::single(2, 0),
                ResourceStates::SHADER_RESOURCE,
            )
            .unwrap_err();
        assert_eq!(err.context, "subresources.base_mip_level");
        assert!(!tracker.has_barriers());

        assert!(tracker.texture_subresource_state(&texture, 1, 0).is_err());
        assert!(tracker.texture_subresource_state(&texture, 0, 2).is_err());

        let err = tracker
            .require_texture_state(&texture, TextureSubresourceSet::ALL, ResourceStates::UNKNOWN)
            .unwrap_err();
        assert_eq!(err.context, "state");
    }

    #[test]
    fn restore_initial_states() {
        let mut tracker = StateTracker::new(true);
        let texture = Texture::from_handle(
            0x3000,
            TextureDesc {
                width: 4,
                height: 4,
                mip_levels: 3,
                initial_state: ResourceStates::SHADER_RESOURCE,
                keep_initial_state: true,
                ..Default::default()
            },
        )
        .unwrap();

        tracker
            .require_texture_state(
                &texture,
                TextureSubresourceSet::single(1, 0),
                ResourceStates::COPY_DEST,
            )
            .unwrap();
        tracker.clear_barriers();

        tracker.restore_initial_states();

        assert_eq!(tracker.texture_barriers().len(), 1);
        let barrier = &tracker.texture_barriers()[0];
        assert_eq!(barrier.subresources, TextureSubresourceSet::single(1, 0));
        assert_eq!(barrier.state_before, ResourceStates::COPY_DEST);
        assert_eq!(barrier.state_after, ResourceStates::SHADER_RESOURCE);

        tracker.clear_barriers();
        tracker.restore_initial_states();
        assert!(!tracker.has_barriers());
    }
}
