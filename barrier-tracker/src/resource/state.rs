//! Persistent per-resource state records.
//!
//! A record lives as long as the resource that owns it and survives across recordings. It is only
//! mutated through the [`StateTracker`].
//!
//! [`StateTracker`]: crate::StateTracker

use crate::{ResourceStates, TextureSubresourceSet};

/// The last known states of the subresources of a texture.
#[derive(Debug)]
pub struct TextureState {
    // One entry per subresource, indexed by `mip_level * array_size + array_slice`. The length is
    // fixed when the texture is created.
    subresource_states: Box<[ResourceStates]>,
    // Whether a barrier into or within the unordered-access state was placed for the subresource
    // since its last commit. Indexed like `subresource_states`.
    uav_barriers_placed: Box<[bool]>,
    pub(crate) enable_uav_barriers: bool,
    pub(crate) permanent_transition: bool,
    pub(crate) state_initialized: bool,
}

impl TextureState {
    pub(crate) fn new(subresource_count: usize) -> Self {
        TextureState {
            subresource_states: vec![ResourceStates::UNKNOWN; subresource_count].into(),
            uav_barriers_placed: vec![false; subresource_count].into(),
            enable_uav_barriers: true,
            permanent_transition: false,
            state_initialized: false,
        }
    }

    /// Returns the last known state of the subresource at `index`.
    #[inline]
    pub fn subresource_state(&self, index: usize) -> ResourceStates {
        self.subresource_states[index]
    }

    /// Returns the number of subresources.
    #[inline]
    pub fn subresource_count(&self) -> usize {
        self.subresource_states.len()
    }

    /// Returns whether UAV hazard barriers are placed between back-to-back unordered accesses.
    #[inline]
    pub fn uav_barriers_enabled(&self) -> bool {
        self.enable_uav_barriers
    }

    /// Returns whether the texture is pinned to one state for the rest of its lifetime.
    #[inline]
    pub fn is_permanent(&self) -> bool {
        self.permanent_transition
    }

    /// Returns whether the state was ever seeded, either at creation or explicitly.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state_initialized
    }

    #[inline]
    pub(crate) fn set_subresource_state(&mut self, index: usize, state: ResourceStates) {
        self.subresource_states[index] = state;
    }

    /// Sets the state of every subresource in the resolved set `range`.
    pub(crate) fn set_range(
        &mut self,
        range: &TextureSubresourceSet,
        array_size: u32,
        state: ResourceStates,
    ) {
        for (mip_level, array_slice) in range.iter() {
            let index = mip_level as usize * array_size as usize + array_slice as usize;
            self.subresource_states[index] = state;
        }
    }

    pub(crate) fn set_all(&mut self, state: ResourceStates) {
        self.subresource_states.fill(state);
    }

    #[inline]
    pub(crate) fn uav_barrier_placed(&self, index: usize) -> bool {
        self.uav_barriers_placed[index]
    }

    #[inline]
    pub(crate) fn set_uav_barrier_placed(&mut self, index: usize, placed: bool) {
        self.uav_barriers_placed[index] = placed;
    }

    /// Forgets the UAV barriers placed for the subresources in the resolved set `range`.
    pub(crate) fn reset_uav_barriers_placed(
        &mut self,
        range: &TextureSubresourceSet,
        array_size: u32,
    ) {
        for (mip_level, array_slice) in range.iter() {
            let index = mip_level as usize * array_size as usize + array_slice as usize;
            self.uav_barriers_placed[index] = false;
        }
    }

    pub(crate) fn reset_all_uav_barriers_placed(&mut self) {
        self.uav_barriers_placed.fill(false);
    }
}

/// The last known state of a buffer.
#[derive(Debug)]
pub struct BufferState {
    state: ResourceStates,
    pub(crate) enable_uav_barriers: bool,
    pub(crate) uav_barrier_placed: bool,
    pub(crate) permanent_transition: bool,
    pub(crate) state_initialized: bool,
}

impl BufferState {
    pub(crate) fn new() -> Self {
        BufferState {
            state: ResourceStates::UNKNOWN,
            enable_uav_barriers: true,
            uav_barrier_placed: false,
            permanent_transition: false,
            state_initialized: false,
        }
    }

    /// Returns the last known state of the buffer.
    #[inline]
    pub fn get(&self) -> ResourceStates {
        self.state
    }

    #[inline]
    pub fn uav_barriers_enabled(&self) -> bool {
        self.enable_uav_barriers
    }

    #[inline]
    pub fn is_permanent(&self) -> bool {
        self.permanent_transition
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state_initialized
    }

    #[inline]
    pub(crate) fn set(&mut self, state: ResourceStates) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_record_starts_unknown() {
        let state = TextureState::new(12);

        assert_eq!(state.subresource_count(), 12);
        assert!((0..12).all(|i| state.subresource_state(i).is_unknown()));
        assert!(state.uav_barriers_enabled());
        assert!(!state.is_permanent());
        assert!(!state.is_initialized());
        assert!((0..12).all(|i| !state.uav_barrier_placed(i)));
    }

    #[test]
    fn set_range_touches_only_the_range() {
        // 3 mip levels, 4 array slices.
        let mut state = TextureState::new(12);
        let range = TextureSubresourceSet::new(1, 2, 2, 2);

        state.set_range(&range, 4, ResourceStates::COPY_DEST);

        for mip_level in 0..3 {
            for array_slice in 0..4 {
                let expected = if mip_level >= 1 && array_slice >= 2 {
                    ResourceStates::COPY_DEST
                } else {
                    ResourceStates::UNKNOWN
                };

                assert_eq!(state.subresource_state(mip_level * 4 + array_slice), expected);
            }
        }
    }

    #[test]
    fn reset_uav_barriers_placed_touches_only_the_range() {
        // 2 mip levels, 2 array slices.
        let mut state = TextureState::new(4);
        (0..4).for_each(|i| state.set_uav_barrier_placed(i, true));

        state.reset_uav_barriers_placed(&TextureSubresourceSet::new(1, 1, 0, 2), 2);

        assert!(state.uav_barrier_placed(0));
        assert!(state.uav_barrier_placed(1));
        assert!(!state.uav_barrier_placed(2));
        assert!(!state.uav_barrier_placed(3));

        state.reset_all_uav_barriers_placed();
        assert!(!state.uav_barrier_placed(0));
    }
}
