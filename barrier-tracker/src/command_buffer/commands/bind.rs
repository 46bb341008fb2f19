use crate::{
    backend::Backend,
    binding::{array_difference_mask, option_ptr_eq, BindingResource},
    command_buffer::CommandList,
    BindingSet, ComputeState, Framebuffer, GraphicsState, MeshletState, RayTracingState,
    ResourceStates, ValidationError, MAX_BINDING_SETS, MAX_VERTEX_BUFFERS,
};
use std::sync::Arc;

/// # Commands to bind state
impl<B: Backend> CommandList<B> {
    /// Sets the state for the draws that follow.
    ///
    /// Unless automatic barriers are disabled, every resource referenced by a binding that
    /// changed since the previous state setter is transitioned, and binding sets with UAV
    /// bindings are always re-evaluated. The pending barriers are then committed and a render
    /// pass on the framebuffer is begun if it isn't already active.
    pub fn set_graphics_state(&mut self, state: &GraphicsState) -> &mut Self {
        if !self.ensure_open("set_graphics_state") {
            return self;
        }

        if let Err(err) = validate_bindings(&state.bindings).and_then(|()| {
            if state.vertex_buffers.len() > MAX_VERTEX_BUFFERS {
                return Err(ValidationError::new(
                    "vertex_buffers",
                    "has more than `MAX_VERTEX_BUFFERS` elements",
                ));
            }

            Ok(())
        }) {
            self.report(err.add_context("set_graphics_state.state"));
            return self;
        }

        if self.enable_automatic_barriers {
            self.insert_graphics_resource_barriers(state);
        }

        let framebuffer_changed = !option_ptr_eq(
            self.current_graphics_state.framebuffer.as_ref(),
            state.framebuffer.as_ref(),
        );

        if framebuffer_changed || self.state_tracker.has_barriers() {
            self.end_render_pass();
        }

        self.commit_barriers();

        if self.render_pass.is_none() {
            if let Some(framebuffer) = &state.framebuffer {
                self.begin_render_pass(framebuffer);
            }
        }

        self.current_graphics_state = state.clone();
        self.current_compute_state = ComputeState::default();
        self.current_meshlet_state = MeshletState::default();
        self.current_ray_tracing_state = RayTracingState::default();

        self
    }

    /// Sets the state for the dispatches that follow. Ends the current render pass.
    pub fn set_compute_state(&mut self, state: &ComputeState) -> &mut Self {
        if !self.ensure_open("set_compute_state") {
            return self;
        }

        if let Err(err) = validate_bindings(&state.bindings) {
            self.report(err.add_context("set_compute_state.state"));
            return self;
        }

        self.end_render_pass();

        if self.enable_automatic_barriers {
            self.insert_compute_resource_barriers(state);
        }

        self.commit_barriers();

        self.current_graphics_state = GraphicsState::default();
        self.current_compute_state = state.clone();
        self.current_meshlet_state = MeshletState::default();
        self.current_ray_tracing_state = RayTracingState::default();

        self
    }

    /// Sets the state for the mesh shader dispatches that follow.
    pub fn set_meshlet_state(&mut self, state: &MeshletState) -> &mut Self {
        if !self.ensure_open("set_meshlet_state") {
            return self;
        }

        if let Err(err) = validate_bindings(&state.bindings) {
            self.report(err.add_context("set_meshlet_state.state"));
            return self;
        }

        if self.enable_automatic_barriers {
            self.insert_meshlet_resource_barriers(state);
        }

        let framebuffer_changed = !option_ptr_eq(
            self.current_meshlet_state.framebuffer.as_ref(),
            state.framebuffer.as_ref(),
        );

        if framebuffer_changed || self.state_tracker.has_barriers() {
            self.end_render_pass();
        }

        self.commit_barriers();

        if self.render_pass.is_none() {
            if let Some(framebuffer) = &state.framebuffer {
                self.begin_render_pass(framebuffer);
            }
        }

        self.current_graphics_state = GraphicsState::default();
        self.current_compute_state = ComputeState::default();
        self.current_meshlet_state = state.clone();
        self.current_ray_tracing_state = RayTracingState::default();

        self
    }

    /// Sets the state for the ray tracing dispatches that follow. Ends the current render pass.
    pub fn set_ray_tracing_state(&mut self, state: &RayTracingState) -> &mut Self {
        if !self.ensure_open("set_ray_tracing_state") {
            return self;
        }

        if let Err(err) = validate_bindings(&state.bindings) {
            self.report(err.add_context("set_ray_tracing_state.state"));
            return self;
        }

        self.end_render_pass();

        if self.enable_automatic_barriers {
            self.insert_ray_tracing_resource_barriers(state);
        }

        self.commit_barriers();

        self.current_graphics_state = GraphicsState::default();
        self.current_compute_state = ComputeState::default();
        self.current_meshlet_state = MeshletState::default();
        self.current_ray_tracing_state = state.clone();

        self
    }

    /// Requires every resource referenced by `binding_set` to be in the state that its binding
    /// accesses it in. Does nothing for a bindless set.
    pub fn set_resource_states_for_binding_set(&mut self, binding_set: &BindingSet) -> &mut Self {
        if self.ensure_open("set_resource_states_for_binding_set") {
            self.require_binding_set_states(binding_set);
        }

        self
    }

    /// Requires the color attachments of `framebuffer` to be render targets, and the depth
    /// attachment to be writable or, if it is read-only, readable.
    pub fn set_resource_states_for_framebuffer(&mut self, framebuffer: &Framebuffer) -> &mut Self {
        if self.ensure_open("set_resource_states_for_framebuffer") {
            self.require_framebuffer_states(framebuffer);
        }

        self
    }

    fn require_binding_set_states(&mut self, binding_set: &BindingSet) {
        for item in binding_set.bindings_that_need_transitions() {
            let Some(state) = item.ty.required_state() else {
                continue;
            };

            match &item.resource {
                BindingResource::Texture(texture) => {
                    self.require_texture_state(texture, item.subresources, state);
                }
                BindingResource::Buffer(buffer) => {
                    self.require_buffer_state(buffer, state);
                }
                BindingResource::AccelStruct(accel_struct) => {
                    self.require_buffer_state(accel_struct.data_buffer(), state);
                }
                BindingResource::None => {}
            }
        }
    }

    fn require_framebuffer_states(&mut self, framebuffer: &Framebuffer) {
        for attachment in framebuffer.color_attachments() {
            self.require_texture_state(
                &attachment.texture,
                attachment.subresources,
                ResourceStates::RENDER_TARGET,
            );
        }

        if let Some(attachment) = framebuffer.depth_attachment() {
            let state = if attachment.is_read_only {
                ResourceStates::DEPTH_READ
            } else {
                ResourceStates::DEPTH_WRITE
            };

            self.require_texture_state(&attachment.texture, attachment.subresources, state);
        }
    }

    fn insert_resource_barriers_for_binding_sets(
        &mut self,
        bindings: &[Arc<BindingSet>],
        update_mask: u32,
    ) {
        for (index, binding_set) in bindings.iter().enumerate() {
            if binding_set.is_bindless() {
                continue;
            }

            // Unordered accesses need a hazard barrier even if the set itself didn't change.
            if update_mask & (1 << index) != 0 || binding_set.has_uav_bindings() {
                self.require_binding_set_states(binding_set);
            }
        }
    }

    fn binding_update_mask(&self, new: &[Arc<BindingSet>], old: &[Arc<BindingSet>]) -> u32 {
        if self.binding_states_dirty {
            !0
        } else {
            array_difference_mask(new, old)
        }
    }

    fn insert_graphics_resource_barriers(&mut self, state: &GraphicsState) {
        let current = &self.current_graphics_state;
        let dirty = self.binding_states_dirty;

        let update_mask = self.binding_update_mask(&state.bindings, &current.bindings);
        let index_buffer_changed = dirty
            || !option_ptr_eq(
                state.index_buffer.as_ref().map(|binding| &binding.buffer),
                current.index_buffer.as_ref().map(|binding| &binding.buffer),
            );
        let vertex_buffers_changed = dirty || state.vertex_buffers != current.vertex_buffers;
        let framebuffer_changed = dirty
            || !option_ptr_eq(state.framebuffer.as_ref(), current.framebuffer.as_ref());
        let indirect_params_changed = dirty
            || !option_ptr_eq(
                state.indirect_params.as_ref(),
                current.indirect_params.as_ref(),
            );
        let indirect_count_params_changed = dirty
            || !option_ptr_eq(
                state.indirect_count_params.as_ref(),
                current.indirect_count_params.as_ref(),
            );

        self.insert_resource_barriers_for_binding_sets(&state.bindings, update_mask);

        if let Some(index_buffer) = state.index_buffer.as_ref().filter(|_| index_buffer_changed) {
            self.require_buffer_state(&index_buffer.buffer, ResourceStates::INDEX_BUFFER);
        }

        if vertex_buffers_changed {
            for vertex_buffer in &state.vertex_buffers {
                self.require_buffer_state(&vertex_buffer.buffer, ResourceStates::VERTEX_BUFFER);
            }
        }

        if let Some(framebuffer) = state.framebuffer.as_ref().filter(|_| framebuffer_changed) {
            self.require_framebuffer_states(framebuffer);
        }

        if let Some(buffer) = state.indirect_params.as_ref().filter(|_| indirect_params_changed) {
            self.require_buffer_state(buffer, ResourceStates::INDIRECT_ARGUMENT);
        }

        if let Some(buffer) = state
            .indirect_count_params
            .as_ref()
            .filter(|_| indirect_count_params_changed)
        {
            self.require_buffer_state(buffer, ResourceStates::INDIRECT_ARGUMENT);
        }

        self.binding_states_dirty = false;
    }

    fn insert_compute_resource_barriers(&mut self, state: &ComputeState) {
        let current = &self.current_compute_state;

        let update_mask = self.binding_update_mask(&state.bindings, &current.bindings);
        let indirect_params_changed = self.binding_states_dirty
            || !option_ptr_eq(
                state.indirect_params.as_ref(),
                current.indirect_params.as_ref(),
            );

        self.insert_resource_barriers_for_binding_sets(&state.bindings, update_mask);

        if let Some(buffer) = state.indirect_params.as_ref().filter(|_| indirect_params_changed) {
            self.require_buffer_state(buffer, ResourceStates::INDIRECT_ARGUMENT);
        }

        self.binding_states_dirty = false;
    }

    fn insert_meshlet_resource_barriers(&mut self, state: &MeshletState) {
        let current = &self.current_meshlet_state;
        let dirty = self.binding_states_dirty;

        let update_mask = self.binding_update_mask(&state.bindings, &current.bindings);
        let framebuffer_changed = dirty
            || !option_ptr_eq(state.framebuffer.as_ref(), current.framebuffer.as_ref());
        let indirect_params_changed = dirty
            || !option_ptr_eq(
                state.indirect_params.as_ref(),
                current.indirect_params.as_ref(),
            );

        self.insert_resource_barriers_for_binding_sets(&state.bindings, update_mask);

        if let Some(framebuffer) = state.framebuffer.as_ref().filter(|_| framebuffer_changed) {
            self.require_framebuffer_states(framebuffer);
        }

        if let Some(buffer) = state.indirect_params.as_ref().filter(|_| indirect_params_changed) {
            self.require_buffer_state(buffer, ResourceStates::INDIRECT_ARGUMENT);
        }

        self.binding_states_dirty = false;
    }

    fn insert_ray_tracing_resource_barriers(&mut self, state: &RayTracingState) {
        let update_mask =
            self.binding_update_mask(&state.bindings, &self.current_ray_tracing_state.bindings);

        self.insert_resource_barriers_for_binding_sets(&state.bindings, update_mask);

        self.binding_states_dirty = false;
    }
}

fn validate_bindings(bindings: &[Arc<BindingSet>]) -> Result<(), Box<ValidationError>> {
    if bindings.len() > MAX_BINDING_SETS {
        return Err(ValidationError::new(
            "bindings",
            "has more than `MAX_BINDING_SETS` elements",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        command_buffer::tests::{buffer, command_list, texture, Event},
        BindingSet, BindingSetItem, ComputeState, Format, Framebuffer, FramebufferAttachment,
        GraphicsState, IndexBufferBinding, MeshletState, RayTracingState, ResourceStates, Texture,
        TextureDesc, TextureSubresourceSet, VertexBufferBinding, MAX_BINDING_SETS,
    };
    use smallvec::smallvec;

    fn barrier_count(events: &[Event]) -> usize {
        events
            .iter()
            .map(|event| match event {
                Event::Barriers { textures, buffers } => textures.len() + buffers.len(),
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn unchanged_bindings_are_not_re_evaluated() {
        let (mut command_list, _) = command_list(false);
        let color = texture(1, 1);
        let sampled = texture(2, 3);
        let constants = buffer(3);
        let vertices = buffer(4);
        let indices = buffer(5);

        let framebuffer = Framebuffer::new([FramebufferAttachment::new(color)], None).unwrap();
        let binding_set = BindingSet::new(vec![
            BindingSetItem::texture_srv(0, sampled.clone(), TextureSubresourceSet::ALL),
            BindingSetItem::constant_buffer(1, constants.clone()),
        ])
        .unwrap();

        let state = GraphicsState {
            bindings: smallvec![binding_set],
            framebuffer: Some(framebuffer),
            index_buffer: Some(IndexBufferBinding {
                buffer: indices.clone(),
                offset: 0,
            }),
            vertex_buffers: smallvec![VertexBufferBinding {
                buffer: vertices.clone(),
                slot: 0,
                offset: 0,
            }],
            ..Default::default()
        };

        command_list.open();
        command_list.set_graphics_state(&state);

        let events = command_list.backend_mut().take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(barrier_count(&events), 5);
        assert_eq!(events[1], Event::BeginRenderPass);

        assert_eq!(command_list.buffer_state(&indices), ResourceStates::INDEX_BUFFER);
        assert_eq!(command_list.buffer_state(&vertices), ResourceStates::VERTEX_BUFFER);
        assert_eq!(command_list.buffer_state(&constants), ResourceStates::CONSTANT_BUFFER);

        // Move the sampled texture behind the command list's back. Since the binding set didn't
        // change, it is not re-evaluated and the render pass stays active.
        command_list.begin_tracking_texture_state(
            &sampled,
            TextureSubresourceSet::ALL,
            ResourceStates::COPY_DEST,
        );
        command_list.set_graphics_state(&state);
        assert!(command_list.backend_mut().take_events().is_empty());
        assert_eq!(
            command_list.texture_subresource_state(&sampled, 0, 0),
            ResourceStates::COPY_DEST,
        );

        // After `clear_state`, everything is re-evaluated.
        command_list.clear_state();
        command_list.set_graphics_state(&state);
        let events = command_list.backend_mut().take_events();
        assert_eq!(
            events,
            [
                Event::EndRenderPass,
                Event::Barriers {
                    textures: vec![(
                        2,
                        TextureSubresourceSet::new(0, 3, 0, 1),
                        ResourceStates::COPY_DEST,
                        ResourceStates::SHADER_RESOURCE,
                    )],
                    buffers: vec![],
                },
                Event::BeginRenderPass,
            ],
        );
    }

    #[test]
    fn uav_binding_sets_are_always_re_evaluated() {
        let (mut command_list, _) = command_list(false);
        let target = buffer(1);
        let binding_set =
            BindingSet::new(vec![BindingSetItem::structured_buffer_uav(0, target.clone())])
                .unwrap();
        let state = ComputeState {
            bindings: smallvec![binding_set],
            ..Default::default()
        };

        command_list.open();

        for _ in 0..3 {
            command_list.set_compute_state(&state);
        }

        assert_eq!(
            command_list.backend_mut().take_events(),
            [
                Event::Barriers {
                    textures: vec![],
                    buffers: vec![(1, ResourceStates::UNKNOWN, ResourceStates::UNORDERED_ACCESS)],
                },
                Event::Barriers {
                    textures: vec![],
                    buffers: vec![(
                        1,
                        ResourceStates::UNORDERED_ACCESS,
                        ResourceStates::UNORDERED_ACCESS,
                    )],
                },
                Event::Barriers {
                    textures: vec![],
                    buffers: vec![(
                        1,
                        ResourceStates::UNORDERED_ACCESS,
                        ResourceStates::UNORDERED_ACCESS,
                    )],
                },
            ],
        );
    }

    #[test]
    fn changed_binding_slot() {
        let (mut command_list, _) = command_list(false);
        let first = buffer(1);
        let second = buffer(2);
        let shared = BindingSet::new(vec![BindingSetItem::raw_buffer_srv(0, first)]).unwrap();
        let replacement =
            BindingSet::new(vec![BindingSetItem::typed_buffer_srv(0, second.clone())]).unwrap();

        command_list.open();
        command_list.set_ray_tracing_state(&RayTracingState {
            bindings: smallvec![shared.clone(), BindingSet::bindless()],
        });
        assert_eq!(barrier_count(&command_list.backend_mut().take_events()), 1);

        command_list.begin_tracking_buffer_state(&second, ResourceStates::COPY_DEST);
        command_list.set_ray_tracing_state(&RayTracingState {
            bindings: smallvec![shared, replacement],
        });
        assert_eq!(
            command_list.backend_mut().take_events(),
            [Event::Barriers {
                textures: vec![],
                buffers: vec![(2, ResourceStates::COPY_DEST, ResourceStates::SHADER_RESOURCE)],
            }],
        );
    }

    #[test]
    fn automatic_barriers_disabled() {
        let (mut command_list, _) = command_list(false);
        let target = buffer(1);
        let indirect = buffer(2);
        let binding_set =
            BindingSet::new(vec![BindingSetItem::raw_buffer_uav(0, target.clone())]).unwrap();

        command_list.open();
        command_list
            .set_enable_automatic_barriers(false)
            .set_buffer_state(&indirect, ResourceStates::INDIRECT_ARGUMENT)
            .set_compute_state(&ComputeState {
                bindings: smallvec![binding_set],
                indirect_params: Some(indirect),
            });

        assert!(!command_list.automatic_barriers_enabled());
        assert!(command_list.buffer_state(&target).is_unknown());
        assert_eq!(barrier_count(&command_list.backend_mut().take_events()), 1);
    }

    #[test]
    fn framebuffer_states() {
        let (mut command_list, _) = command_list(false);
        let color = texture(1, 4);
        let depth = Texture::from_handle(
            2,
            TextureDesc {
                format: Format::D24S8,
                width: 128,
                height: 128,
                ..Default::default()
            },
        )
        .unwrap();

        let framebuffer = Framebuffer::new(
            [FramebufferAttachment::new(color.clone())
                .with_subresources(TextureSubresourceSet::single(2, 0))],
            Some(FramebufferAttachment::new(depth.clone()).read_only()),
        )
        .unwrap();

        command_list.open();
        command_list.set_meshlet_state(&MeshletState {
            framebuffer: Some(framebuffer.clone()),
            ..Default::default()
        });

        assert_eq!(
            command_list.texture_subresource_state(&color, 0, 2),
            ResourceStates::RENDER_TARGET,
        );
        assert!(command_list
            .texture_subresource_state(&color, 0, 1)
            .is_unknown());
        assert_eq!(
            command_list.texture_subresource_state(&depth, 0, 0),
            ResourceStates::DEPTH_READ,
        );
        assert_eq!(
            command_list.backend_mut().take_events().last(),
            Some(&Event::BeginRenderPass),
        );

        // Same framebuffer and no barriers: the render pass continues.
        command_list.set_meshlet_state(&MeshletState {
            framebuffer: Some(framebuffer),
            ..Default::default()
        });
        assert!(command_list.backend_mut().take_events().is_empty());

        // A compute state ends it.
        command_list.set_compute_state(&ComputeState::default());
        assert_eq!(
            command_list.backend_mut().take_events(),
            [Event::EndRenderPass],
        );
    }

    #[test]
    fn too_many_binding_sets() {
        let (mut command_list, messages) = command_list(false);
        let state = ComputeState {
            bindings: (0..=MAX_BINDING_SETS)
                .map(|_| BindingSet::bindless())
                .collect(),
            ..Default::default()
        };

        command_list.open();
        command_list.set_compute_state(&state);

        let reported = messages.take();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].1.starts_with("set_compute_state.state.bindings: "));
    }
}
