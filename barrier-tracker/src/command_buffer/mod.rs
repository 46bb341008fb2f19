//! Recording commands with automatic state tracking.

pub use self::commands::ClearValue;
use crate::{
    backend::Backend, ComputeState, Framebuffer, GraphicsState, MeshletState, MessageCallback,
    MessageSeverity, RayTracingState, StateTracker, TracingMessageCallback, ValidationError,
};
use std::{fmt, sync::Arc};

mod commands;

/// Parameters to create a new [`CommandList`].
#[derive(Clone)]
pub struct CommandListCreateInfo {
    /// Whether misuse is detected and reported through the message callback. This includes using
    /// a resource whose state was never seeded, and recording into a command list that isn't
    /// open.
    ///
    /// The default value is `true` in debug builds and `false` otherwise.
    pub enable_validation: bool,

    /// Whether the state setters (like [`CommandList::set_graphics_state`]) transition the bound
    /// resources automatically.
    ///
    /// The default value is `true`.
    pub enable_automatic_barriers: bool,

    /// The callback that diagnostics are sent to.
    ///
    /// The default value is `None`, which forwards diagnostics to [`tracing`].
    pub message_callback: Option<Arc<dyn MessageCallback>>,

    pub _ne: crate::NonExhaustive,
}

impl Default for CommandListCreateInfo {
    #[inline]
    fn default() -> Self {
        CommandListCreateInfo {
            enable_validation: cfg!(debug_assertions),
            enable_automatic_barriers: true,
            message_callback: None,
            _ne: crate::NE,
        }
    }
}

impl fmt::Debug for CommandListCreateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandListCreateInfo")
            .field("enable_validation", &self.enable_validation)
            .field("enable_automatic_barriers", &self.enable_automatic_barriers)
            .field("message_callback", &self.message_callback.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Initial,
    Open,
    Closed,
}

/// A command list that tracks the states of the resources it touches and records the barriers
/// between them into a native [`Backend`].
///
/// Invalid requests don't return errors. They are reported through the [`MessageCallback`] and
/// the request is skipped.
pub struct CommandList<B> {
    backend: B,
    state_tracker: StateTracker,
    lifecycle: Lifecycle,
    enable_validation: bool,
    enable_automatic_barriers: bool,
    message_callback: Arc<dyn MessageCallback>,

    // Set whenever the cached binding states no longer reflect what was bound, which forces the
    // next state setter to re-evaluate every binding.
    binding_states_dirty: bool,
    render_pass: Option<Arc<Framebuffer>>,
    current_graphics_state: GraphicsState,
    current_compute_state: ComputeState,
    current_meshlet_state: MeshletState,
    current_ray_tracing_state: RayTracingState,
}

impl<B: Backend> CommandList<B> {
    pub fn new(backend: B, create_info: CommandListCreateInfo) -> Self {
        let CommandListCreateInfo {
            enable_validation,
            enable_automatic_barriers,
            message_callback,
            _ne: _,
        } = create_info;

        CommandList {
            backend,
            state_tracker: StateTracker::new(enable_validation),
            lifecycle: Lifecycle::Initial,
            enable_validation,
            enable_automatic_barriers,
            message_callback: message_callback.unwrap_or_else(|| Arc::new(TracingMessageCallback)),
            binding_states_dirty: true,
            render_pass: None,
            current_graphics_state: GraphicsState::default(),
            current_compute_state: ComputeState::default(),
            current_meshlet_state: MeshletState::default(),
            current_ray_tracing_state: RayTracingState::default(),
        }
    }

    /// Returns the backend.
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the backend.
    ///
    /// Recording into the native command buffer behind the backend's back is allowed, but the
    /// states of the resources it touches have to be kept up to date with
    /// [`begin_tracking_texture_state`](Self::begin_tracking_texture_state) and friends.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Returns whether the command list is open for recording.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.lifecycle == Lifecycle::Open
    }

    /// Begins a new recording.
    ///
    /// Every binding is re-evaluated by the first state setter of the recording. Barriers left
    /// pending from before the recording began are discarded.
    pub fn open(&mut self) -> &mut Self {
        if self.enable_validation && self.lifecycle == Lifecycle::Open {
            self.report(ValidationError::new(
                "",
                "`open` was called on a command list that is already open",
            ));

            return self;
        }

        self.state_tracker.clear_barriers();
        self.reset_binding_states();
        self.lifecycle = Lifecycle::Open;

        self
    }

    /// Ends the recording.
    ///
    /// Every resource with `keep_initial_state` that was used during the recording is transitioned
    /// back to its initial state, and all pending barriers are committed.
    pub fn close(&mut self) -> &mut Self {
        if !self.ensure_open("close") {
            return self;
        }

        self.end_render_pass();
        self.state_tracker.restore_initial_states();
        self.commit_barriers_internal();
        self.reset_binding_states();
        self.lifecycle = Lifecycle::Closed;

        self
    }

    /// Forgets every cached binding state and ends the current render pass. The next state setter
    /// re-evaluates every binding.
    pub fn clear_state(&mut self) -> &mut Self {
        if !self.ensure_open("clear_state") {
            return self;
        }

        self.end_render_pass();
        self.reset_binding_states();

        self
    }

    fn reset_binding_states(&mut self) {
        self.current_graphics_state = GraphicsState::default();
        self.current_compute_state = ComputeState::default();
        self.current_meshlet_state = MeshletState::default();
        self.current_ray_tracing_state = RayTracingState::default();
        self.binding_states_dirty = true;
    }

    fn begin_render_pass(&mut self, framebuffer: &Arc<Framebuffer>) {
        self.end_render_pass();

        self.backend.begin_render_pass(framebuffer);
        self.render_pass = Some(framebuffer.clone());
    }

    /// Ends the current render pass, if any. Barriers can't be recorded inside of one.
    fn end_render_pass(&mut self) {
        if self.render_pass.take().is_some() {
            self.backend.end_render_pass();

            // The framebuffer has to be bound again, and its attachments re-evaluated.
            self.current_graphics_state.framebuffer = None;
            self.current_meshlet_state.framebuffer = None;
        }
    }

    /// Returns `false` and reports an error if validation is enabled and the command list isn't
    /// open.
    fn ensure_open(&self, operation: &str) -> bool {
        if self.enable_validation && self.lifecycle != Lifecycle::Open {
            self.report(ValidationError::new(
                "",
                format!("`{operation}` was called on a command list that is not open"),
            ));

            return false;
        }

        true
    }

    fn report(&self, err: Box<ValidationError>) {
        self.message_callback
            .message(MessageSeverity::Error, &err.to_string());
    }
}

impl<B: fmt::Debug> fmt::Debug for CommandList<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandList")
            .field("backend", &self.backend)
            .field("state_tracker", &self.state_tracker)
            .field("lifecycle", &self.lifecycle)
            .field("enable_validation", &self.enable_validation)
            .field("enable_automatic_barriers", &self.enable_automatic_barriers)
            .field("render_pass", &self.render_pass)
            .finish_non_exhaustive()
    }
}
