//! Lesson video player: source attachment, transport state, custom controls.
//!
//! The host forwards element events into [`VideoPlayer::handle_event`] and UI
//! gestures into the control methods; the player drives the element and hands
//! back [`PlayerOutput`]s for progress tracking.

use std::time::{Duration, Instant};

use uuid::Uuid;

use super::VideoSource;
use crate::error::MediaError;

pub const CONTROLS_HIDE_DELAY: Duration = Duration::from_millis(2500);
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(300);
pub const SEEK_OVERLAY_DURATION: Duration = Duration::from_millis(550);
pub const TAP_SEEK_SECONDS: f64 = 10.0;

/// Platform features probed when the player mounts. A missing one hides its control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub picture_in_picture: bool,
    pub remote_playback: bool,
    pub fullscreen: bool,
    /// Touch input: taps toggle the controls instead of seeking.
    pub touch: bool,
}

/// The native video element.
pub trait MediaElement {
    /// Whether HLS playlists play natively (`application/vnd.apple.mpegurl`).
    fn supports_native_hls(&self) -> bool;
    fn capabilities(&self) -> Capabilities;
    fn set_src(&mut self, url: &str);
    fn clear_src(&mut self);
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    /// NaN or 0 until metadata is known
    fn duration(&self) -> f64;
    /// End of the last buffered range
    fn buffered_end(&self) -> Option<f64>;
    fn set_muted(&mut self, muted: bool);
    fn set_fullscreen(&mut self, on: bool) -> Result<(), MediaError>;
    fn set_picture_in_picture(&mut self, on: bool) -> Result<(), MediaError>;
    fn show_remote_playback_picker(&mut self);
}

/// A software adaptive-bitrate engine attached to an element.
pub trait AdaptiveEngine {
    fn load_source(&mut self, url: &str) -> Result<(), MediaError>;
    /// Stop loading and release decode/network resources.
    fn destroy(&mut self);
}

pub trait AdaptiveEngineFactory<E> {
    fn is_supported(&self) -> bool;
    /// Construct an engine attached to `element`.
    fn create(&self, element: &mut E) -> Result<Box<dyn AdaptiveEngine>, MediaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    AdaptiveStream,
    DirectFile,
}

/// How the current source reached the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStrategy {
    NativePlaylist,
    SoftwareEngine,
    Direct,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    Idle,
    Attaching,
    Playing,
    Paused,
    Ended,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// Events reported by the element or the adaptive engine.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    TimeUpdate,
    DurationChange,
    Play,
    Pause,
    Waiting,
    Playing,
    Ended,
    FullscreenChange(bool),
    RemotePlaybackAvailability(bool),
    EngineError(String),
}

/// What the player reports upward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerOutput {
    /// Current position, on every time update
    Time(f64),
    /// Final position, once per playback session
    Ended(f64),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub current_time: f64,
    pub duration: f64,
    pub buffered_edge: f64,
    pub is_playing: bool,
    pub is_buffering: bool,
    pub is_muted: bool,
    pub is_fullscreen: bool,
    pub source_kind: Option<SourceKind>,
}

pub struct VideoPlayer<E: MediaElement> {
    element: E,
    engine_factory: Option<Box<dyn AdaptiveEngineFactory<E>>>,
    engine: Option<Box<dyn AdaptiveEngine>>,
    source: Option<VideoSource>,
    strategy: Option<AttachStrategy>,
    transport: Transport,
    state: PlaybackState,
    capabilities: Capabilities,
    autoplay: bool,
    session_id: Uuid,
    ended_reported: bool,
    drag_position: Option<f64>,
    controls_visible: bool,
    hide_controls_at: Option<Instant>,
    last_tap: Option<Instant>,
    seek_overlay: Option<(SeekDirection, Instant)>,
}

impl<E: MediaElement> VideoPlayer<E> {
    pub fn new(
        element: E,
        engine_factory: Option<Box<dyn AdaptiveEngineFactory<E>>>,
        autoplay: bool,
    ) -> Self {
        let capabilities = element.capabilities();
        tracing::debug!(?capabilities, "video player mounted");
        VideoPlayer {
            element,
            engine_factory,
            engine: None,
            source: None,
            strategy: None,
            transport: Transport::Idle,
            state: PlaybackState::default(),
            capabilities,
            autoplay,
            session_id: Uuid::new_v4(),
            ended_reported: false,
            drag_position: None,
            controls_visible: true,
            hide_controls_at: None,
            last_tap: None,
            seek_overlay: None,
        }
    }

    /// Attach a new source, tearing down whatever was attached before.
    ///
    /// Adaptive-engine construction or load failures put the player in
    /// [`Transport::Failed`] and are returned; they are not retried.
    pub fn load(&mut self, source: VideoSource, now: Instant) -> Result<(), MediaError> {
        self.teardown();
        self.state = PlaybackState {
            is_muted: self.state.is_muted,
            is_fullscreen: self.state.is_fullscreen,
            ..PlaybackState::default()
        };
        self.start_session();
        self.transport = Transport::Attaching;
        self.drag_position = None;
        self.state.source_kind = Some(if source.is_hls {
            SourceKind::AdaptiveStream
        } else {
            SourceKind::DirectFile
        });

        let strategy = if source.is_hls && self.element.supports_native_hls() {
            self.element.set_src(&source.url);
            AttachStrategy::NativePlaylist
        } else if source.is_hls
            && self
                .engine_factory
                .as_ref()
                .is_some_and(|f| f.is_supported())
        {
            if let Err(e) = self.attach_engine(&source.url) {
                tracing::warn!(session = %self.session_id, url = %source.url, error = %e, "adaptive stream attach failed");
                self.transport = Transport::Failed(e.to_string());
                self.source = Some(source);
                return Err(e);
            }
            AttachStrategy::SoftwareEngine
        } else {
            // best effort: formats the element cannot decode just stall
            self.element.set_src(&source.url);
            AttachStrategy::Direct
        };
        tracing::info!(session = %self.session_id, url = %source.url, ?strategy, "source attached");
        self.strategy = Some(strategy);
        self.source = Some(source);
        self.transport = Transport::Paused;

        if self.autoplay {
            self.request_play();
        }
        self.show_controls(now);
        Ok(())
    }

    fn attach_engine(&mut self, url: &str) -> Result<(), MediaError> {
        let Some(factory) = self.engine_factory.as_ref() else {
            return Err(MediaError::AttachFailed("no adaptive engine".into()));
        };
        let mut engine = factory.create(&mut self.element)?;
        if let Err(e) = engine.load_source(url) {
            engine.destroy();
            return Err(e);
        }
        self.engine = Some(engine);
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
        if self.source.take().is_some() {
            self.element.pause();
            self.element.clear_src();
        }
        self.strategy = None;
    }

    fn start_session(&mut self) {
        self.session_id = Uuid::new_v4();
        self.ended_reported = false;
    }

    /// Release the element and any engine. Safe to call more than once.
    pub fn close(&mut self) {
        if self.source.is_some() || self.engine.is_some() {
            tracing::debug!(session = %self.session_id, "closing video player");
        }
        self.teardown();
        self.transport = Transport::Idle;
        self.state.is_playing = false;
        self.state.is_buffering = false;
    }

    /// Feed an element/engine event. Returns what must be reported upward.
    pub fn handle_event(&mut self, event: MediaEvent, now: Instant) -> Option<PlayerOutput> {
        match event {
            MediaEvent::TimeUpdate => {
                let position = finite_or_zero(self.element.current_time());
                if self.drag_position.is_none() {
                    self.state.current_time = position;
                }
                self.state.duration = finite_or_zero(self.element.duration());
                if let Some(edge) = self.element.buffered_end() {
                    self.state.buffered_edge = finite_or_zero(edge);
                }
                Some(PlayerOutput::Time(position))
            }
            MediaEvent::DurationChange => {
                self.state.duration = finite_or_zero(self.element.duration());
                None
            }
            MediaEvent::Play => {
                if self.transport == Transport::Ended {
                    self.start_session();
                }
                self.state.is_playing = true;
                self.transport = Transport::Playing;
                self.show_controls(now);
                None
            }
            MediaEvent::Pause => {
                self.state.is_playing = false;
                if self.transport == Transport::Playing {
                    self.transport = Transport::Paused;
                }
                self.show_controls(now);
                None
            }
            MediaEvent::Waiting => {
                self.state.is_buffering = true;
                None
            }
            MediaEvent::Playing => {
                self.state.is_buffering = false;
                None
            }
            MediaEvent::Ended => {
                self.state.is_playing = false;
                self.transport = Transport::Ended;
                self.show_controls(now);
                if self.ended_reported {
                    return None;
                }
                self.ended_reported = true;
                let position = finite_or_zero(self.element.current_time());
                tracing::debug!(session = %self.session_id, position, "playback ended");
                Some(PlayerOutput::Ended(position))
            }
            MediaEvent::FullscreenChange(on) => {
                self.state.is_fullscreen = on;
                None
            }
            MediaEvent::RemotePlaybackAvailability(available) => {
                self.capabilities.remote_playback = available;
                None
            }
            MediaEvent::EngineError(reason) => {
                tracing::warn!(session = %self.session_id, %reason, "adaptive engine failed");
                self.state.is_playing = false;
                self.state.is_buffering = false;
                self.transport = Transport::Failed(reason);
                None
            }
        }
    }

    fn request_play(&mut self) {
        match self.element.play() {
            Ok(()) | Err(MediaError::Aborted) => {}
            Err(e) => tracing::debug!(session = %self.session_id, error = %e, "play rejected"),
        }
    }

    pub fn toggle_play(&mut self, now: Instant) {
        if self.source.is_none() {
            return;
        }
        if self.element.is_paused() {
            self.request_play();
        } else {
            self.element.pause();
        }
        self.show_controls(now);
    }

    /// Relative seek clamped to `[0, duration]`.
    pub fn skip(&mut self, seconds: f64, now: Instant) {
        if self.source.is_none() {
            return;
        }
        let limit = match self.effective_duration() {
            d if d > 0.0 => d,
            _ => f64::INFINITY,
        };
        let next = (self.element.current_time() + seconds).clamp(0.0, limit);
        self.element.set_current_time(next);
        self.state.current_time = next;
        let direction = if seconds > 0.0 {
            SeekDirection::Forward
        } else {
            SeekDirection::Backward
        };
        self.seek_overlay = Some((direction, now + SEEK_OVERLAY_DURATION));
        self.show_controls(now);
    }

    fn effective_duration(&self) -> f64 {
        if self.state.duration > 0.0 {
            self.state.duration
        } else {
            finite_or_zero(self.element.duration())
        }
    }

    pub fn begin_drag(&mut self, now: Instant) {
        self.drag_position = Some(self.state.current_time);
        self.show_controls(now);
    }

    /// Move the scrubber to `fraction` of the timeline. Only the displayed
    /// position changes until the drag ends.
    pub fn drag_to(&mut self, fraction: f64) {
        if self.drag_position.is_none() {
            return;
        }
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let position = fraction * self.effective_duration();
        self.drag_position = Some(position);
        self.state.current_time = position;
    }

    /// Commit the dragged position to the element.
    pub fn end_drag(&mut self, now: Instant) {
        if let Some(position) = self.drag_position.take() {
            self.element.set_current_time(position);
            self.state.current_time = position;
        }
        self.show_controls(now);
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_position.is_some()
    }

    /// A tap on the video surface at horizontal position `x_fraction` (0..1).
    ///
    /// Touch devices toggle the controls. Elsewhere a second tap within the
    /// double-tap window seeks back (left third), forward (right third) or
    /// toggles playback (middle); a single tap toggles the controls.
    pub fn tap(&mut self, x_fraction: f64, now: Instant) {
        if self.capabilities.touch {
            self.toggle_controls(now);
            return;
        }
        let is_double = self
            .last_tap
            .is_some_and(|at| now.saturating_duration_since(at) < DOUBLE_TAP_WINDOW);
        if is_double {
            if x_fraction < 1.0 / 3.0 {
                self.skip(-TAP_SEEK_SECONDS, now);
            } else if x_fraction > 2.0 / 3.0 {
                self.skip(TAP_SEEK_SECONDS, now);
            } else {
                self.toggle_play(now);
            }
        } else {
            self.toggle_controls(now);
        }
        self.last_tap = Some(now);
    }

    fn toggle_controls(&mut self, now: Instant) {
        if self.controls_visible {
            self.controls_visible = false;
            self.hide_controls_at = None;
        } else {
            self.show_controls(now);
        }
    }

    /// Pointer movement or touch start: show controls and restart the hide timer.
    pub fn pointer_activity(&mut self, now: Instant) {
        self.show_controls(now);
    }

    fn show_controls(&mut self, now: Instant) {
        self.controls_visible = true;
        self.hide_controls_at = if self.state.is_playing && self.drag_position.is_none() {
            Some(now + CONTROLS_HIDE_DELAY)
        } else {
            None
        };
    }

    /// Advance timers: auto-hide controls, expire the seek overlay.
    pub fn tick(&mut self, now: Instant) {
        if let Some(at) = self.hide_controls_at {
            if now >= at && self.state.is_playing && self.drag_position.is_none() {
                self.controls_visible = false;
                self.hide_controls_at = None;
            }
        }
        if self.seek_overlay.is_some_and(|(_, until)| now >= until) {
            self.seek_overlay = None;
        }
    }

    /// Controls are forced visible while paused or dragging.
    pub fn controls_visible(&self) -> bool {
        self.controls_visible || !self.state.is_playing || self.drag_position.is_some()
    }

    pub fn seek_overlay(&self) -> Option<SeekDirection> {
        self.seek_overlay.map(|(direction, _)| direction)
    }

    pub fn toggle_mute(&mut self) {
        let muted = !self.state.is_muted;
        self.element.set_muted(muted);
        self.state.is_muted = muted;
    }

    /// Returns false when the platform has no fullscreen support.
    pub fn toggle_fullscreen(&mut self) -> bool {
        if !self.capabilities.fullscreen {
            return false;
        }
        let target = !self.state.is_fullscreen;
        match self.element.set_fullscreen(target) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "fullscreen request rejected");
                false
            }
        }
    }

    pub fn toggle_picture_in_picture(&mut self, on: bool) -> bool {
        if !self.capabilities.picture_in_picture {
            return false;
        }
        match self.element.set_picture_in_picture(on) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "picture-in-picture request rejected");
                false
            }
        }
    }

    pub fn show_remote_playback_picker(&mut self) -> bool {
        if !self.capabilities.remote_playback {
            return false;
        }
        self.element.show_remote_playback_picker();
        true
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn attach_strategy(&self) -> Option<AttachStrategy> {
        self.strategy
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn source(&self) -> Option<&VideoSource> {
        self.source.as_ref()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    /// Played fraction for the progress bar, 0 when the duration is unknown.
    pub fn progress_fraction(&self) -> f64 {
        fraction_of(self.state.current_time, self.state.duration)
    }

    pub fn buffered_fraction(&self) -> f64 {
        fraction_of(self.state.buffered_edge, self.state.duration)
    }

    pub fn time_label(&self) -> String {
        format!(
            "{} / {}",
            super::format_time(self.state.current_time),
            super::format_time(self.state.duration)
        )
    }
}

impl<E: MediaElement> Drop for VideoPlayer<E> {
    fn drop(&mut self) {
        self.close();
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

fn fraction_of(value: f64, total: f64) -> f64 {
    if total > 0.0 {
        (value / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
