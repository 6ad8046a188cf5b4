//! Meditation audio: a narration track at a fixed volume mixed with an
//! optional looping ambient bed whose loudness lives entirely in a gain node.
//!
//! The ambient element's own volume stays at 1.0 because some mobile
//! platforms ignore `volume` on background loops; only the graph's gain
//! changes. At most one ambient source is connected to the output at a time.

use std::time::Duration;

use crate::error::MediaError;

pub const MAIN_FIXED_VOLUME: f64 = 0.65;
pub const AMBIENT_FIXED_GAIN: f64 = 0.008;
pub const AMBIENT_GAIN_RAMP: Duration = Duration::from_millis(300);
pub const SKIP_SECONDS: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbientKind {
    #[default]
    None,
    Birds,
    Ocean,
    Rain,
}

impl AmbientKind {
    pub const ALL: [AmbientKind; 4] = [
        AmbientKind::None,
        AmbientKind::Birds,
        AmbientKind::Ocean,
        AmbientKind::Rain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AmbientKind::None => "none",
            AmbientKind::Birds => "birds",
            AmbientKind::Ocean => "ocean",
            AmbientKind::Rain => "rain",
        }
    }

    /// Bundled loop for this kind; `None` is silence.
    pub fn asset_path(&self) -> Option<&'static str> {
        match self {
            AmbientKind::None => None,
            AmbientKind::Birds => Some("/sounds/ambient_birds.mp3"),
            AmbientKind::Ocean => Some("/sounds/ambient_ocean.mp3"),
            AmbientKind::Rain => Some("/sounds/ambient_rain.mp3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeditationItem {
    pub id: String,
    pub title: String,
    pub audio_url: String,
    pub duration_sec: f64,
}

/// A platform audio element. Created with `preload=auto`.
pub trait AudioElement {
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn set_volume(&mut self, volume: f64);
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    fn duration(&self) -> f64;
    /// Drop the source so the platform can free decode buffers.
    fn release(&mut self);
}

/// Audio context with a single gain node wired to the output.
pub trait AudioGraph<E> {
    type Node;
    /// Wake a suspended context (autoplay policies).
    fn resume(&mut self) -> Result<(), MediaError>;
    /// Route `element` through the gain node.
    fn connect_source(&mut self, element: &mut E) -> Result<Self::Node, MediaError>;
    fn disconnect(&mut self, node: Self::Node);
    fn set_gain(&mut self, value: f64);
    fn ramp_gain(&mut self, target: f64, over: Duration);
    fn close(&mut self);
}

pub trait AudioBackend {
    type Element: AudioElement;
    type Graph: AudioGraph<Self::Element>;
    fn create_element(&mut self, url: &str, looping: bool) -> Result<Self::Element, MediaError>;
    fn create_graph(&mut self) -> Result<Self::Graph, MediaError>;
}

type GraphNode<B> = <<B as AudioBackend>::Graph as AudioGraph<<B as AudioBackend>::Element>>::Node;

struct AmbientChannel<B: AudioBackend> {
    kind: AmbientKind,
    element: B::Element,
    node: GraphNode<B>,
}

/// Narration events forwarded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationEvent {
    TimeUpdate,
    Ended,
}

/// Owns the narration element, the ambient element and the audio graph of
/// one open meditation. Everything is released by [`Self::close`], which
/// also runs on drop.
pub struct MeditationPlayer<B: AudioBackend> {
    backend: B,
    item: Option<MeditationItem>,
    narration: Option<B::Element>,
    graph: Option<B::Graph>,
    ambient: Option<AmbientChannel<B>>,
    selected: AmbientKind,
    is_playing: bool,
    current_time: f64,
}

impl<B: AudioBackend> MeditationPlayer<B> {
    pub fn new(backend: B) -> Self {
        MeditationPlayer {
            backend,
            item: None,
            narration: None,
            graph: None,
            ambient: None,
            selected: AmbientKind::None,
            is_playing: false,
            current_time: 0.0,
        }
    }

    /// Open a meditation and try to start it. A rejected autoplay leaves the
    /// player paused; only element creation failure is an error.
    pub fn open(&mut self, item: MeditationItem) -> Result<(), MediaError> {
        self.stop_narration();
        // ambient pauses with the outgoing narration
        self.pause_ambient();
        let mut narration = self.backend.create_element(&item.audio_url, false)?;
        narration.set_volume(MAIN_FIXED_VOLUME);
        tracing::debug!(item = %item.id, "meditation opened");
        self.narration = Some(narration);
        self.item = Some(item);
        self.current_time = 0.0;
        self.set_playing(true);
        Ok(())
    }

    /// Switch the ambient loop. The previous one is fully released first.
    pub fn select_ambient(&mut self, kind: AmbientKind) {
        if kind == self.selected && (self.ambient.is_some() || kind == AmbientKind::None) {
            return;
        }
        self.release_ambient();
        self.selected = kind;
        let Some(url) = kind.asset_path() else {
            return;
        };
        match self.build_ambient(kind, url) {
            Ok(channel) => {
                self.ambient = Some(channel);
                if self.is_playing {
                    self.start_ambient();
                }
            }
            Err(e) => {
                tracing::warn!(ambient = kind.as_str(), error = %e, "ambient unavailable, narration only");
            }
        }
    }

    fn build_ambient(&mut self, kind: AmbientKind, url: &str) -> Result<AmbientChannel<B>, MediaError> {
        if self.graph.is_none() {
            self.graph = Some(self.backend.create_graph()?);
        }
        let mut element = self.backend.create_element(url, true)?;
        element.set_volume(1.0);
        let Some(graph) = self.graph.as_mut() else {
            return Err(MediaError::AudioGraph("no audio context".into()));
        };
        graph.set_gain(0.0);
        match graph.connect_source(&mut element) {
            Ok(node) => Ok(AmbientChannel {
                kind,
                element,
                node,
            }),
            Err(e) => {
                element.release();
                Err(e)
            }
        }
    }

    fn start_ambient(&mut self) {
        let (Some(channel), Some(graph)) = (self.ambient.as_mut(), self.graph.as_mut()) else {
            return;
        };
        if let Err(e) = graph.resume() {
            tracing::warn!(error = %e, "audio context resume failed");
        }
        // silent start avoids a pop on constrained platforms
        graph.set_gain(0.0);
        match channel.element.play() {
            Ok(()) => graph.ramp_gain(AMBIENT_FIXED_GAIN, AMBIENT_GAIN_RAMP),
            Err(MediaError::Aborted) => {}
            Err(e) => tracing::warn!(ambient = channel.kind.as_str(), error = %e, "ambient play failed"),
        }
    }

    fn pause_ambient(&mut self) {
        if let Some(channel) = self.ambient.as_mut() {
            channel.element.pause();
        }
        if let Some(graph) = self.graph.as_mut() {
            graph.ramp_gain(0.0, AMBIENT_GAIN_RAMP);
        }
    }

    fn release_ambient(&mut self) {
        if let Some(mut channel) = self.ambient.take() {
            channel.element.pause();
            channel.element.release();
            if let Some(graph) = self.graph.as_mut() {
                graph.disconnect(channel.node);
            }
            tracing::debug!(ambient = channel.kind.as_str(), "ambient released");
        }
    }

    /// Play or pause narration and ambient together.
    pub fn set_playing(&mut self, playing: bool) {
        if playing {
            self.resume();
        } else {
            if let Some(narration) = self.narration.as_mut() {
                narration.pause();
            }
            self.pause_ambient();
            self.is_playing = false;
        }
    }

    fn resume(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            if let Err(e) = graph.resume() {
                tracing::warn!(error = %e, "audio context resume failed");
            }
        }
        let Some(narration) = self.narration.as_mut() else {
            return;
        };
        narration.set_volume(MAIN_FIXED_VOLUME);
        match narration.play() {
            Ok(()) => {}
            Err(MediaError::Aborted) => return,
            Err(e) => {
                tracing::warn!(error = %e, "narration play failed");
                return;
            }
        }
        self.is_playing = true;
        self.start_ambient();
    }

    pub fn toggle_play(&mut self) {
        self.set_playing(!self.is_playing);
    }

    /// Relative seek on the narration only; the ambient loop is untouched.
    /// Clamped to the catalogue duration of the open item.
    pub fn skip(&mut self, seconds: f64) {
        let duration = match self.item.as_ref() {
            Some(item) => item.duration_sec,
            None => self.duration(),
        };
        let Some(narration) = self.narration.as_mut() else {
            return;
        };
        let next = (narration.current_time() + seconds).clamp(0.0, duration.max(0.0));
        narration.set_current_time(next);
        self.current_time = next;
    }

    pub fn skip_forward(&mut self) {
        self.skip(SKIP_SECONDS);
    }

    pub fn skip_back(&mut self) {
        self.skip(-SKIP_SECONDS);
    }

    /// Seek to `fraction` of the item's duration (progress-bar drag).
    pub fn seek_to_fraction(&mut self, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let target = fraction * self.duration();
        if let Some(narration) = self.narration.as_mut() {
            narration.set_current_time(target);
            self.current_time = target;
        }
    }

    pub fn handle_event(&mut self, event: NarrationEvent) {
        match event {
            NarrationEvent::TimeUpdate => {
                if let Some(narration) = self.narration.as_ref() {
                    self.current_time = narration.current_time();
                }
            }
            NarrationEvent::Ended => {
                self.is_playing = false;
                self.pause_ambient();
            }
        }
    }

    /// Release every element and the audio graph. Safe to call more than once.
    pub fn close(&mut self) {
        self.release_ambient();
        self.stop_narration();
        if let Some(mut graph) = self.graph.take() {
            graph.close();
        }
        self.selected = AmbientKind::None;
    }

    fn stop_narration(&mut self) {
        if let Some(mut narration) = self.narration.take() {
            narration.pause();
            narration.release();
        }
        self.item = None;
        self.is_playing = false;
        self.current_time = 0.0;
    }

    /// Element duration when known, else the catalogue duration.
    pub fn duration(&self) -> f64 {
        let from_element = self
            .narration
            .as_ref()
            .map(|n| n.duration())
            .filter(|d| d.is_finite() && *d > 0.0);
        from_element
            .or_else(|| self.item.as_ref().map(|i| i.duration_sec))
            .unwrap_or(0.0)
    }

    pub fn progress_fraction(&self) -> f64 {
        let duration = self.duration();
        if duration > 0.0 {
            (self.current_time / duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn selected_ambient(&self) -> AmbientKind {
        self.selected
    }

    /// Whether an ambient loop is actually routed to the output.
    pub fn ambient_active(&self) -> bool {
        self.ambient.is_some()
    }

    pub fn item(&self) -> Option<&MeditationItem> {
        self.item.as_ref()
    }
}

impl<B: AudioBackend> Drop for MeditationPlayer<B> {
    fn drop(&mut self) {
        self.close();
    }
}
