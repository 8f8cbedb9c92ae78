//! Timed visual transitions on compositor actors.
//!
//! Each effect is bound to one (window, event-class) pair, runs a wall-clock
//! timeline advanced from the main event loop, and completes exactly once.
//! A terminal unmap effect arms the client's DONE flag: a duplicate unmap
//! delivered before (or after) completion runs no second effect, so a
//! forced destroy racing a normal unmap cannot fade the window out twice.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use keyframe::functions::{EaseOutCubic, EaseOutQuad};
use keyframe::EasingFunction;
use tracing::debug;

use crate::compositor::backend::Backend;
use crate::compositor::client::{CompClientFlags, CompositorClient};
use crate::shared::{Geometry, WindowId};

/// Event classes that can trigger a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectEvent {
    Map,
    Unmap,
    Minimize,
    Transition,
}

/// Interpolation behaviour for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    /// Position path from off-screen to target (map).
    SlideIn,
    /// Opacity to zero (unmap).
    Fade,
    /// Scale to zero around the center (minimize).
    Scale,
    /// Opacity from zero on the incoming side of a top-app switch.
    CrossFade,
}

/// One theme- or config-driven effect binding.
#[derive(Debug, Clone, Copy)]
pub struct EffectSpec {
    pub event: EffectEvent,
    pub kind: EffectKind,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy)]
pub enum Curve {
    Linear,
    EaseOutQuad,
    EaseOutCubic,
}

impl Curve {
    pub fn y(self, x: f64) -> f64 {
        match self {
            Curve::Linear => x,
            Curve::EaseOutQuad => EaseOutQuad.y(x),
            Curve::EaseOutCubic => EaseOutCubic.y(x),
        }
    }
}

/// A time-bounded animation run.
#[derive(Debug)]
pub struct Timeline {
    start: Instant,
    duration: Duration,
    curve: Curve,
}

impl Timeline {
    pub fn new(now: Instant, duration: Duration, curve: Curve) -> Self {
        Self { start: now, duration, curve }
    }

    /// Eased progress in `0.0..=1.0` at `now`.
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let passed = now.saturating_duration_since(self.start).as_secs_f64();
        let x = (passed / self.duration.as_secs_f64()).clamp(0.0, 1.0);
        self.curve.y(x)
    }

    pub fn is_done(&self, now: Instant) -> bool {
        now >= self.start + self.duration
    }

    pub fn deadline(&self) -> Instant {
        self.start + self.duration
    }
}

#[derive(Debug)]
struct Effect {
    window: WindowId,
    event: EffectEvent,
    kind: EffectKind,
    timeline: Timeline,
    /// Slide distance for SlideIn, from the actor's coverage.
    slide: (i32, i32),
    /// Cross-fade: every actor fading in (incoming client plus transients).
    fade_in: Vec<WindowId>,
    /// Cross-fade: the outgoing client whose opacity is restored on
    /// completion so a future raise shows it correctly.
    restore: Option<WindowId>,
}

/// Runs at most one transition per (client, event-class), advancing all
/// in-flight timelines from the event loop.
#[derive(Debug, Default)]
pub struct EffectEngine {
    running: Vec<Effect>,
}

impl EffectEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn is_running(&self, window: WindowId) -> bool {
        self.running.iter().any(|e| e.window == window)
    }

    /// Earliest completion instant among running timelines, for the event
    /// loop's bounded wait.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.running.iter().map(|e| e.timeline.deadline()).min()
    }

    /// Arm a map/unmap/minimize effect. Returns false (and runs nothing)
    /// when the client has no actor, an effect for this (window, event) is
    /// already in flight, or a terminal effect was already armed.
    pub fn begin<B: Backend>(
        &mut self,
        backend: &mut B,
        clients: &mut HashMap<WindowId, CompositorClient>,
        window: WindowId,
        spec: EffectSpec,
        coverage: Geometry,
        now: Instant,
    ) -> bool {
        let Some(client) = clients.get_mut(&window) else {
            return false;
        };
        let Some(actor) = client.actor else {
            // Actor creation failed upstream; never block visibility on the
            // animation subsystem.
            return false;
        };
        if self.running.iter().any(|e| e.window == window && e.event == spec.event) {
            return false;
        }
        // Unmap and minimize both end with the window gone; whichever armed
        // first wins, and the other runs nothing.
        let terminal = matches!(spec.event, EffectEvent::Unmap | EffectEvent::Minimize);
        if terminal && client.flags.contains(CompClientFlags::DONE) {
            debug!("Window {}: terminal effect already armed, suppressing duplicate", window);
            return false;
        }
        if spec.duration.is_zero() {
            return false;
        }

        let mut slide = (0, 0);
        match spec.kind {
            EffectKind::SlideIn => {
                slide = (0, coverage.height as i32);
                backend.set_actor_offset(actor, slide.0, slide.1);
            }
            EffectKind::Fade => {
                client.flags.insert(CompClientFlags::DONT_UPDATE);
            }
            EffectKind::Scale => {
                client.flags.insert(CompClientFlags::DONT_UPDATE);
            }
            EffectKind::CrossFade => {
                // Cross-fades go through begin_crossfade.
                return false;
            }
        }
        if terminal {
            client.flags.insert(CompClientFlags::DONE);
        }
        client.flags.insert(CompClientFlags::EFFECT_RUNNING);

        debug!("Window {}: {:?} effect armed ({:?})", window, spec.event, spec.kind);
        self.running.push(Effect {
            window,
            event: spec.event,
            kind: spec.kind,
            timeline: Timeline::new(now, spec.duration, Curve::EaseOutCubic),
            slide,
            fade_in: Vec::new(),
            restore: None,
        });
        true
    }

    /// Arm a cross-fade for a top-app switch: the incoming client and its
    /// transient children fade in from zero; the outgoing client stays at
    /// full opacity beneath them, producing the perceived fade-out through
    /// stacking alone.
    pub fn begin_crossfade<B: Backend>(
        &mut self,
        backend: &mut B,
        clients: &mut HashMap<WindowId, CompositorClient>,
        incoming: WindowId,
        transients: &[WindowId],
        outgoing: WindowId,
        duration: Duration,
        now: Instant,
    ) -> bool {
        if duration.is_zero() || self.is_running(incoming) {
            return false;
        }
        let Some(client) = clients.get_mut(&incoming) else {
            return false;
        };
        if client.actor.is_none() {
            return false;
        }
        client.flags.insert(CompClientFlags::EFFECT_RUNNING);

        let mut fade_in = vec![incoming];
        fade_in.extend(transients.iter().copied().filter(|w| *w != incoming));
        for &w in &fade_in {
            if let Some(actor) = clients.get(&w).and_then(|c| c.actor) {
                backend.set_actor_opacity(actor, 0.0);
            }
        }

        debug!("Cross-fade armed: {} over {}", incoming, outgoing);
        self.running.push(Effect {
            window: incoming,
            event: EffectEvent::Transition,
            kind: EffectKind::CrossFade,
            timeline: Timeline::new(now, duration, Curve::EaseOutQuad),
            slide: (0, 0),
            fade_in,
            restore: Some(outgoing),
        });
        true
    }

    /// Advance every running timeline to `now`, applying values and firing
    /// completions. Returns the windows whose deferred teardown may now
    /// proceed (unregistered while their effect was running).
    pub fn tick<B: Backend>(
        &mut self,
        backend: &mut B,
        clients: &mut HashMap<WindowId, CompositorClient>,
        now: Instant,
    ) -> Vec<WindowId> {
        let mut finished = Vec::new();
        let mut releasable = Vec::new();

        for (index, effect) in self.running.iter().enumerate() {
            let y = effect.timeline.progress(now);
            match effect.kind {
                EffectKind::SlideIn => {
                    if let Some(actor) = clients.get(&effect.window).and_then(|c| c.actor) {
                        let dx = (effect.slide.0 as f64 * (1.0 - y)) as i32;
                        let dy = (effect.slide.1 as f64 * (1.0 - y)) as i32;
                        backend.set_actor_offset(actor, dx, dy);
                    }
                }
                EffectKind::Fade => {
                    if let Some(actor) = clients.get(&effect.window).and_then(|c| c.actor) {
                        backend.set_actor_opacity(actor, 1.0 - y);
                    }
                }
                EffectKind::Scale => {
                    if let Some(actor) = clients.get(&effect.window).and_then(|c| c.actor) {
                        backend.set_actor_scale(actor, 1.0 - y, 1.0 - y);
                    }
                }
                EffectKind::CrossFade => {
                    for &w in &effect.fade_in {
                        if let Some(actor) = clients.get(&w).and_then(|c| c.actor) {
                            backend.set_actor_opacity(actor, y);
                        }
                    }
                }
            }
            if effect.timeline.is_done(now) {
                finished.push(index);
            }
        }

        // Completion side effects, exactly once per armed effect.
        for index in finished.into_iter().rev() {
            let effect = self.running.swap_remove(index);
            debug!("Window {}: {:?} effect complete", effect.window, effect.event);

            match effect.kind {
                EffectKind::SlideIn => {
                    if let Some(client) = clients.get_mut(&effect.window) {
                        if let Some(actor) = client.actor {
                            backend.set_actor_offset(actor, 0, 0);
                        }
                    }
                }
                EffectKind::Fade | EffectKind::Scale => {
                    if let Some(client) = clients.get_mut(&effect.window) {
                        if let Some(actor) = client.actor {
                            backend.hide_actor(actor);
                            backend.set_actor_opacity(actor, 1.0);
                            backend.set_actor_scale(actor, 1.0, 1.0);
                        }
                    }
                }
                EffectKind::CrossFade => {
                    for &w in &effect.fade_in {
                        if let Some(actor) = clients.get(&w).and_then(|c| c.actor) {
                            backend.set_actor_opacity(actor, 1.0);
                        }
                    }
                    if let Some(outgoing) = effect.restore {
                        if let Some(actor) = clients.get(&outgoing).and_then(|c| c.actor) {
                            backend.set_actor_opacity(actor, 1.0);
                        }
                    }
                }
            }

            if let Some(client) = clients.get_mut(&effect.window) {
                // Only drop the running flag once no other effect still
                // references this client.
                if !self.is_running(effect.window) {
                    client.flags.remove(CompClientFlags::EFFECT_RUNNING);
                }
                if client.pending_destroy && !self.is_running(effect.window) {
                    releasable.push(effect.window);
                }
            }
        }
        releasable
    }
}
