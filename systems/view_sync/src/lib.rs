#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Keeps the sidebar and the highlight overlays in step with the map.
//!
//! [`ViewSync`] owns the engine-facing side of the application: it installs
//! the clustered source and layer catalog once data and map are both ready,
//! subscribes to engine events behind a readiness gate, routes pointer events
//! through the gesture machine and the tap handler, debounces viewport
//! settles, and runs recomputation passes whose results are published only
//! while their generation is still current.

mod debounce;
mod generation;

use std::time::Duration;

use canopy_core::{
    layers, Category, ClusterConfig, Command, EngineError, Entity, Event, Feature, MapEngine,
    MapEvent, MapEventChannel, QueryRegion, SubscriptionId,
};
use canopy_system_aggregation::{aggregate, CategoryAggregation, RenderedFeatures};
use canopy_system_cluster_expansion::ClusterExpander;
use canopy_system_gesture::{GestureConfig, GestureMachine, GestureResolution, Press};
use canopy_system_highlight::{synchronize, HighlightChange, HighlightFilters, HighlightState};
use futures::future::join;
use glam::Vec2;
use tracing::{debug, info, info_span, trace, warn, Instrument};

pub use debounce::Debouncer;
pub use generation::{Generation, PassTracker, Published};

/// Quiet window applied to viewport settle notifications.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Zoom levels added when a cluster is tapped.
pub const DEFAULT_CLUSTER_ZOOM_STEP: f64 = 2.0;

/// Tunables of the coordinator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncConfig {
    /// Quiet window applied to viewport settle notifications.
    pub debounce: Duration,
    /// Zoom levels added when a cluster is tapped.
    pub cluster_zoom_step: f64,
    /// Clustering parameters of the tree source.
    pub clustering: ClusterConfig,
    /// Long-press recognition parameters.
    pub gesture: GestureConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            cluster_zoom_step: DEFAULT_CLUSTER_ZOOM_STEP,
            clustering: ClusterConfig::default(),
            gesture: GestureConfig::default(),
        }
    }
}

/// Prerequisites for installing interaction subscriptions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    /// The rendering surface finished loading.
    pub map_ready: bool,
    /// The entity collection was fetched.
    pub data_loaded: bool,
    /// The clustered source and layer catalog are installed.
    pub layers_present: bool,
}

impl Readiness {
    /// Reports whether every prerequisite holds.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.map_ready && self.data_loaded && self.layers_present
    }
}

/// Result of one recomputation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewSnapshot {
    /// Sidebar categories for the viewport the pass observed.
    pub aggregation: CategoryAggregation,
    /// Overlay filters for the highlight active when the pass started.
    pub filters: HighlightFilters,
}

/// Coordinator between the world, the engine and the interaction systems.
#[derive(Debug)]
pub struct ViewSync<'e, E> {
    engine: &'e E,
    config: SyncConfig,
    readiness: Readiness,
    idle_watch: Option<SubscriptionId>,
    subscriptions: Vec<SubscriptionId>,
    awaiting_first_idle: bool,
    refresh_requested: bool,
    popup_open: bool,
    torn_down: bool,
    gesture: GestureMachine,
    debouncer: Debouncer,
    highlight: HighlightState,
    tracker: PassTracker,
    published: Published<ViewSnapshot>,
}

impl<'e, E: MapEngine> ViewSync<'e, E> {
    /// Creates a coordinator for an engine that has not loaded yet.
    #[must_use]
    pub fn new(engine: &'e E, config: SyncConfig) -> Self {
        Self {
            engine,
            config,
            readiness: Readiness::default(),
            idle_watch: None,
            subscriptions: Vec::new(),
            awaiting_first_idle: false,
            refresh_requested: false,
            popup_open: false,
            torn_down: false,
            gesture: GestureMachine::new(config.gesture),
            debouncer: Debouncer::new(config.debounce),
            highlight: HighlightState::new(),
            tracker: PassTracker::new(),
            published: Published::new(),
        }
    }

    /// Engine the coordinator drives.
    #[must_use]
    pub const fn engine(&self) -> &'e E {
        self.engine
    }

    /// Readiness flags observed so far.
    #[must_use]
    pub const fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Whether the pointer and viewport listeners are installed.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Whether [`teardown`](Self::teardown) has disposed the coordinator.
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Current highlight selection.
    #[must_use]
    pub const fn highlight(&self) -> &HighlightState {
        &self.highlight
    }

    /// Gesture recognizer fed by pointer events.
    #[must_use]
    pub const fn gesture(&self) -> &GestureMachine {
        &self.gesture
    }

    /// Most recently published pass result.
    #[must_use]
    pub fn latest(&self) -> Option<ViewSnapshot> {
        self.published.with(|snapshot| snapshot.cloned())
    }

    /// Generation of the most recently published pass.
    #[must_use]
    pub fn published_generation(&self) -> Option<Generation> {
        self.published.generation()
    }

    /// Earliest time at which [`pump`](Self::pump) has timer work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.gesture.next_deadline(), self.debouncer.pending()) {
            (Some(gesture), Some(debounce)) => Some(gesture.min(debounce)),
            (gesture, debounce) => gesture.or(debounce),
        }
    }

    /// Records that the rendering surface finished loading.
    ///
    /// `entities` is the current collection, installed right away when the
    /// data arrived first.
    pub fn mark_map_ready(&mut self, entities: &[Entity]) -> Result<(), EngineError> {
        if self.torn_down {
            return Ok(());
        }
        self.readiness.map_ready = true;
        self.install_source(entities)?;
        let _ = self.try_install_subscriptions();
        Ok(())
    }

    /// Reacts to events emitted by the world.
    ///
    /// `entities` is the collection after the events were applied.
    /// Does nothing once the coordinator is torn down.
    pub fn handle(&mut self, events: &[Event], entities: &[Entity]) -> Result<(), EngineError> {
        if self.torn_down {
            trace!(events = events.len(), "ignoring events after teardown");
            return Ok(());
        }
        let mut data_changed = false;
        for event in events {
            match event {
                Event::EntitiesLoaded { count } => {
                    debug!(count, "entity collection loaded");
                    if self.readiness.data_loaded {
                        data_changed = true;
                    }
                    self.readiness.data_loaded = true;
                }
                Event::EntityInserted { .. } | Event::EntityRemoved { .. } => {
                    data_changed = true;
                }
                Event::PopupOpened { .. } => self.popup_open = true,
                Event::PopupClosed { .. } => self.popup_open = false,
                Event::SpeciesLoaded { .. }
                | Event::InsertionRejected { .. }
                | Event::CreationFormOpened { .. }
                | Event::CreationFormDismissed
                | Event::NoticePosted { .. } => {}
            }
        }

        if data_changed && self.readiness.layers_present {
            self.engine.set_data(&layers::TREES, entities)?;
            self.refresh_requested = true;
        }
        self.install_source(entities)?;
        let _ = self.try_install_subscriptions();
        Ok(())
    }

    /// Installs the pointer and viewport listeners once every readiness flag
    /// holds. Returns whether the listeners are installed afterwards.
    ///
    /// A torn-down coordinator never subscribes again.
    pub fn try_install_subscriptions(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        if !self.subscriptions.is_empty() {
            return true;
        }
        if !self.readiness.is_complete() {
            trace!(readiness = ?self.readiness, "listeners deferred");
            return false;
        }

        self.subscriptions = [MapEventChannel::Pointer, MapEventChannel::Viewport]
            .into_iter()
            .map(|channel| self.engine.subscribe(channel))
            .collect();
        info!("map listeners installed");
        true
    }

    /// Removes every engine subscription and drops pending timers.
    ///
    /// The coordinator stays disposed: later events, readiness signals and
    /// highlight changes no longer reach the engine.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.readiness = Readiness::default();
        for subscription in self.subscriptions.drain(..).chain(self.idle_watch.take()) {
            self.engine.unsubscribe(subscription);
        }
        self.debouncer.cancel();
        self.gesture = GestureMachine::new(self.config.gesture);
        self.awaiting_first_idle = false;
        self.refresh_requested = false;
        info!("map listeners removed");
    }

    /// Toggles the highlighted category and requests a recomputation pass.
    pub fn toggle_highlight(&mut self, category: Category) -> HighlightChange {
        let change = self.highlight.toggle(category);
        info!(?change, "highlight changed");
        self.refresh_requested = true;
        change
    }

    /// Emergency cancel bound to the Escape key.
    pub fn escape(&mut self, out: &mut Vec<Command>) {
        self.gesture.escape(out);
    }

    /// Drains engine events and fires due timers.
    ///
    /// Commands for the world are appended to `out`. Returns whether a
    /// recomputation pass is due; the caller then awaits
    /// [`refresh`](Self::refresh).
    ///
    /// Engine events carry no timestamp and are stamped with `now`. The host
    /// must pump whenever the engine queues a pointer event and again at
    /// [`next_deadline`](Self::next_deadline); a release first drained after
    /// the dwell deadline counts as a completed long press.
    pub fn pump(&mut self, now: Duration, out: &mut Vec<Command>) -> bool {
        if self.torn_down {
            return false;
        }
        let mut refresh = std::mem::take(&mut self.refresh_requested);

        while let Some(event) = self.engine.poll_event() {
            match event {
                MapEvent::PointerDown { kind, screen } => {
                    let hits = self
                        .engine
                        .query_rendered_features(QueryRegion::Point(screen), &layers::INTERACTIVE);
                    let press = Press {
                        at: now,
                        kind,
                        over_feature: !hits.is_empty(),
                        coordinate: self.engine.unproject(screen),
                    };
                    let _ = self.gesture.pointer_down(press, self.popup_open, out);
                }
                MapEvent::PointerUp { screen, .. } => {
                    if self.gesture.pointer_up(now, out) == Some(GestureResolution::Tap) {
                        self.tap(screen, out);
                    }
                }
                MapEvent::TouchCancel => {
                    let _ = self.gesture.cancel(now, out);
                }
                MapEvent::MoveEnd | MapEvent::ZoomEnd => self.debouncer.poke(now),
                MapEvent::Idle => {
                    if self.awaiting_first_idle {
                        self.awaiting_first_idle = false;
                        refresh = true;
                    }
                }
            }
        }

        let _ = self.gesture.advance(now, out);
        if self.debouncer.poll(now) {
            debug!("viewport settled");
            refresh = true;
        }
        refresh
    }

    /// Recomputes the sidebar aggregation and the highlight overlays for the
    /// current viewport.
    ///
    /// Both computations share one generation. The result is published and
    /// the overlay filters applied only if no newer pass was started in the
    /// meantime. Returns whether the result was published.
    pub async fn refresh(&self) -> bool {
        if self.torn_down {
            return false;
        }
        let generation = self.tracker.begin();
        let span = info_span!("refresh", generation = generation.get());

        async move {
            let expander = ClusterExpander::new(self.engine);
            let rendered = RenderedFeatures::query(self.engine);
            let (aggregation, filters) = join(
                aggregate(&expander, &rendered.points, &rendered.clusters),
                synchronize(&expander, &self.highlight),
            )
            .await;

            if !self.tracker.is_current(generation) {
                debug!("discarding result of superseded pass");
                return false;
            }
            if let Err(error) = filters.apply(self.engine) {
                warn!(%error, "highlight overlays unavailable");
            }
            debug!(categories = aggregation.len(), "publishing pass result");
            self.published
                .publish(generation, ViewSnapshot { aggregation, filters })
        }
        .instrument(span)
        .await
    }

    fn install_source(&mut self, entities: &[Entity]) -> Result<(), EngineError> {
        if self.readiness.layers_present
            || !(self.readiness.map_ready && self.readiness.data_loaded)
        {
            return Ok(());
        }

        if self.idle_watch.is_none() {
            self.idle_watch = Some(self.engine.subscribe(MapEventChannel::Render));
        }
        self.engine
            .add_clustered_source(&layers::TREES, entities, self.config.clustering)?;
        for paint in layers::catalog() {
            self.engine.add_layer(paint)?;
        }
        self.readiness.layers_present = true;
        self.awaiting_first_idle = true;
        info!(entities = entities.len(), "tree source and layers installed");
        Ok(())
    }

    fn tap(&self, screen: Vec2, out: &mut Vec<Command>) {
        let hit = self
            .engine
            .query_rendered_features(QueryRegion::Point(screen), &layers::INTERACTIVE)
            .into_iter()
            .next();

        match hit {
            Some(Feature::Point(entity)) => {
                debug!(location_id = %entity.location_id, "opening popup");
                out.push(Command::OpenPopup {
                    location_id: entity.location_id,
                });
            }
            Some(Feature::Cluster(cluster)) => {
                let zoom = self.engine.zoom() + self.config.cluster_zoom_step;
                debug!(cluster = %cluster.id, zoom, "zooming into cluster");
                self.engine.ease_to(cluster.coordinate, zoom);
            }
            None => trace!("tap released away from any feature"),
        }
    }
}
