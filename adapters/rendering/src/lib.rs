#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! In-process rendering backend for Canopy.
//!
//! [`GridEngine`] satisfies the [`MapEngine`] contract without a GPU or a
//! browser: entities are projected with Web Mercator and merged into clusters
//! by a screen-space grid whose cell size is the source's cluster radius.
//! Every change to the viewport or to source data rebuilds the index under a
//! new snapshot number, and cluster identifiers embed that number, so an
//! identifier handed out before a rebuild no longer resolves afterwards.

mod projection;

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, VecDeque},
};

use canopy_core::{
    ClusterConfig, ClusterExpansionError, ClusterFeature, ClusterId, Coordinate, EngineError,
    Entity, Feature, LayerId, LeafLimit, MapEngine, MapEvent, MapEventChannel, PaintSpec,
    PointerKind, Predicate, QueryRegion, SourceId, SubscriptionId, Viewport,
};
use glam::Vec2;
use tracing::{debug, trace};

use self::projection::Projection;

/// Grid-clustering rendering engine driven entirely from the host process.
#[derive(Debug)]
pub struct GridEngine {
    state: RefCell<GridState>,
    subscriptions: RefCell<BTreeMap<SubscriptionId, MapEventChannel>>,
    next_subscription: Cell<u32>,
    events: RefCell<VecDeque<MapEvent>>,
}

#[derive(Debug)]
struct GridState {
    viewport: Viewport,
    snapshot: u32,
    sources: BTreeMap<SourceId, ClusteredSource>,
    layers: Vec<PaintSpec>,
    index: BTreeMap<SourceId, SourceIndex>,
}

#[derive(Debug)]
struct ClusteredSource {
    entities: Vec<Entity>,
    config: ClusterConfig,
    revision: u32,
}

#[derive(Debug, Default)]
struct SourceIndex {
    features: Vec<IndexedFeature>,
    members: BTreeMap<ClusterId, Vec<Entity>>,
}

#[derive(Debug)]
struct IndexedFeature {
    feature: Feature,
    screen: Vec2,
}

impl GridEngine {
    /// Creates an engine showing the provided viewport with no sources.
    #[must_use]
    pub fn new(viewport: Viewport) -> Self {
        Self {
            state: RefCell::new(GridState {
                viewport,
                snapshot: 0,
                sources: BTreeMap::new(),
                layers: Vec::new(),
                index: BTreeMap::new(),
            }),
            subscriptions: RefCell::new(BTreeMap::new()),
            next_subscription: Cell::new(0),
            events: RefCell::new(VecDeque::new()),
        }
    }

    /// Viewport currently shown.
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.state.borrow().viewport
    }

    /// Number of the index snapshot currently rendered.
    #[must_use]
    pub fn snapshot(&self) -> u32 {
        self.state.borrow().snapshot
    }

    /// Moves the camera as a completed pan/zoom gesture would.
    pub fn jump_to(&self, viewport: Viewport) {
        let zoomed = {
            let mut state = self.state.borrow_mut();
            let zoomed = state.viewport.zoom != viewport.zoom;
            state.viewport = viewport;
            state.rebuild();
            zoomed
        };

        self.deliver(MapEvent::MoveEnd);
        if zoomed {
            self.deliver(MapEvent::ZoomEnd);
        }
        self.deliver(MapEvent::Idle);
    }

    /// Simulates a mouse-down or touch-start at a screen position.
    pub fn press(&self, kind: PointerKind, screen: Vec2) {
        self.deliver(MapEvent::PointerDown { kind, screen });
    }

    /// Simulates a mouse-up or touch-end at a screen position.
    pub fn release(&self, kind: PointerKind, screen: Vec2) {
        self.deliver(MapEvent::PointerUp { kind, screen });
    }

    /// Simulates the platform cancelling an ongoing touch.
    pub fn cancel_touch(&self) {
        self.deliver(MapEvent::TouchCancel);
    }

    /// Projects a coordinate onto the screen.
    #[must_use]
    pub fn project(&self, coordinate: Coordinate) -> Vec2 {
        Projection::new(&self.state.borrow().viewport).to_screen(coordinate)
    }

    /// Filter currently applied to a layer.
    #[must_use]
    pub fn filter(&self, layer: &LayerId) -> Option<Predicate> {
        self.state
            .borrow()
            .layers
            .iter()
            .find(|spec| spec.layer == *layer)
            .map(|spec| spec.filter.clone())
    }

    /// Layers in drawing order.
    #[must_use]
    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.state
            .borrow()
            .layers
            .iter()
            .map(|spec| spec.layer.clone())
            .collect()
    }

    /// Entities most recently handed to a source.
    #[must_use]
    pub fn source_entities(&self, source: &SourceId) -> Option<Vec<Entity>> {
        self.state
            .borrow()
            .sources
            .get(source)
            .map(|clustered| clustered.entities.clone())
    }

    /// Number of times a source's data was replaced since it was added.
    #[must_use]
    pub fn source_revision(&self, source: &SourceId) -> Option<u32> {
        self.state
            .borrow()
            .sources
            .get(source)
            .map(|clustered| clustered.revision)
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    fn deliver(&self, event: MapEvent) {
        let channel = event.channel();
        let subscribed = self
            .subscriptions
            .borrow()
            .values()
            .any(|listening| *listening == channel);
        if subscribed {
            self.events.borrow_mut().push_back(event);
        } else {
            trace!(?event, "dropping event without subscriber");
        }
    }
}

impl GridState {
    fn rebuild(&mut self) {
        self.snapshot = self.snapshot.wrapping_add(1);
        let projection = Projection::new(&self.viewport);
        let zoom = self.viewport.zoom;
        let snapshot = self.snapshot;
        // Ordinals run across every source so ids stay unique within a snapshot.
        let mut next_ordinal = 0_u32;
        self.index = self
            .sources
            .iter()
            .map(|(id, source)| {
                let index = cluster_source(source, &projection, zoom, snapshot, &mut next_ordinal);
                (id.clone(), index)
            })
            .collect();
        debug!(snapshot, zoom, "rebuilt cluster index");
    }

    fn in_bounds(&self, screen: Vec2) -> bool {
        let size = self.viewport.size;
        (0.0..=size.x).contains(&screen.x) && (0.0..=size.y).contains(&screen.y)
    }
}

fn cluster_source(
    source: &ClusteredSource,
    projection: &Projection,
    zoom: f64,
    snapshot: u32,
    next_ordinal: &mut u32,
) -> SourceIndex {
    let radius = f64::from(source.config.radius_px);
    let mut index = SourceIndex::default();

    if zoom >= f64::from(source.config.max_zoom) || radius <= 0.0 {
        index.features = source
            .entities
            .iter()
            .map(|entity| IndexedFeature {
                screen: projection.to_screen(entity.coordinate),
                feature: Feature::Point(entity.clone()),
            })
            .collect();
        return index;
    }

    let mut cells: BTreeMap<(i64, i64), Vec<&Entity>> = BTreeMap::new();
    for entity in &source.entities {
        let world = projection.world(entity.coordinate) / radius;
        cells
            .entry((world.x.floor() as i64, world.y.floor() as i64))
            .or_default()
            .push(entity);
    }

    for members in cells.into_values() {
        if let [entity] = members.as_slice() {
            index.features.push(IndexedFeature {
                screen: projection.to_screen(entity.coordinate),
                feature: Feature::Point((*entity).clone()),
            });
            continue;
        }

        let count = members.len() as f64;
        let lat = members.iter().map(|entity| entity.coordinate.lat()).sum::<f64>() / count;
        let lon = members.iter().map(|entity| entity.coordinate.lon()).sum::<f64>() / count;
        let coordinate = Coordinate::new(lat, lon);
        let id = ClusterId::new((u64::from(snapshot) << 32) | u64::from(*next_ordinal));
        *next_ordinal = next_ordinal.wrapping_add(1);

        index.features.push(IndexedFeature {
            screen: projection.to_screen(coordinate),
            feature: Feature::Cluster(ClusterFeature {
                id,
                point_count: u32::try_from(members.len()).unwrap_or(u32::MAX),
                coordinate,
            }),
        });
        let _ = index
            .members
            .insert(id, members.into_iter().cloned().collect());
    }

    index
}

impl MapEngine for GridEngine {
    fn add_clustered_source(
        &self,
        source: &SourceId,
        entities: &[Entity],
        config: ClusterConfig,
    ) -> Result<(), EngineError> {
        {
            let mut state = self.state.borrow_mut();
            if state.sources.contains_key(source) {
                return Err(EngineError::DuplicateSource(source.clone()));
            }
            let _ = state.sources.insert(
                source.clone(),
                ClusteredSource {
                    entities: entities.to_vec(),
                    config,
                    revision: 0,
                },
            );
            state.rebuild();
        }
        self.deliver(MapEvent::Idle);
        Ok(())
    }

    fn add_layer(&self, paint: PaintSpec) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        if !state.sources.contains_key(&paint.source) {
            return Err(EngineError::UnknownSource(paint.source));
        }
        if state.layers.iter().any(|spec| spec.layer == paint.layer) {
            return Err(EngineError::DuplicateLayer(paint.layer));
        }
        state.layers.push(paint);
        Ok(())
    }

    fn set_filter(&self, layer: &LayerId, predicate: Predicate) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        let spec = state
            .layers
            .iter_mut()
            .find(|spec| spec.layer == *layer)
            .ok_or_else(|| EngineError::UnknownLayer(layer.clone()))?;
        spec.filter = predicate;
        Ok(())
    }

    fn set_data(&self, source: &SourceId, entities: &[Entity]) -> Result<(), EngineError> {
        {
            let mut state = self.state.borrow_mut();
            let clustered = state
                .sources
                .get_mut(source)
                .ok_or_else(|| EngineError::UnknownSource(source.clone()))?;
            clustered.entities = entities.to_vec();
            clustered.revision = clustered.revision.wrapping_add(1);
            state.rebuild();
        }
        self.deliver(MapEvent::Idle);
        Ok(())
    }

    fn query_rendered_features(&self, region: QueryRegion, layers: &[LayerId]) -> Vec<Feature> {
        let state = self.state.borrow();
        let mut found = Vec::new();

        for layer in layers {
            let Some(spec) = state.layers.iter().find(|spec| spec.layer == *layer) else {
                continue;
            };
            let Some(index) = state.index.get(&spec.source) else {
                continue;
            };

            for item in &index.features {
                if !state.in_bounds(item.screen) || !spec.filter.matches(&item.feature) {
                    continue;
                }
                let hit = match region {
                    QueryRegion::Viewport => true,
                    QueryRegion::Point(point) => item.screen.distance(point) <= spec.radius_px,
                };
                if hit {
                    found.push(item.feature.clone());
                }
            }
        }

        found
    }

    async fn cluster_leaves(
        &self,
        cluster: ClusterId,
        limit: LeafLimit,
    ) -> Result<Vec<Feature>, ClusterExpansionError> {
        let state = self.state.borrow();
        let members = state
            .index
            .values()
            .find_map(|index| index.members.get(&cluster))
            .ok_or(ClusterExpansionError::MissingCluster { cluster })?;
        let take = match limit {
            LeafLimit::Unbounded => members.len(),
            LeafLimit::AtMost(limit) => limit.min(members.len()),
        };

        Ok(members
            .iter()
            .take(take)
            .cloned()
            .map(Feature::Point)
            .collect())
    }

    fn unproject(&self, screen: Vec2) -> Coordinate {
        Projection::new(&self.state.borrow().viewport).to_coordinate(screen)
    }

    fn zoom(&self) -> f64 {
        self.state.borrow().viewport.zoom
    }

    fn ease_to(&self, center: Coordinate, zoom: f64) {
        let viewport = Viewport {
            center,
            zoom,
            ..self.viewport()
        };
        self.jump_to(viewport);
    }

    fn subscribe(&self, channel: MapEventChannel) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_subscription.get());
        self.next_subscription.set(id.get().wrapping_add(1));
        let _ = self.subscriptions.borrow_mut().insert(id, channel);
        id
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        let removed = self.subscriptions.borrow_mut().remove(&subscription);
        if removed.is_some() {
            let still_listening: Vec<MapEventChannel> =
                self.subscriptions.borrow().values().copied().collect();
            self.events
                .borrow_mut()
                .retain(|event| still_listening.contains(&event.channel()));
        }
    }

    fn poll_event(&self) -> Option<MapEvent> {
        self.events.borrow_mut().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{layers, Category, LocationId, TreeId};

    fn viewport(zoom: f64) -> Viewport {
        Viewport {
            center: Coordinate::new(42.38, -71.09),
            zoom,
            size: Vec2::new(800.0, 600.0),
        }
    }

    fn tree(id: u64, category: &str, lat: f64, lon: f64) -> Entity {
        Entity {
            location_id: LocationId::new(id),
            tree_id: TreeId::new(1),
            category: Category::from(category),
            coordinate: Coordinate::new(lat, lon),
            source: "survey".to_owned(),
            is_native: true,
        }
    }

    fn engine_with(entities: &[Entity], zoom: f64) -> GridEngine {
        let engine = GridEngine::new(viewport(zoom));
        engine
            .add_clustered_source(&layers::TREES, entities, ClusterConfig::default())
            .expect("source added");
        for spec in layers::catalog() {
            engine.add_layer(spec).expect("layer added");
        }
        engine
    }

    fn sample() -> Vec<Entity> {
        vec![
            tree(1, "Oak", 42.38, -71.09),
            tree(2, "Elm", 42.38001, -71.09001),
            tree(3, "Oak", 42.38, -71.075),
        ]
    }

    #[test]
    fn nearby_entities_merge_into_a_cluster() {
        let engine = engine_with(&sample(), 12.0);

        let clusters = engine.query_rendered_features(QueryRegion::Viewport, &[layers::CLUSTERS]);
        let points = engine.query_rendered_features(QueryRegion::Viewport, &[layers::POINTS]);

        assert_eq!(clusters.len(), 1);
        assert!(matches!(
            clusters[0],
            Feature::Cluster(ClusterFeature { point_count: 2, .. })
        ));
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn clustering_stops_at_max_zoom() {
        let engine = engine_with(&sample(), 14.0);

        let clusters = engine.query_rendered_features(QueryRegion::Viewport, &[layers::CLUSTERS]);
        let points = engine.query_rendered_features(QueryRegion::Viewport, &[layers::POINTS]);

        assert!(clusters.is_empty());
        assert_eq!(points.len(), 3);
    }

    #[test]
    fn point_query_hits_only_features_under_the_pointer() {
        let engine = engine_with(&sample(), 14.0);
        let screen = engine.project(Coordinate::new(42.38, -71.075));

        let hit = engine.query_rendered_features(QueryRegion::Point(screen), &layers::INTERACTIVE);
        let miss = engine.query_rendered_features(
            QueryRegion::Point(screen + Vec2::new(40.0, 40.0)),
            &layers::INTERACTIVE,
        );

        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].key(), canopy_core::FeatureKey::Point(LocationId::new(3)));
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn cluster_leaves_resolve_from_the_current_snapshot() {
        let engine = engine_with(&sample(), 12.0);
        let clusters = engine.query_rendered_features(QueryRegion::Viewport, &[layers::CLUSTERS]);
        let Feature::Cluster(cluster) = &clusters[0] else {
            panic!("expected a cluster");
        };

        let leaves = engine
            .cluster_leaves(cluster.id, LeafLimit::Unbounded)
            .await
            .expect("cluster resolves");
        let limited = engine
            .cluster_leaves(cluster.id, LeafLimit::AtMost(1))
            .await
            .expect("cluster resolves");

        assert_eq!(leaves.len(), 2);
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn stale_cluster_identifiers_fail_after_a_rebuild() {
        let engine = engine_with(&sample(), 12.0);
        let clusters = engine.query_rendered_features(QueryRegion::Viewport, &[layers::CLUSTERS]);
        let Feature::Cluster(cluster) = &clusters[0] else {
            panic!("expected a cluster");
        };

        engine.jump_to(viewport(12.5));
        let result = engine.cluster_leaves(cluster.id, LeafLimit::Unbounded).await;

        assert_eq!(
            result,
            Err(ClusterExpansionError::MissingCluster {
                cluster: cluster.id
            })
        );
    }

    #[tokio::test]
    async fn clusters_of_different_sources_never_share_identifiers() {
        let saplings = SourceId::from_static("saplings");
        let sapling_clusters = LayerId::from_static("sapling-clusters");
        let engine = engine_with(&sample(), 12.0);
        let young: Vec<Entity> = sample()
            .into_iter()
            .map(|entity| Entity {
                location_id: LocationId::new(entity.location_id.get() + 100),
                ..entity
            })
            .collect();
        engine
            .add_clustered_source(&saplings, &young, ClusterConfig::default())
            .expect("second source added");
        let base = layers::catalog()
            .into_iter()
            .find(|paint| paint.layer == layers::CLUSTERS)
            .expect("catalog draws clusters");
        engine
            .add_layer(PaintSpec {
                layer: sapling_clusters.clone(),
                source: saplings,
                ..base
            })
            .expect("layer added");

        let ids: Vec<ClusterId> = engine
            .query_rendered_features(QueryRegion::Viewport, &[layers::CLUSTERS, sapling_clusters])
            .into_iter()
            .filter_map(|feature| match feature {
                Feature::Cluster(cluster) => Some(cluster.id),
                Feature::Point(_) => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let mut members = Vec::new();
        for id in ids {
            let leaves = engine
                .cluster_leaves(id, LeafLimit::Unbounded)
                .await
                .expect("cluster resolves");
            members.push(leaves.iter().map(Feature::key).collect::<Vec<_>>());
        }
        assert_ne!(members[0], members[1], "each cluster expands to its own source");
    }

    #[test]
    fn filters_drive_overlay_layers() {
        let engine = engine_with(&sample(), 14.0);
        assert!(engine
            .query_rendered_features(QueryRegion::Viewport, &[layers::HIGHLIGHTED_POINTS])
            .is_empty());

        engine
            .set_filter(
                &layers::HIGHLIGHTED_POINTS,
                Predicate::CategoryEquals(Category::from("Oak")),
            )
            .expect("layer exists");

        let highlighted =
            engine.query_rendered_features(QueryRegion::Viewport, &[layers::HIGHLIGHTED_POINTS]);
        assert_eq!(highlighted.len(), 2);
    }

    #[test]
    fn events_are_only_delivered_to_subscribed_channels() {
        let engine = engine_with(&sample(), 12.0);
        engine.press(PointerKind::Mouse, Vec2::ZERO);
        assert_eq!(engine.poll_event(), None);

        let subscription = engine.subscribe(MapEventChannel::Pointer);
        engine.press(PointerKind::Touch, Vec2::ONE);
        engine.jump_to(viewport(13.0));

        assert_eq!(
            engine.poll_event(),
            Some(MapEvent::PointerDown {
                kind: PointerKind::Touch,
                screen: Vec2::ONE
            })
        );
        assert_eq!(engine.poll_event(), None);

        engine.unsubscribe(subscription);
        engine.press(PointerKind::Mouse, Vec2::ZERO);
        assert_eq!(engine.poll_event(), None);
        assert_eq!(engine.subscription_count(), 0);
    }

    #[test]
    fn set_data_rejects_unknown_sources() {
        let engine = GridEngine::new(viewport(12.0));

        assert_eq!(
            engine.set_data(&layers::TREES, &[]),
            Err(EngineError::UnknownSource(layers::TREES))
        );
    }
}
