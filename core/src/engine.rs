//! Capability contract of the rendering engine.
//!
//! The view-synchronization systems never talk to a concrete map library.
//! They describe sources, layers and filters through the types in this module
//! and ask the engine for rendered features and cluster members through
//! [`MapEngine`]. All methods take `&self` because the engine is a shared
//! handle on a single-threaded event loop; implementations keep their state
//! behind interior mutability.

use std::{borrow::Cow, collections::BTreeSet, fmt, future::Future};

use glam::Vec2;
use thiserror::Error;

use crate::{Category, ClusterId, Coordinate, Entity, Feature};

/// Name of a data source registered with the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Cow<'static, str>);

impl SourceId {
    /// Creates a source identifier from a static name.
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Name of the source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a paint layer registered with the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(Cow<'static, str>);

impl LayerId {
    /// Creates a layer identifier from a static name.
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Name of the layer.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Clustering parameters attached to a clustered source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterConfig {
    /// Screen-space radius, in pixels, within which entities merge.
    pub radius_px: f32,
    /// Zoom level at and above which clustering stops.
    pub max_zoom: u8,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius_px: 50.0,
            max_zoom: 14,
        }
    }
}

/// RGBA color used by paint layers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    /// Red channel intensity in the range 0.0..=1.0.
    pub red: f32,
    /// Green channel intensity in the range 0.0..=1.0.
    pub green: f32,
    /// Blue channel intensity in the range 0.0..=1.0.
    pub blue: f32,
    /// Alpha channel intensity in the range 0.0..=1.0.
    pub alpha: f32,
}

impl Color {
    /// Creates an opaque color from byte RGB values.
    #[must_use]
    pub const fn from_rgb_u8(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red: red as f32 / 255.0,
            green: green as f32 / 255.0,
            blue: blue as f32 / 255.0,
            alpha: 1.0,
        }
    }
}

/// Primitive drawn by a paint layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Filled circle per feature.
    Circle,
    /// Text label per feature, used for cluster counts.
    Label,
}

/// Declarative description of a paint layer.
#[derive(Clone, Debug, PartialEq)]
pub struct PaintSpec {
    /// Identifier of the layer.
    pub layer: LayerId,
    /// Source the layer draws from.
    pub source: SourceId,
    /// Primitive drawn for each matching feature.
    pub kind: LayerKind,
    /// Fill color of the primitive.
    pub color: Color,
    /// Radius of the primitive in pixels, also used for hit testing.
    pub radius_px: f32,
    /// Initial filter deciding which features the layer draws.
    pub filter: Predicate,
}

/// Feature filter evaluated by the engine for a layer.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Predicate {
    /// Every feature matches.
    MatchAll,
    /// No feature matches.
    #[default]
    MatchNone,
    /// Only cluster features match.
    Clustered,
    /// Only point features match.
    Unclustered,
    /// Point features whose entity carries the category match.
    CategoryEquals(Category),
    /// Cluster features whose identifier belongs to the set match.
    ClusterIn(BTreeSet<ClusterId>),
}

impl Predicate {
    /// Evaluates the predicate against a rendered feature.
    #[must_use]
    pub fn matches(&self, feature: &Feature) -> bool {
        match (self, feature) {
            (Self::MatchAll, _) => true,
            (Self::MatchNone, _) => false,
            (Self::Clustered, feature) => matches!(feature, Feature::Cluster(_)),
            (Self::Unclustered, feature) => matches!(feature, Feature::Point(_)),
            (Self::CategoryEquals(category), Feature::Point(entity)) => {
                entity.category == *category
            }
            (Self::CategoryEquals(_), Feature::Cluster(_)) => false,
            (Self::ClusterIn(ids), Feature::Cluster(cluster)) => ids.contains(&cluster.id),
            (Self::ClusterIn(_), Feature::Point(_)) => false,
        }
    }
}

/// Visible region of the map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Geographic coordinate at the center of the screen.
    pub center: Coordinate,
    /// Fractional zoom level.
    pub zoom: f64,
    /// Size of the rendering surface in pixels.
    pub size: Vec2,
}

/// Region passed to [`MapEngine::query_rendered_features`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QueryRegion {
    /// Entire visible viewport.
    Viewport,
    /// Features drawn under a screen position, in pixels from the top left.
    Point(Vec2),
}

/// Upper bound on the number of leaves returned for a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafLimit {
    /// Every descendant leaf of the cluster.
    Unbounded,
    /// At most the given number of leaves.
    AtMost(usize),
}

/// Input device that produced a pointer event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// Mouse button.
    Mouse,
    /// Touch contact.
    Touch,
}

/// Event stream a subscription listens to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapEventChannel {
    /// Mouse and touch press, release and cancel.
    Pointer,
    /// Pan and zoom settle notifications.
    Viewport,
    /// Render loop notifications.
    Render,
}

/// Notification delivered by the engine to subscribed listeners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MapEvent {
    /// Mouse-down or touch-start.
    PointerDown {
        /// Device that produced the event.
        kind: PointerKind,
        /// Screen position of the press.
        screen: Vec2,
    },
    /// Mouse-up or touch-end.
    PointerUp {
        /// Device that produced the event.
        kind: PointerKind,
        /// Screen position of the release.
        screen: Vec2,
    },
    /// Touch-cancel raised by the platform.
    TouchCancel,
    /// Panning finished.
    MoveEnd,
    /// Zooming finished.
    ZoomEnd,
    /// The engine finished rendering and has no pending work.
    Idle,
}

impl MapEvent {
    /// Channel the event is delivered on.
    #[must_use]
    pub const fn channel(&self) -> MapEventChannel {
        match self {
            Self::PointerDown { .. } | Self::PointerUp { .. } | Self::TouchCancel => {
                MapEventChannel::Pointer
            }
            Self::MoveEnd | Self::ZoomEnd => MapEventChannel::Viewport,
            Self::Idle => MapEventChannel::Render,
        }
    }
}

/// Handle returned by [`MapEngine::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    /// Creates a new subscription handle with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the handle.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Failure to resolve the members of a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClusterExpansionError {
    /// The engine's current index does not contain the cluster, usually
    /// because the index was rebuilt after the identifier was handed out.
    #[error("{cluster} is not part of the current cluster index")]
    MissingCluster {
        /// Identifier that could not be resolved.
        cluster: ClusterId,
    },
}

/// Failures reported by engine mutations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The referenced source has not been added.
    #[error("unknown source `{0}`")]
    UnknownSource(SourceId),
    /// The referenced layer has not been added.
    #[error("unknown layer `{0}`")]
    UnknownLayer(LayerId),
    /// A source with the same identifier already exists.
    #[error("source `{0}` already exists")]
    DuplicateSource(SourceId),
    /// A layer with the same identifier already exists.
    #[error("layer `{0}` already exists")]
    DuplicateLayer(LayerId),
}

/// Rendering engine capabilities consumed by the view-synchronization systems.
pub trait MapEngine {
    /// Registers a source whose entities are clustered by the engine.
    fn add_clustered_source(
        &self,
        source: &SourceId,
        entities: &[Entity],
        config: ClusterConfig,
    ) -> Result<(), EngineError>;

    /// Registers a paint layer drawing from an existing source.
    fn add_layer(&self, paint: PaintSpec) -> Result<(), EngineError>;

    /// Replaces the filter of an existing layer.
    fn set_filter(&self, layer: &LayerId, predicate: Predicate) -> Result<(), EngineError>;

    /// Replaces the entities of an existing source and re-clusters them.
    fn set_data(&self, source: &SourceId, entities: &[Entity]) -> Result<(), EngineError>;

    /// Returns the features currently drawn by the given layers inside the region.
    ///
    /// The same feature may be reported more than once when several layers
    /// draw it.
    fn query_rendered_features(&self, region: QueryRegion, layers: &[LayerId]) -> Vec<Feature>;

    /// Resolves the leaf entities of a cluster from the current index snapshot.
    fn cluster_leaves(
        &self,
        cluster: ClusterId,
        limit: LeafLimit,
    ) -> impl Future<Output = Result<Vec<Feature>, ClusterExpansionError>>;

    /// Converts a screen position into a geographic coordinate.
    fn unproject(&self, screen: Vec2) -> Coordinate;

    /// Current zoom level.
    fn zoom(&self) -> f64;

    /// Moves the camera to a new center and zoom.
    fn ease_to(&self, center: Coordinate, zoom: f64);

    /// Starts delivering events of a channel.
    fn subscribe(&self, channel: MapEventChannel) -> SubscriptionId;

    /// Stops delivering events for a subscription.
    fn unsubscribe(&self, subscription: SubscriptionId);

    /// Pops the next event delivered to an active subscription.
    fn poll_event(&self) -> Option<MapEvent>;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::Predicate;
    use crate::{
        Category, ClusterFeature, ClusterId, Coordinate, Entity, Feature, LocationId, TreeId,
    };

    fn point(category: &str) -> Feature {
        Feature::Point(Entity {
            location_id: LocationId::new(1),
            tree_id: TreeId::new(1),
            category: Category::from(category),
            coordinate: Coordinate::new(0.0, 0.0),
            source: "test".to_owned(),
            is_native: false,
        })
    }

    fn cluster(id: u64) -> Feature {
        Feature::Cluster(ClusterFeature {
            id: ClusterId::new(id),
            point_count: 2,
            coordinate: Coordinate::new(0.0, 0.0),
        })
    }

    #[test]
    fn category_predicate_only_matches_points() {
        let predicate = Predicate::CategoryEquals(Category::from("Oak"));

        assert!(predicate.matches(&point("Oak")));
        assert!(!predicate.matches(&point("Elm")));
        assert!(!predicate.matches(&cluster(1)));
    }

    #[test]
    fn cluster_set_predicate_only_matches_listed_clusters() {
        let predicate = Predicate::ClusterIn(BTreeSet::from([ClusterId::new(4)]));

        assert!(predicate.matches(&cluster(4)));
        assert!(!predicate.matches(&cluster(5)));
        assert!(!predicate.matches(&point("Oak")));
    }

    #[test]
    fn empty_match_predicate_is_the_default() {
        assert_eq!(Predicate::default(), Predicate::MatchNone);
        assert!(!Predicate::default().matches(&point("Oak")));
    }
}
