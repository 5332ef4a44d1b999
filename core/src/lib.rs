#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Canopy tree map.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and the view-synchronization systems. Adapters and
//! systems submit [`Command`] values describing desired mutations, the world
//! executes those commands via its `apply` entry point, and then broadcasts
//! [`Event`] values for systems to react to. Systems consume event streams,
//! query read-only snapshots, talk to the rendering engine through
//! [`MapEngine`] and to the backend through [`RemoteApi`], and respond
//! exclusively with new command batches.

use std::fmt;

use serde::{Deserialize, Serialize};

mod engine;
pub mod layers;
mod remote;

pub use engine::{
    ClusterConfig, ClusterExpansionError, Color, EngineError, LayerId, LayerKind, LeafLimit,
    MapEngine, MapEvent, MapEventChannel, PaintSpec, PointerKind, Predicate, QueryRegion,
    SourceId, SubscriptionId, Viewport,
};
pub use remote::{RemoteApi, RemoteError};

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Replaces the entity collection with the records fetched at startup.
    LoadEntities {
        /// Entities returned by the remote API.
        entities: Vec<Entity>,
    },
    /// Replaces the species catalog with the records fetched at startup.
    LoadSpecies {
        /// Species reference records returned by the remote API.
        species: Vec<Species>,
    },
    /// Appends a server-confirmed entity to the collection.
    InsertEntity {
        /// Entity carrying its server-assigned identity.
        entity: Entity,
    },
    /// Removes an entity from the collection by identity.
    RemoveEntity {
        /// Identity of the entity to remove.
        location_id: LocationId,
    },
    /// Opens the detail popup for an entity, replacing any popup already open.
    OpenPopup {
        /// Identity of the entity the popup describes.
        location_id: LocationId,
    },
    /// Dismisses the detail popup if one is open.
    ClosePopup,
    /// Opens the entity-creation form pre-filled with a coordinate.
    OpenCreationForm {
        /// Geographic coordinate captured when the long press started.
        coordinate: Coordinate,
    },
    /// Dismisses the entity-creation form if one is pending.
    DismissCreationForm,
    /// Publishes a user-facing notice, replacing the previous one.
    PostNotice {
        /// Notice presented to the user.
        notice: Notice,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Confirms that the entity collection was replaced.
    EntitiesLoaded {
        /// Number of entities now held by the collection.
        count: usize,
    },
    /// Confirms that the species catalog was replaced.
    SpeciesLoaded {
        /// Number of species now held by the catalog.
        count: usize,
    },
    /// Confirms that an entity was appended to the collection.
    EntityInserted {
        /// Identity of the inserted entity.
        location_id: LocationId,
    },
    /// Reports that an insertion was refused because the identity already exists.
    InsertionRejected {
        /// Identity that collided with an existing entity.
        location_id: LocationId,
    },
    /// Confirms that an entity was removed from the collection.
    EntityRemoved {
        /// Identity of the removed entity.
        location_id: LocationId,
    },
    /// Announces that the detail popup now shows an entity.
    PopupOpened {
        /// Identity of the entity shown.
        location_id: LocationId,
        /// Anchor coordinate of the popup.
        coordinate: Coordinate,
    },
    /// Announces that the detail popup was dismissed.
    PopupClosed {
        /// Identity of the entity the popup was showing.
        location_id: LocationId,
    },
    /// Announces that the creation form opened at a coordinate.
    CreationFormOpened {
        /// Coordinate pre-filled into the form.
        coordinate: Coordinate,
    },
    /// Announces that the creation form was dismissed.
    CreationFormDismissed,
    /// Announces that a new user-facing notice was posted.
    NoticePosted {
        /// Notice presented to the user.
        notice: Notice,
    },
}

/// Stable identity of a single tree location.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LocationId(u64);

impl LocationId {
    /// Creates a new location identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc-{}", self.0)
    }
}

/// Foreign key into the species catalog.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TreeId(u32);

impl TreeId {
    /// Creates a new species key with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the key.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Display grouping key used by the sidebar and the highlight overlay.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Creates a category from its display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Display name of the category.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Geographic position expressed in WGS84 degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    /// Creates a new coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn lon(&self) -> f64 {
        self.lon
    }

    /// Reports whether the coordinate lies within the valid WGS84 range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A geocoded record representing one tree instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Server-assigned identity of the location.
    pub location_id: LocationId,
    /// Species the tree belongs to.
    pub tree_id: TreeId,
    /// Display grouping key, usually the common name.
    pub category: Category,
    /// Geographic position of the tree.
    pub coordinate: Coordinate,
    /// Provenance of the record.
    pub source: String,
    /// Whether the species is native to the region.
    pub is_native: bool,
}

/// Entity submitted by the creation form before the server assigns an identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCandidate {
    /// Species the tree belongs to.
    pub tree_id: TreeId,
    /// Display grouping key, usually the common name.
    pub category: Category,
    /// Geographic position of the tree.
    pub coordinate: Coordinate,
    /// Provenance of the record.
    pub source: String,
    /// Whether the species is native to the region.
    pub is_native: bool,
}

impl EntityCandidate {
    /// Promotes the candidate into an entity carrying the provided identity.
    #[must_use]
    pub fn confirm(self, location_id: LocationId) -> Entity {
        Entity {
            location_id,
            tree_id: self.tree_id,
            category: self.category,
            coordinate: self.coordinate,
            source: self.source,
            is_native: self.is_native,
        }
    }
}

/// Read-only descriptive metadata for a species.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Species {
    /// Key referenced by entities.
    pub tree_id: TreeId,
    /// Scientific family the species belongs to.
    pub family: String,
    /// Conservation status label.
    pub conservation_status: String,
}

/// Opaque identifier of a cluster within one rendering engine index snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(u64);

impl ClusterId {
    /// Creates a new cluster identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster-{:#x}", self.0)
    }
}

/// Aggregated map representation of several nearby entities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterFeature {
    /// Identifier valid for the index snapshot that produced the cluster.
    pub id: ClusterId,
    /// Approximate number of entities represented by the cluster.
    pub point_count: u32,
    /// Anchor coordinate of the cluster marker.
    pub coordinate: Coordinate,
}

/// Feature produced by the rendering engine for the current viewport.
#[derive(Clone, Debug, PartialEq)]
pub enum Feature {
    /// Marker wrapping exactly one entity.
    Point(Entity),
    /// Marker standing in for several entities.
    Cluster(ClusterFeature),
}

impl Feature {
    /// Identity of the feature used for set membership.
    #[must_use]
    pub fn key(&self) -> FeatureKey {
        match self {
            Self::Point(entity) => FeatureKey::Point(entity.location_id),
            Self::Cluster(cluster) => FeatureKey::Cluster(cluster.id),
        }
    }

    /// Anchor coordinate of the feature.
    #[must_use]
    pub fn coordinate(&self) -> Coordinate {
        match self {
            Self::Point(entity) => entity.coordinate,
            Self::Cluster(cluster) => cluster.coordinate,
        }
    }

    /// Returns the wrapped entity for point features.
    #[must_use]
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Self::Point(entity) => Some(entity),
            Self::Cluster(_) => None,
        }
    }
}

/// Identity of a rendered feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKey {
    /// Point feature keyed by the entity it wraps.
    Point(LocationId),
    /// Cluster feature keyed by its snapshot-scoped identifier.
    Cluster(ClusterId),
}

/// Detail popup currently shown on the map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Popup {
    /// Entity described by the popup.
    pub location_id: LocationId,
    /// Anchor coordinate of the popup.
    pub coordinate: Coordinate,
}

/// User-facing notices raised by the interaction layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// The creation form submission was rejected by the server.
    ValidationFailed {
        /// Server-provided explanation shown inline in the form.
        message: String,
    },
    /// The remote API could not be reached.
    NetworkFailed {
        /// Human readable description of the failure.
        message: String,
    },
    /// A removal was abandoned because nobody confirmed it.
    RemovalCancelled {
        /// Entity that was left in place.
        location_id: LocationId,
    },
    /// A tree was added to the map.
    EntityAdded {
        /// Identity assigned by the server.
        location_id: LocationId,
    },
    /// A tree was removed from the map.
    EntityRemoved {
        /// Identity of the removed entity.
        location_id: LocationId,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed { message } => write!(f, "could not add tree: {message}"),
            Self::NetworkFailed { message } => write!(f, "network error: {message}"),
            Self::RemovalCancelled { location_id } => {
                write!(f, "removal of {location_id} cancelled")
            }
            Self::EntityAdded { location_id } => write!(f, "added {location_id}"),
            Self::EntityRemoved { location_id } => write!(f, "removed {location_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Category, Coordinate, Entity, EntityCandidate, Feature, FeatureKey, LocationId, TreeId,
    };

    fn red_maple() -> EntityCandidate {
        EntityCandidate {
            tree_id: TreeId::new(7),
            category: Category::from("Red Maple"),
            coordinate: Coordinate::new(42.38, -71.09),
            source: "survey".to_owned(),
            is_native: true,
        }
    }

    #[test]
    fn entity_round_trips_through_bincode() {
        let entity = red_maple().confirm(LocationId::new(11));
        let bytes = bincode::serialize(&entity).expect("serialize");
        let restored: Entity = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(restored, entity);
    }

    #[test]
    fn confirm_keeps_candidate_fields() {
        let entity = red_maple().confirm(LocationId::new(3));

        assert_eq!(entity.location_id, LocationId::new(3));
        assert_eq!(entity.category.as_str(), "Red Maple");
        assert_eq!(entity.coordinate, Coordinate::new(42.38, -71.09));
    }

    #[test]
    fn point_feature_key_uses_location_identity() {
        let feature = Feature::Point(red_maple().confirm(LocationId::new(5)));
        assert_eq!(feature.key(), FeatureKey::Point(LocationId::new(5)));
    }

    #[test]
    fn coordinate_validation_rejects_out_of_range_values() {
        assert!(Coordinate::new(42.38, -71.09).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }
}
