#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! In-memory stand-in for the Canopy tree API.
//!
//! [`MemoryRemote`] answers the [`RemoteApi`] contract from a [`Dataset`]
//! held in process. It assigns server identities, validates submissions the
//! way the real service does, can be switched offline to exercise network
//! failures, and records every delete request it receives.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use canopy_core::{
    Category, Coordinate, Entity, EntityCandidate, LocationId, RemoteApi, RemoteError, Species,
    TreeId,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Spread, in degrees, of synthetic trees around the requested center.
const SYNTHETIC_SPREAD_DEGREES: f64 = 0.02;

/// Species used when generating synthetic datasets.
const SYNTHETIC_SPECIES: [(u32, &str, &str, &str, bool); 8] = [
    (1, "Red Maple", "Sapindaceae", "Least Concern", true),
    (2, "Pin Oak", "Fagaceae", "Least Concern", true),
    (3, "Honeylocust", "Fabaceae", "Least Concern", true),
    (4, "Littleleaf Linden", "Malvaceae", "Least Concern", false),
    (5, "London Planetree", "Platanaceae", "Least Concern", false),
    (6, "Norway Maple", "Sapindaceae", "Least Concern", false),
    (7, "Ginkgo", "Ginkgoaceae", "Endangered", false),
    (8, "American Elm", "Ulmaceae", "Vulnerable", true),
];

/// Snapshot of everything the remote API serves.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Species reference catalog.
    pub species: Vec<Species>,
    /// Tree locations.
    pub entities: Vec<Entity>,
}

impl Dataset {
    /// Parses a dataset from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse tree dataset json")
    }

    /// Reads a dataset from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read tree dataset {}", path.display()))?;
        Self::from_json(&contents)
    }

    /// Generates a deterministic dataset scattered around a center.
    #[must_use]
    pub fn synthetic(seed: u64, count: usize, center: Coordinate) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let species = SYNTHETIC_SPECIES
            .iter()
            .map(|(id, _, family, status, _)| Species {
                tree_id: TreeId::new(*id),
                family: (*family).to_owned(),
                conservation_status: (*status).to_owned(),
            })
            .collect();

        let entities = (0..count)
            .map(|index| {
                let (id, name, _, _, native) =
                    SYNTHETIC_SPECIES[rng.gen_range(0..SYNTHETIC_SPECIES.len())];
                let lat = center.lat()
                    + rng.gen_range(-SYNTHETIC_SPREAD_DEGREES..SYNTHETIC_SPREAD_DEGREES);
                let lon = center.lon()
                    + rng.gen_range(-SYNTHETIC_SPREAD_DEGREES..SYNTHETIC_SPREAD_DEGREES);
                Entity {
                    location_id: LocationId::new(index as u64 + 1),
                    tree_id: TreeId::new(id),
                    category: Category::from(name),
                    coordinate: Coordinate::new(lat, lon),
                    source: "synthetic".to_owned(),
                    is_native: native,
                }
            })
            .collect();

        Self { species, entities }
    }
}

/// Delete request received by [`MemoryRemote`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deletion {
    /// Entity the request targeted.
    pub location_id: LocationId,
    /// Name that confirmed the removal.
    pub confirmed_by: String,
}

/// Remote API backed by an in-memory dataset.
#[derive(Debug)]
pub struct MemoryRemote {
    entities: RefCell<Vec<Entity>>,
    species: BTreeMap<TreeId, Species>,
    next_id: Cell<u64>,
    online: Cell<bool>,
    deletions: RefCell<Vec<Deletion>>,
}

impl MemoryRemote {
    /// Creates a remote serving the provided dataset.
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        let next_id = dataset
            .entities
            .iter()
            .map(|entity| entity.location_id.get())
            .max()
            .unwrap_or(0)
            + 1;
        let species = dataset
            .species
            .into_iter()
            .map(|record| (record.tree_id, record))
            .collect();

        Self {
            entities: RefCell::new(dataset.entities),
            species,
            next_id: Cell::new(next_id),
            online: Cell::new(true),
            deletions: RefCell::new(Vec::new()),
        }
    }

    /// Simulates losing or regaining connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.set(online);
    }

    /// Every delete request received so far.
    #[must_use]
    pub fn deletions(&self) -> Vec<Deletion> {
        self.deletions.borrow().clone()
    }

    /// Number of entities the server currently stores.
    #[must_use]
    pub fn stored_count(&self) -> usize {
        self.entities.borrow().len()
    }

    fn ensure_online(&self) -> Result<(), RemoteError> {
        if self.online.get() {
            Ok(())
        } else {
            Err(RemoteError::Network("tree service unreachable".to_owned()))
        }
    }

    fn validate(&self, candidate: &EntityCandidate) -> Result<(), RemoteError> {
        if candidate.category.as_str().trim().is_empty() {
            return Err(RemoteError::Validation {
                field: "category",
                message: "a common name is required".to_owned(),
            });
        }
        if !candidate.coordinate.is_valid() {
            return Err(RemoteError::Validation {
                field: "coordinate",
                message: "latitude or longitude out of range".to_owned(),
            });
        }
        if !self.species.contains_key(&candidate.tree_id) {
            return Err(RemoteError::Validation {
                field: "treeId",
                message: format!("unknown species {}", candidate.tree_id.get()),
            });
        }
        Ok(())
    }
}

impl RemoteApi for MemoryRemote {
    async fn fetch_entities(&self) -> Result<Vec<Entity>, RemoteError> {
        self.ensure_online()?;
        Ok(self.entities.borrow().clone())
    }

    async fn fetch_species(&self) -> Result<BTreeMap<TreeId, Species>, RemoteError> {
        self.ensure_online()?;
        Ok(self.species.clone())
    }

    async fn create_entity(&self, candidate: &EntityCandidate) -> Result<Entity, RemoteError> {
        self.ensure_online()?;
        self.validate(candidate)?;

        let location_id = LocationId::new(self.next_id.get());
        self.next_id.set(location_id.get() + 1);
        let entity = candidate.clone().confirm(location_id);
        self.entities.borrow_mut().push(entity.clone());
        info!(%location_id, category = %entity.category, "stored new tree");
        Ok(entity)
    }

    async fn delete_entity(
        &self,
        location_id: LocationId,
        confirmed_by: &str,
    ) -> Result<(), RemoteError> {
        self.ensure_online()?;
        self.deletions.borrow_mut().push(Deletion {
            location_id,
            confirmed_by: confirmed_by.to_owned(),
        });
        let mut entities = self.entities.borrow_mut();
        let before = entities.len();
        entities.retain(|entity| entity.location_id != location_id);
        if entities.len() == before {
            debug!(%location_id, "delete of unknown tree treated as success");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> EntityCandidate {
        EntityCandidate {
            tree_id: TreeId::new(1),
            category: Category::from("Red Maple"),
            coordinate: Coordinate::new(42.38, -71.09),
            source: "field survey".to_owned(),
            is_native: true,
        }
    }

    fn remote() -> MemoryRemote {
        MemoryRemote::new(Dataset::synthetic(7, 10, Coordinate::new(42.38, -71.09)))
    }

    #[test]
    fn synthetic_datasets_are_deterministic() {
        let center = Coordinate::new(42.38, -71.09);
        assert_eq!(
            Dataset::synthetic(3, 25, center),
            Dataset::synthetic(3, 25, center)
        );
        assert_ne!(
            Dataset::synthetic(3, 25, center),
            Dataset::synthetic(4, 25, center)
        );
    }

    #[test]
    fn dataset_parses_camel_case_json() {
        let json = r#"{
            "species": [
                {"treeId": 1, "family": "Sapindaceae", "conservationStatus": "Least Concern"}
            ],
            "entities": [
                {
                    "locationId": 10,
                    "treeId": 1,
                    "category": "Red Maple",
                    "coordinate": {"lat": 42.38, "lon": -71.09},
                    "source": "city inventory",
                    "isNative": true
                }
            ]
        }"#;

        let dataset = Dataset::from_json(json).expect("valid dataset");

        assert_eq!(dataset.entities[0].location_id, LocationId::new(10));
        assert_eq!(dataset.entities[0].category.as_str(), "Red Maple");
        assert_eq!(dataset.species[0].family, "Sapindaceae");
    }

    #[tokio::test]
    async fn create_assigns_the_next_identity() {
        let remote = remote();

        let entity = remote.create_entity(&candidate()).await.expect("created");

        assert_eq!(entity.location_id, LocationId::new(11));
        assert_eq!(remote.stored_count(), 11);
    }

    #[tokio::test]
    async fn create_rejects_unknown_species() {
        let remote = remote();
        let mut invalid = candidate();
        invalid.tree_id = TreeId::new(999);

        let error = remote.create_entity(&invalid).await.expect_err("rejected");

        assert!(matches!(
            error,
            RemoteError::Validation {
                field: "treeId",
                ..
            }
        ));
        assert_eq!(remote.stored_count(), 10);
    }

    #[tokio::test]
    async fn offline_remote_reports_network_errors() {
        let remote = remote();
        remote.set_online(false);

        assert!(matches!(
            remote.fetch_entities().await,
            Err(RemoteError::Network(_))
        ));
        assert!(matches!(
            remote.delete_entity(LocationId::new(1), "Ada").await,
            Err(RemoteError::Network(_))
        ));
        assert!(remote.deletions().is_empty());
    }

    #[tokio::test]
    async fn delete_records_the_confirming_name() {
        let remote = remote();

        remote
            .delete_entity(LocationId::new(2), "Ada")
            .await
            .expect("deleted");

        assert_eq!(
            remote.deletions(),
            vec![Deletion {
                location_id: LocationId::new(2),
                confirmed_by: "Ada".to_owned(),
            }]
        );
        assert_eq!(remote.stored_count(), 9);
    }
}
