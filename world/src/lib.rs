#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative client-side state of the Canopy map.
//!
//! The world owns the entity collection fed to the rendering engine, the
//! species catalog, the single detail popup slot, the single creation form
//! slot and the latest user-facing notice. It only changes through [`apply`].

use std::collections::BTreeMap;

use canopy_core::{
    Command, Coordinate, Entity, Event, LocationId, Notice, Popup, Species, TreeId,
};

/// Represents the authoritative Canopy world state.
#[derive(Debug, Default)]
pub struct World {
    entities: Vec<Entity>,
    species: BTreeMap<TreeId, Species>,
    popup: Option<Popup>,
    creation_form: Option<Coordinate>,
    notice: Option<Notice>,
}

impl World {
    /// Creates an empty world awaiting the startup fetch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entity_index(&self, location_id: LocationId) -> Option<usize> {
        self.entities
            .iter()
            .position(|entity| entity.location_id == location_id)
    }

    fn close_popup_showing(&mut self, location_id: LocationId, out_events: &mut Vec<Event>) {
        if self
            .popup
            .is_some_and(|popup| popup.location_id == location_id)
        {
            self.popup = None;
            out_events.push(Event::PopupClosed { location_id });
        }
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::LoadEntities { entities } => {
            let mut loaded: Vec<Entity> = Vec::with_capacity(entities.len());
            for entity in entities {
                if loaded
                    .iter()
                    .all(|existing| existing.location_id != entity.location_id)
                {
                    loaded.push(entity);
                }
            }
            world.entities = loaded;

            if let Some(popup) = world.popup {
                if world.entity_index(popup.location_id).is_none() {
                    world.close_popup_showing(popup.location_id, out_events);
                }
            }

            out_events.push(Event::EntitiesLoaded {
                count: world.entities.len(),
            });
        }
        Command::LoadSpecies { species } => {
            world.species = species
                .into_iter()
                .map(|record| (record.tree_id, record))
                .collect();
            out_events.push(Event::SpeciesLoaded {
                count: world.species.len(),
            });
        }
        Command::InsertEntity { entity } => {
            let location_id = entity.location_id;
            if world.entity_index(location_id).is_some() {
                out_events.push(Event::InsertionRejected { location_id });
            } else {
                world.entities.push(entity);
                out_events.push(Event::EntityInserted { location_id });
            }
        }
        Command::RemoveEntity { location_id } => {
            if let Some(index) = world.entity_index(location_id) {
                let _ = world.entities.remove(index);
                out_events.push(Event::EntityRemoved { location_id });
                world.close_popup_showing(location_id, out_events);
            }
        }
        Command::OpenPopup { location_id } => {
            if let Some(index) = world.entity_index(location_id) {
                let coordinate = world.entities[index].coordinate;
                world.popup = Some(Popup {
                    location_id,
                    coordinate,
                });
                out_events.push(Event::PopupOpened {
                    location_id,
                    coordinate,
                });
            }
        }
        Command::ClosePopup => {
            if let Some(popup) = world.popup.take() {
                out_events.push(Event::PopupClosed {
                    location_id: popup.location_id,
                });
            }
        }
        Command::OpenCreationForm { coordinate } => {
            world.creation_form = Some(coordinate);
            out_events.push(Event::CreationFormOpened { coordinate });
        }
        Command::DismissCreationForm => {
            if world.creation_form.take().is_some() {
                out_events.push(Event::CreationFormDismissed);
            }
        }
        Command::PostNotice { notice } => {
            world.notice = Some(notice.clone());
            out_events.push(Event::NoticePosted { notice });
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use canopy_core::{Coordinate, Entity, LocationId, Notice, Popup, Species, TreeId};

    use super::World;

    /// Entity collection in insertion order.
    #[must_use]
    pub fn entities(world: &World) -> &[Entity] {
        &world.entities
    }

    /// Looks up a single entity by identity.
    #[must_use]
    pub fn entity(world: &World, location_id: LocationId) -> Option<&Entity> {
        world
            .entities
            .iter()
            .find(|entity| entity.location_id == location_id)
    }

    /// Looks up species metadata.
    #[must_use]
    pub fn species(world: &World, tree_id: TreeId) -> Option<&Species> {
        world.species.get(&tree_id)
    }

    /// Detail popup currently open, if any.
    #[must_use]
    pub fn popup(world: &World) -> Option<Popup> {
        world.popup
    }

    /// Resolves everything the detail popup displays.
    #[must_use]
    pub fn popup_details(world: &World) -> Option<PopupDetails<'_>> {
        let popup = world.popup?;
        let entity = entity(world, popup.location_id)?;
        Some(PopupDetails {
            popup,
            entity,
            species: species(world, entity.tree_id),
        })
    }

    /// Coordinate the creation form was opened at, if it is pending.
    #[must_use]
    pub fn creation_form(world: &World) -> Option<Coordinate> {
        world.creation_form
    }

    /// Latest user-facing notice.
    #[must_use]
    pub fn notice(world: &World) -> Option<&Notice> {
        world.notice.as_ref()
    }

    /// Content rendered into the detail popup.
    #[derive(Clone, Copy, Debug)]
    pub struct PopupDetails<'w> {
        /// Popup slot contents.
        pub popup: Popup,
        /// Entity shown by the popup.
        pub entity: &'w Entity,
        /// Species metadata, when the catalog knows the species.
        pub species: Option<&'w Species>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::Category;

    fn tree(id: u64, category: &str) -> Entity {
        Entity {
            location_id: LocationId::new(id),
            tree_id: TreeId::new(1),
            category: Category::from(category),
            coordinate: Coordinate::new(42.0 + id as f64 * 0.001, -71.0),
            source: "survey".to_owned(),
            is_native: true,
        }
    }

    fn loaded_world(entities: Vec<Entity>) -> World {
        let mut world = World::new();
        let mut events = Vec::new();
        apply(&mut world, Command::LoadEntities { entities }, &mut events);
        world
    }

    #[test]
    fn load_entities_drops_duplicate_identities() {
        let mut world = World::new();
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::LoadEntities {
                entities: vec![tree(1, "Oak"), tree(1, "Elm"), tree(2, "Elm")],
            },
            &mut events,
        );

        assert_eq!(events, vec![Event::EntitiesLoaded { count: 2 }]);
        assert_eq!(query::entities(&world)[0].category.as_str(), "Oak");
    }

    #[test]
    fn insert_rejects_existing_identity() {
        let mut world = loaded_world(vec![tree(1, "Oak")]);
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::InsertEntity {
                entity: tree(1, "Elm"),
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![Event::InsertionRejected {
                location_id: LocationId::new(1)
            }]
        );
        assert_eq!(query::entities(&world).len(), 1);
    }

    #[test]
    fn opening_a_popup_replaces_the_previous_one() {
        let mut world = loaded_world(vec![tree(1, "Oak"), tree(2, "Elm")]);
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::OpenPopup {
                location_id: LocationId::new(1),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::OpenPopup {
                location_id: LocationId::new(2),
            },
            &mut events,
        );

        let popup = query::popup(&world).expect("popup should be open");
        assert_eq!(popup.location_id, LocationId::new(2));
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, Event::PopupClosed { .. })),
            "replacing a popup must not stack or close it first"
        );
    }

    #[test]
    fn removing_the_shown_entity_closes_the_popup() {
        let mut world = loaded_world(vec![tree(1, "Oak"), tree(2, "Elm")]);
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::OpenPopup {
                location_id: LocationId::new(2),
            },
            &mut events,
        );
        events.clear();

        apply(
            &mut world,
            Command::RemoveEntity {
                location_id: LocationId::new(2),
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![
                Event::EntityRemoved {
                    location_id: LocationId::new(2)
                },
                Event::PopupClosed {
                    location_id: LocationId::new(2)
                },
            ]
        );
        assert!(query::popup(&world).is_none());
        assert!(query::entity(&world, LocationId::new(2)).is_none());
    }

    #[test]
    fn removing_another_entity_keeps_the_popup() {
        let mut world = loaded_world(vec![tree(1, "Oak"), tree(2, "Elm")]);
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::OpenPopup {
                location_id: LocationId::new(1),
            },
            &mut events,
        );

        apply(
            &mut world,
            Command::RemoveEntity {
                location_id: LocationId::new(2),
            },
            &mut events,
        );

        assert_eq!(
            query::popup(&world).map(|popup| popup.location_id),
            Some(LocationId::new(1))
        );
    }

    #[test]
    fn popup_details_resolve_species() {
        let mut world = loaded_world(vec![tree(1, "Oak")]);
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::LoadSpecies {
                species: vec![Species {
                    tree_id: TreeId::new(1),
                    family: "Fagaceae".to_owned(),
                    conservation_status: "Least Concern".to_owned(),
                }],
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::OpenPopup {
                location_id: LocationId::new(1),
            },
            &mut events,
        );

        let details = query::popup_details(&world).expect("details available");
        assert_eq!(details.entity.category.as_str(), "Oak");
        assert_eq!(
            details.species.map(|species| species.family.as_str()),
            Some("Fagaceae")
        );
    }

    #[test]
    fn dismissing_an_absent_form_is_silent() {
        let mut world = World::new();
        let mut events = Vec::new();

        apply(&mut world, Command::DismissCreationForm, &mut events);

        assert!(events.is_empty());
    }
}
