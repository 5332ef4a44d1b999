//! Headless application session wiring the world, the coordinator and the
//! mutation orchestrator to an engine and a remote.

use std::time::Duration;

use anyhow::{Context, Result};
use canopy_core::{Command, EntityCandidate, Event, LocationId, PointerKind};
use canopy_remote::MemoryRemote;
use canopy_rendering::GridEngine;
use canopy_system_highlight::HighlightChange;
use canopy_system_mutation::MutationOrchestrator;
use canopy_system_view_sync::{SyncConfig, ViewSync};
use canopy_world::{self as world, query, World};
use glam::Vec2;
use tracing::{debug, info};

/// Running application state driven by a virtual clock.
pub(crate) struct Session<'a> {
    world: World,
    sync: ViewSync<'a, GridEngine>,
    mutations: MutationOrchestrator<'a, MemoryRemote>,
    clock: Duration,
}

impl<'a> Session<'a> {
    /// Loads the inventory, installs the map and runs the first pass.
    pub(crate) async fn boot(
        engine: &'a GridEngine,
        remote: &'a MemoryRemote,
        config: SyncConfig,
    ) -> Result<Self> {
        let mut session = Self {
            world: World::new(),
            sync: ViewSync::new(engine, config),
            mutations: MutationOrchestrator::new(remote),
            clock: Duration::ZERO,
        };

        let mut commands = Vec::new();
        session
            .mutations
            .load(&mut commands)
            .await
            .context("failed to load the tree inventory")?;
        let _ = session.dispatch(commands)?;
        session
            .sync
            .mark_map_ready(query::entities(&session.world))
            .context("failed to install the tree layers")?;
        session.advance(Duration::ZERO).await?;

        info!(
            trees = query::entities(&session.world).len(),
            "session ready"
        );
        Ok(session)
    }

    /// Authoritative world state.
    pub(crate) fn world(&self) -> &World {
        &self.world
    }

    /// Coordinator state, including the latest published pass.
    pub(crate) fn sync(&self) -> &ViewSync<'a, GridEngine> {
        &self.sync
    }

    /// Engine the session renders into.
    pub(crate) fn engine(&self) -> &'a GridEngine {
        self.sync.engine()
    }

    /// Applies commands to the world and forwards the resulting events.
    pub(crate) fn dispatch(&mut self, commands: Vec<Command>) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for command in commands {
            world::apply(&mut self.world, command, &mut events);
        }
        self.sync
            .handle(&events, query::entities(&self.world))
            .context("engine rejected a collection update")?;
        Ok(events)
    }

    /// Moves the clock forward and processes everything that became due.
    pub(crate) async fn advance(&mut self, by: Duration) -> Result<()> {
        self.clock = self.clock.saturating_add(by);
        loop {
            let mut commands = Vec::new();
            let refresh = self.sync.pump(self.clock, &mut commands);
            let settled = commands.is_empty() && !refresh;
            let events = self.dispatch(commands)?;
            if !events.is_empty() {
                debug!(?events, "world changed");
            }
            if refresh {
                let _ = self.sync.refresh().await;
            }
            if settled {
                return Ok(());
            }
        }
    }

    /// Holds a touch on a screen position for the given duration.
    pub(crate) async fn hold(&mut self, screen: Vec2, duration: Duration) -> Result<()> {
        self.engine().press(PointerKind::Touch, screen);
        self.advance(Duration::ZERO).await?;
        self.advance(duration).await?;
        self.engine().release(PointerKind::Touch, screen);
        self.advance(Duration::ZERO).await
    }

    /// Toggles the highlighted category and recomputes the overlays.
    pub(crate) async fn toggle_highlight(&mut self, category: &str) -> Result<HighlightChange> {
        let change = self.sync.toggle_highlight(category.into());
        self.advance(Duration::ZERO).await?;
        Ok(change)
    }

    /// Submits the creation form.
    pub(crate) async fn add(&mut self, candidate: &EntityCandidate) -> Result<LocationId> {
        let mut commands = Vec::new();
        let added = self.mutations.add(candidate, &mut commands).await;
        if added.is_ok() {
            commands.push(Command::DismissCreationForm);
        }
        let _ = self.dispatch(commands)?;
        self.advance(Duration::ZERO).await?;
        Ok(added?)
    }

    /// Removes an entity on behalf of `confirmed_by`.
    pub(crate) async fn remove(
        &mut self,
        location_id: LocationId,
        confirmed_by: &str,
    ) -> Result<()> {
        let mut commands = Vec::new();
        let removed = self
            .mutations
            .remove(location_id, confirmed_by, &mut commands)
            .await;
        let _ = self.dispatch(commands)?;
        self.advance(Duration::ZERO).await?;
        Ok(removed?)
    }

    /// Drops every engine subscription.
    pub(crate) fn teardown(&mut self) {
        self.sync.teardown();
    }
}
