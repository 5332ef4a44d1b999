#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Builds the sidebar's category list from the features currently on screen.
//!
//! A category maps to the set of *map features* that contain at least one
//! tree of that category: a point contributes itself, a cluster contributes
//! itself once per category found among its members. The sidebar count is
//! therefore the number of markers showing a category, not the number of
//! trees.

use std::collections::{HashMap, HashSet};

use canopy_core::{
    layers, Category, ClusterFeature, Entity, Feature, FeatureKey, MapEngine, QueryRegion,
};
use canopy_system_cluster_expansion::ClusterExpander;
use futures::future::join_all;
use tracing::debug;

/// Features the engine reports for the visible viewport, split by kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedFeatures {
    /// Entities drawn as individual points, possibly repeated.
    pub points: Vec<Entity>,
    /// Clusters drawn in the viewport.
    pub clusters: Vec<ClusterFeature>,
}

impl RenderedFeatures {
    /// Queries the base point and cluster layers of the engine.
    #[must_use]
    pub fn query<E: MapEngine>(engine: &E) -> Self {
        let features = engine.query_rendered_features(
            QueryRegion::Viewport,
            &[layers::POINTS, layers::CLUSTERS],
        );
        Self::partition(features)
    }

    /// Splits a feature list into points and clusters, keeping order.
    #[must_use]
    pub fn partition(features: Vec<Feature>) -> Self {
        let mut rendered = Self::default();
        for feature in features {
            match feature {
                Feature::Point(entity) => rendered.points.push(entity),
                Feature::Cluster(cluster) => rendered.clusters.push(cluster),
            }
        }
        rendered
    }
}

/// Features containing a category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryEntry {
    category: Category,
    features: Vec<FeatureKey>,
}

impl CategoryEntry {
    /// Category the entry describes.
    #[must_use]
    pub fn category(&self) -> &Category {
        &self.category
    }

    /// Distinct features containing the category, in first-encounter order.
    #[must_use]
    pub fn features(&self) -> &[FeatureKey] {
        &self.features
    }

    /// Number shown next to the category in the sidebar.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

/// Category to feature mapping ordered for display.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryAggregation {
    entries: Vec<CategoryEntry>,
}

impl CategoryAggregation {
    /// Entries ordered by descending feature count, ties by first encounter.
    #[must_use]
    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    /// Looks up the entry of a category.
    #[must_use]
    pub fn get(&self, category: &Category) -> Option<&CategoryEntry> {
        self.entries.iter().find(|entry| entry.category == *category)
    }

    /// Categories in display order.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.entries.iter().map(|entry| &entry.category)
    }

    /// Number of distinct categories on screen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether no category is on screen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct AggregationBuilder {
    positions: HashMap<Category, usize>,
    entries: Vec<(CategoryEntry, HashSet<FeatureKey>)>,
}

impl AggregationBuilder {
    fn record(&mut self, category: &Category, feature: FeatureKey) {
        let position = match self.positions.get(category) {
            Some(position) => *position,
            None => {
                let position = self.entries.len();
                let _ = self.positions.insert(category.clone(), position);
                self.entries.push((
                    CategoryEntry {
                        category: category.clone(),
                        features: Vec::new(),
                    },
                    HashSet::new(),
                ));
                position
            }
        };

        let (entry, seen) = &mut self.entries[position];
        if seen.insert(feature) {
            entry.features.push(feature);
        }
    }

    fn finish(self) -> CategoryAggregation {
        let mut entries: Vec<CategoryEntry> =
            self.entries.into_iter().map(|(entry, _)| entry).collect();
        // `sort_by` is stable, so ties keep first-encounter order.
        entries.sort_by(|a, b| b.feature_count().cmp(&a.feature_count()));
        CategoryAggregation { entries }
    }
}

/// Aggregates rendered points and clusters by category.
///
/// All clusters are expanded concurrently and the mapping is returned only
/// once every expansion has settled. A cluster that no longer exists in the
/// engine's index contributes nothing.
pub async fn aggregate<E: MapEngine>(
    expander: &ClusterExpander<'_, E>,
    points: &[Entity],
    clusters: &[ClusterFeature],
) -> CategoryAggregation {
    let mut builder = AggregationBuilder::default();

    let mut seen_points = HashSet::new();
    for entity in points {
        if seen_points.insert(entity.location_id) {
            builder.record(&entity.category, FeatureKey::Point(entity.location_id));
        }
    }

    let mut seen_clusters = HashSet::new();
    let unique_clusters: Vec<&ClusterFeature> = clusters
        .iter()
        .filter(|cluster| seen_clusters.insert(cluster.id))
        .collect();
    let expansions = join_all(unique_clusters.iter().map(|cluster| async move {
        (cluster.id, expander.expand_or_empty(cluster.id).await)
    }))
    .await;

    for (cluster, members) in expansions {
        for member in members {
            builder.record(&member.category, FeatureKey::Cluster(cluster));
        }
    }

    let aggregation = builder.finish();
    debug!(
        points = seen_points.len(),
        clusters = unique_clusters.len(),
        categories = aggregation.len(),
        "aggregated visible categories"
    );
    aggregation
}
