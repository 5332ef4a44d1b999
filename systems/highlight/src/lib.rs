#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Decides which points and clusters the highlight overlays mark.

use std::collections::{BTreeSet, HashSet};

use canopy_core::{
    layers, Category, ClusterId, EngineError, Feature, MapEngine, Predicate, QueryRegion,
};
use canopy_system_cluster_expansion::ClusterExpander;
use futures::future::join_all;
use tracing::debug;

/// Category currently highlighted on the map, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HighlightState {
    active: Option<Category>,
}

/// Transition produced by [`HighlightState::toggle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HighlightChange {
    /// A category became highlighted while none was.
    Selected(Category),
    /// The highlight moved from one category to another.
    Switched {
        /// Previously highlighted category.
        from: Category,
        /// Newly highlighted category.
        to: Category,
    },
    /// The highlighted category was clicked again and cleared.
    Cleared(Category),
}

impl HighlightState {
    /// Creates a state with nothing highlighted.
    #[must_use]
    pub const fn new() -> Self {
        Self { active: None }
    }

    /// Highlighted category, if any.
    #[must_use]
    pub fn active(&self) -> Option<&Category> {
        self.active.as_ref()
    }

    /// Applies a sidebar click: clicking the active category clears it,
    /// clicking any other category replaces it.
    pub fn toggle(&mut self, category: Category) -> HighlightChange {
        match self.active.take() {
            Some(current) if current == category => HighlightChange::Cleared(current),
            Some(current) => {
                self.active = Some(category.clone());
                HighlightChange::Switched {
                    from: current,
                    to: category,
                }
            }
            None => {
                self.active = Some(category.clone());
                HighlightChange::Selected(category)
            }
        }
    }

    /// Removes any highlight.
    pub fn clear(&mut self) {
        self.active = None;
    }
}

/// Filters pushed to the two highlight overlay layers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HighlightFilters {
    /// Filter of the highlighted point overlay.
    pub points: Predicate,
    /// Filter of the highlighted cluster overlay.
    pub clusters: Predicate,
}

impl HighlightFilters {
    /// Filters that mark nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Cluster identifiers marked by the cluster overlay.
    #[must_use]
    pub fn marked_clusters(&self) -> Option<&BTreeSet<ClusterId>> {
        match &self.clusters {
            Predicate::ClusterIn(ids) => Some(ids),
            _ => None,
        }
    }

    /// Pushes both filters to their overlay layers.
    pub fn apply<E: MapEngine>(&self, engine: &E) -> Result<(), EngineError> {
        engine.set_filter(&layers::HIGHLIGHTED_POINTS, self.points.clone())?;
        engine.set_filter(&layers::HIGHLIGHTED_CLUSTERS, self.clusters.clone())
    }
}

/// Recomputes the overlay filters for the current viewport.
///
/// Every rendered cluster is expanded concurrently; a cluster is marked when
/// at least one member carries the highlighted category. Points are matched
/// by the engine itself through a category equality filter.
pub async fn synchronize<E: MapEngine>(
    expander: &ClusterExpander<'_, E>,
    state: &HighlightState,
) -> HighlightFilters {
    let Some(category) = state.active() else {
        return HighlightFilters::none();
    };

    let mut seen = HashSet::new();
    let clusters: Vec<ClusterId> = expander
        .engine()
        .query_rendered_features(QueryRegion::Viewport, &[layers::CLUSTERS])
        .into_iter()
        .filter_map(|feature| match feature {
            Feature::Cluster(cluster) => Some(cluster.id),
            Feature::Point(_) => None,
        })
        .filter(|id| seen.insert(*id))
        .collect();

    let expansions = join_all(clusters.iter().map(|cluster| async move {
        (*cluster, expander.expand_or_empty(*cluster).await)
    }))
    .await;

    let marked: BTreeSet<ClusterId> = expansions
        .into_iter()
        .filter(|(_, members)| members.iter().any(|member| member.category == *category))
        .map(|(cluster, _)| cluster)
        .collect();
    debug!(
        %category,
        rendered = clusters.len(),
        marked = marked.len(),
        "synchronized highlight filters"
    );

    HighlightFilters {
        points: Predicate::CategoryEquals(category.clone()),
        clusters: Predicate::ClusterIn(marked),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selecting_the_same_category_twice_clears_it() {
        let mut state = HighlightState::new();

        assert_eq!(
            state.toggle(Category::from("Oak")),
            HighlightChange::Selected(Category::from("Oak"))
        );
        assert_eq!(
            state.toggle(Category::from("Oak")),
            HighlightChange::Cleared(Category::from("Oak"))
        );
        assert_eq!(state.active(), None);
    }

    #[test]
    fn selecting_another_category_switches() {
        let mut state = HighlightState::new();
        let _ = state.toggle(Category::from("Oak"));

        let change = state.toggle(Category::from("Elm"));

        assert_eq!(
            change,
            HighlightChange::Switched {
                from: Category::from("Oak"),
                to: Category::from("Elm"),
            }
        );
        assert_eq!(state.active(), Some(&Category::from("Elm")));
    }

    #[test]
    fn default_filters_mark_nothing() {
        let filters = HighlightFilters::none();

        assert_eq!(filters.points, Predicate::MatchNone);
        assert_eq!(filters.clusters, Predicate::MatchNone);
        assert!(filters.marked_clusters().is_none());
    }
}
