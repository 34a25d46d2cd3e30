//! Multi-query merge and contradiction detection.
//!
//! A search may carry several phrases ("black coat", then "with belt").
//! They are resolved strictly left to right, each in the category context
//! established by the phrases before it, and folded into one
//! [`AccumulatedFilterState`].
//!
//! Two kinds of disagreement are detected:
//!
//! - **Conflict**: the *last* phrase detects a category different from the
//!   active context. The merge stops and the caller must ask the user
//!   whether to switch category.
//! - **Contradiction**: a phrase sets an attribute to a value that
//!   disagrees with the currently active value for that key, or disagrees
//!   with itself. Its filters and colors are left out of the merge and the
//!   reason is recorded in its trace entry. Its negative colors still merge.
//!
//! The active value per key is the most recent accepted one, so a key is
//! only compared against its latest value, never against superseded ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use atelier_core::{FilterMap, FilterValue, ResolvedQuery, Suggestion};

use crate::resolver::QueryResolution;

/// One phrase's effect on the merged state, as replayed by a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContribution {
    pub query: String,
    /// Set only when this phrase changed the context category.
    pub category: Option<String>,
    pub filters: FilterMap,
    pub colors: Vec<String>,
    pub negative_filters: FilterMap,
    pub negative_colors: Vec<String>,
    pub suggestion: Option<Suggestion>,
    pub is_empty: bool,
    pub is_contradictory: bool,
    pub contradiction_reason: Option<String>,
}

/// Final-phrase category mismatch requiring user disambiguation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSignal {
    pub from: String,
    pub to: String,
    pub trigger: String,
}

/// Filter state accumulated across the phrases of one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccumulatedFilterState {
    pub merged_filters: FilterMap,
    pub merged_colors: Vec<String>,
    pub merged_negative_filters: FilterMap,
    pub merged_negative_colors: Vec<String>,
    /// Current effective value per attribute key.
    pub active_filter_snapshot: BTreeMap<String, FilterValue>,
    pub last_detected_category: Option<String>,
    pub last_suggestion: Option<Suggestion>,
    pub trace: Vec<QueryContribution>,
}

/// Result of merging a batch of phrases.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged(AccumulatedFilterState),
    Conflict {
        conflict: ConflictSignal,
        /// Contributions of the phrases before the trigger.
        trace: Vec<QueryContribution>,
    },
}

/// Left-to-right fold over resolved phrases.
///
/// Owned by one search request; never shared.
#[derive(Debug, Clone, Default)]
pub struct MergeFold {
    state: AccumulatedFilterState,
    context: Option<String>,
}

impl MergeFold {
    pub fn new(initial_context: Option<&str>) -> Self {
        Self {
            state: AccumulatedFilterState::default(),
            context: initial_context
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        }
    }

    /// Category context for the next phrase.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn state(&self) -> &AccumulatedFilterState {
        &self.state
    }

    /// Fold one resolved phrase.
    ///
    /// Returns the conflict when `is_last` and the phrase's category
    /// differs from the active context; the state is left untouched then.
    pub fn absorb(
        &mut self,
        query: &str,
        resolved: ResolvedQuery,
        is_last: bool,
    ) -> Option<ConflictSignal> {
        let found_category = resolved.category.clone();

        if is_last {
            if let (Some(found), Some(ctx)) = (&found_category, &self.context) {
                if !found.eq_ignore_ascii_case(ctx) {
                    return Some(ConflictSignal {
                        from: ctx.clone(),
                        to: found.clone(),
                        trigger: query.to_string(),
                    });
                }
            }
        }

        let contradiction = self.find_contradiction(&resolved);
        let is_contradictory = contradiction.is_some();
        let changes_context = match (&found_category, &self.context) {
            (Some(found), Some(ctx)) => !found.eq_ignore_ascii_case(ctx),
            (Some(_), None) => true,
            (None, _) => false,
        };

        let contribution = QueryContribution {
            query: query.to_string(),
            category: found_category
                .clone()
                .filter(|_| changes_context && !is_contradictory),
            filters: if is_contradictory {
                FilterMap::new()
            } else {
                resolved.filters.clone()
            },
            colors: if is_contradictory {
                Vec::new()
            } else {
                resolved.colors.clone()
            },
            negative_filters: if is_contradictory {
                FilterMap::new()
            } else {
                resolved.negative_filters.clone()
            },
            negative_colors: resolved.negative_colors.clone(),
            suggestion: resolved.suggestion.clone(),
            is_empty: resolved.is_empty(),
            is_contradictory,
            contradiction_reason: contradiction,
        };

        union_list(
            &mut self.state.merged_negative_colors,
            &resolved.negative_colors,
        );

        if !is_contradictory {
            for (key, values) in &resolved.filters {
                union_list(
                    self.state.merged_filters.entry(key.clone()).or_default(),
                    values,
                );
                if let Some(first) = values.first() {
                    self.state
                        .active_filter_snapshot
                        .insert(key.clone(), first.clone());
                }
            }
            union_list(&mut self.state.merged_colors, &resolved.colors);

            for (key, values) in &resolved.negative_filters {
                union_list(
                    self.state
                        .merged_negative_filters
                        .entry(key.clone())
                        .or_default(),
                    values,
                );
                if let Some(first) = values.first() {
                    self.state
                        .active_filter_snapshot
                        .insert(key.clone(), first.negated());
                }
            }

            if let Some(found) = found_category {
                self.state.last_detected_category = Some(found.clone());
                self.context = Some(found);
            }
            if let Some(suggestion) = resolved.suggestion {
                self.state.last_suggestion = Some(suggestion);
            }
        } else {
            debug!(
                query = %query,
                reason = ?contribution.contradiction_reason,
                "Contradictory query excluded from merge"
            );
        }

        self.state.trace.push(contribution);
        None
    }

    pub fn finish(self) -> AccumulatedFilterState {
        self.state
    }

    /// First contradiction in priority order, as a user-facing reason.
    ///
    /// Within one class keys are visited in sorted order, so when several
    /// keys conflict the reason names the lexicographically smallest one.
    fn find_contradiction(&self, resolved: &ResolvedQuery) -> Option<String> {
        let snapshot = &self.state.active_filter_snapshot;

        for (key, values) in &resolved.filters {
            let Some(current) = values.first() else {
                continue;
            };
            if snapshot.get(key).is_some_and(|active| active != current) {
                return Some(previous_filter_reason(key));
            }
        }

        for (key, values) in &resolved.negative_filters {
            let Some(excluded) = values.first() else {
                continue;
            };
            let effective = excluded.negated();
            if snapshot.get(key).is_some_and(|active| *active != effective) {
                return Some(previous_filter_reason(key));
            }
        }

        for (key, values) in &resolved.filters {
            let (Some(current), Some(excluded)) = (
                values.first(),
                resolved
                    .negative_filters
                    .get(key)
                    .and_then(|neg| neg.first()),
            ) else {
                continue;
            };
            if *current != excluded.negated() {
                return Some(format!(
                    "Contradicts within this query for '{}'",
                    display_key(key)
                ));
            }
        }

        None
    }
}

/// Resolve and fold an ordered batch of phrases.
#[instrument(skip(resolver, queries), fields(subsystem = "search", component = "merge", op = "merge", query_count = queries.len()))]
pub async fn merge(
    resolver: &dyn QueryResolution,
    queries: &[String],
    initial_context: Option<&str>,
) -> MergeOutcome {
    let mut fold = MergeFold::new(initial_context);

    for (i, query) in queries.iter().enumerate() {
        let resolved = resolver.resolve(query, fold.context()).await;
        let is_last = i + 1 == queries.len();

        if let Some(conflict) = fold.absorb(query, resolved, is_last) {
            info!(
                from = %conflict.from,
                to = %conflict.to,
                trigger = %conflict.trigger,
                "Category conflict on final query"
            );
            return MergeOutcome::Conflict {
                conflict,
                trace: fold.finish().trace,
            };
        }
    }

    let state = fold.finish();
    debug!(
        category = ?state.last_detected_category,
        filters = state.merged_filters.len(),
        colors = state.merged_colors.len(),
        negative_filters = state.merged_negative_filters.len(),
        negative_colors = state.merged_negative_colors.len(),
        "Queries merged"
    );
    MergeOutcome::Merged(state)
}

/// Insertion-ordered union.
fn union_list<T: Clone + PartialEq>(target: &mut Vec<T>, items: &[T]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn display_key(key: &str) -> String {
    key.replace('_', " ")
}

fn previous_filter_reason(key: &str) -> String {
    format!("Contradicts previous filter for '{}'", display_key(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Resolver answering from a fixed table, recording the contexts seen.
    #[derive(Default)]
    struct ScriptedResolver {
        answers: HashMap<String, ResolvedQuery>,
        contexts: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedResolver {
        fn with(mut self, query: &str, rq: ResolvedQuery) -> Self {
            self.answers.insert(query.to_string(), rq);
            self
        }

        fn contexts(&self) -> Vec<Option<String>> {
            self.contexts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryResolution for ScriptedResolver {
        async fn resolve(&self, raw_query: &str, context: Option<&str>) -> ResolvedQuery {
            self.contexts
                .lock()
                .unwrap()
                .push(context.map(str::to_string));
            self.answers.get(raw_query).cloned().unwrap_or_default()
        }
    }

    fn rq(category: Option<&str>) -> ResolvedQuery {
        ResolvedQuery {
            category: category.map(str::to_string),
            ..Default::default()
        }
    }

    fn filter(rq: &mut ResolvedQuery, key: &str, value: FilterValue) {
        rq.filters.insert(key.to_string(), vec![value]);
    }

    fn neg_filter(rq: &mut ResolvedQuery, key: &str, value: FilterValue) {
        rq.negative_filters.insert(key.to_string(), vec![value]);
    }

    fn queries(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn merged(outcome: MergeOutcome) -> AccumulatedFilterState {
        match outcome {
            MergeOutcome::Merged(state) => state,
            MergeOutcome::Conflict { conflict, .. } => panic!("unexpected conflict: {:?}", conflict),
        }
    }

    #[tokio::test]
    async fn test_colors_union_across_queries() {
        let mut black_coat = rq(Some("Coats"));
        black_coat.colors = vec!["black".to_string()];
        let mut red = rq(None);
        red.colors = vec!["red".to_string()];
        let resolver = ScriptedResolver::default()
            .with("black coat", black_coat)
            .with("red", red);

        let state = merged(merge(&resolver, &queries(&["black coat", "red"]), None).await);

        assert_eq!(state.last_detected_category.as_deref(), Some("Coats"));
        assert_eq!(state.merged_colors, vec!["black", "red"]);
        assert!(state.trace.iter().all(|c| !c.is_contradictory));
        assert_eq!(
            resolver.contexts(),
            vec![None, Some("Coats".to_string())]
        );
    }

    #[tokio::test]
    async fn test_material_contradiction_keeps_first_value() {
        let mut leather = rq(Some("Jacket"));
        filter(&mut leather, "material", "leather".into());
        let mut cotton = rq(Some("Jacket"));
        filter(&mut cotton, "material", "cotton".into());
        let resolver = ScriptedResolver::default()
            .with("leather jacket", leather)
            .with("cotton jacket", cotton);

        let state = merged(
            merge(
                &resolver,
                &queries(&["leather jacket", "cotton jacket"]),
                None,
            )
            .await,
        );

        assert_eq!(state.merged_filters["material"], vec![FilterValue::from("leather")]);
        let second = &state.trace[1];
        assert!(second.is_contradictory);
        assert!(second.filters.is_empty());
        assert!(second
            .contradiction_reason
            .as_deref()
            .unwrap()
            .contains("material"));
        assert_eq!(
            second.contradiction_reason.as_deref(),
            Some("Contradicts previous filter for 'material'")
        );
    }

    #[tokio::test]
    async fn test_several_conflicting_keys_report_the_smallest() {
        let mut first = rq(Some("Jacket"));
        filter(&mut first, "material", "leather".into());
        filter(&mut first, "length", "long".into());
        let mut second = rq(Some("Jacket"));
        filter(&mut second, "material", "cotton".into());
        filter(&mut second, "length", "short".into());
        let resolver = ScriptedResolver::default()
            .with("long leather jacket", first)
            .with("short cotton jacket", second);

        let state = merged(
            merge(
                &resolver,
                &queries(&["long leather jacket", "short cotton jacket"]),
                None,
            )
            .await,
        );

        assert_eq!(
            state.trace[1].contradiction_reason.as_deref(),
            Some("Contradicts previous filter for 'length'")
        );
    }

    #[tokio::test]
    async fn test_negative_filter_against_snapshot() {
        let mut belted = rq(Some("Coats"));
        filter(&mut belted, "has_belt", true.into());
        let mut beltless = rq(None);
        neg_filter(&mut beltless, "has_belt", true.into());
        let resolver = ScriptedResolver::default()
            .with("belted coat", belted)
            .with("without belt", beltless);

        let state = merged(
            merge(&resolver, &queries(&["belted coat", "without belt"]), None).await,
        );

        let second = &state.trace[1];
        assert!(second.is_contradictory);
        assert_eq!(
            second.contradiction_reason.as_deref(),
            Some("Contradicts previous filter for 'has belt'")
        );
        assert!(state.merged_negative_filters.is_empty());
        assert_eq!(
            state.active_filter_snapshot["has_belt"],
            FilterValue::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_consistent_negative_filter_merges() {
        let mut beltless = rq(Some("Coats"));
        neg_filter(&mut beltless, "has_belt", true.into());
        let mut no_belt = rq(None);
        filter(&mut no_belt, "has_belt", false.into());
        let resolver = ScriptedResolver::default()
            .with("coat without belt", beltless)
            .with("beltless", no_belt);

        let state = merged(
            merge(
                &resolver,
                &queries(&["coat without belt", "beltless"]),
                None,
            )
            .await,
        );

        assert!(state.trace.iter().all(|c| !c.is_contradictory));
        assert_eq!(
            state.merged_negative_filters["has_belt"],
            vec![FilterValue::Bool(true)]
        );
        assert_eq!(state.merged_filters["has_belt"], vec![FilterValue::Bool(false)]);
    }

    #[tokio::test]
    async fn test_self_contradiction_within_query() {
        let mut odd = rq(Some("Coats"));
        filter(&mut odd, "has_belt", true.into());
        neg_filter(&mut odd, "has_belt", true.into());
        odd.negative_colors = vec!["red".to_string()];
        let resolver = ScriptedResolver::default().with("belt no belt", odd);

        let state = merged(merge(&resolver, &queries(&["belt no belt"]), None).await);

        let only = &state.trace[0];
        assert!(only.is_contradictory);
        assert_eq!(
            only.contradiction_reason.as_deref(),
            Some("Contradicts within this query for 'has belt'")
        );
        assert!(state.merged_filters.is_empty());
        // Negative colors merge even from a contradictory query.
        assert_eq!(state.merged_negative_colors, vec!["red"]);
        assert_eq!(only.negative_colors, vec!["red"]);
        // Contradictory queries do not move the context.
        assert!(state.last_detected_category.is_none());
    }

    #[tokio::test]
    async fn test_previous_filter_takes_priority_over_self_contradiction() {
        let mut first = rq(Some("Coats"));
        filter(&mut first, "material", "wool".into());
        let mut second = rq(None);
        filter(&mut second, "material", "leather".into());
        neg_filter(&mut second, "material", "leather".into());
        let resolver = ScriptedResolver::default()
            .with("wool coat", first)
            .with("leather not leather", second);

        let state = merged(
            merge(
                &resolver,
                &queries(&["wool coat", "leather not leather"]),
                None,
            )
            .await,
        );
        assert_eq!(
            state.trace[1].contradiction_reason.as_deref(),
            Some("Contradicts previous filter for 'material'")
        );
    }

    #[tokio::test]
    async fn test_snapshot_tracks_latest_value_only() {
        let mut a = rq(Some("Coats"));
        filter(&mut a, "material", "wool".into());
        let mut b = rq(None);
        b.colors = vec!["black".to_string()];
        let mut c = rq(None);
        filter(&mut c, "material", "wool".into());
        let resolver = ScriptedResolver::default()
            .with("wool coat", a)
            .with("black", b)
            .with("wool again", c);

        let state = merged(
            merge(
                &resolver,
                &queries(&["wool coat", "black", "wool again"]),
                None,
            )
            .await,
        );
        assert!(state.trace.iter().all(|c| !c.is_contradictory));
        assert_eq!(state.merged_filters["material"], vec![FilterValue::from("wool")]);
    }

    #[tokio::test]
    async fn test_conflict_on_last_query() {
        let mut dress = rq(Some("Dress"));
        dress.colors = vec!["red".to_string()];
        let resolver = ScriptedResolver::default()
            .with("black", rq(Some("Coats")))
            .with("red dress", dress);

        let outcome = merge(&resolver, &queries(&["black", "red dress"]), Some("Coats")).await;

        match outcome {
            MergeOutcome::Conflict { conflict, trace } => {
                assert_eq!(
                    conflict,
                    ConflictSignal {
                        from: "Coats".to_string(),
                        to: "Dress".to_string(),
                        trigger: "red dress".to_string(),
                    }
                );
                assert_eq!(trace.len(), 1);
                assert_eq!(trace[0].query, "black");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_category_change_before_last_query_is_not_a_conflict() {
        let resolver = ScriptedResolver::default()
            .with("dress", rq(Some("Dress")))
            .with("red", rq(Some("Dress")));

        let state = merged(merge(&resolver, &queries(&["dress", "red"]), Some("Coats")).await);

        assert_eq!(state.last_detected_category.as_deref(), Some("Dress"));
        assert_eq!(state.trace[0].category.as_deref(), Some("Dress"));
        // Same category as the context: not attributed.
        assert_eq!(state.trace[1].category, None);
        assert_eq!(
            resolver.contexts(),
            vec![Some("Coats".to_string()), Some("Dress".to_string())]
        );
    }

    #[tokio::test]
    async fn test_same_category_in_different_case_is_not_a_conflict() {
        let resolver = ScriptedResolver::default().with("black coat", rq(Some("coats")));
        let outcome = merge(&resolver, &queries(&["black coat"]), Some("Coats")).await;
        assert!(matches!(outcome, MergeOutcome::Merged(_)));
    }

    #[tokio::test]
    async fn test_empty_result_is_marked_empty() {
        let resolver = ScriptedResolver::default();
        let state = merged(merge(&resolver, &queries(&["gibberish"]), None).await);
        assert!(state.trace[0].is_empty);
        assert!(!state.trace[0].is_contradictory);
    }

    #[tokio::test]
    async fn test_last_suggestion_wins() {
        let mut a = rq(Some("Coats"));
        a.suggestion = Some(Suggestion {
            text: "Add a material".to_string(),
            suggested_query: "wool coat".to_string(),
        });
        let mut b = rq(None);
        b.suggestion = Some(Suggestion {
            text: "Add a length".to_string(),
            suggested_query: "long coat".to_string(),
        });
        let resolver = ScriptedResolver::default().with("coat", a).with("warm", b);

        let state = merged(merge(&resolver, &queries(&["coat", "warm"]), None).await);
        assert_eq!(
            state.last_suggestion.map(|s| s.suggested_query),
            Some("long coat".to_string())
        );
    }

    #[test]
    fn test_fold_values_dedupe_in_insertion_order() {
        let mut fold = MergeFold::new(None);
        let mut a = rq(Some("Coats"));
        a.filters
            .insert("material".to_string(), vec!["wool".into(), "cashmere".into()]);
        fold.absorb("a", a, false);
        let mut b = rq(None);
        b.filters
            .insert("material".to_string(), vec!["wool".into(), "tweed".into()]);
        fold.absorb("b", b, true);

        let state = fold.finish();
        assert_eq!(
            state.merged_filters["material"],
            vec![
                FilterValue::from("wool"),
                FilterValue::from("cashmere"),
                FilterValue::from("tweed")
            ]
        );
    }
}
