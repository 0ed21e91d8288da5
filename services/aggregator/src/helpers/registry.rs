//! Helper registry and execution planning.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use crate::{
    error::{AggregationError, AggregationResult},
    sources::SourceResolver,
};

use super::{catalog, AggregationHelper, DescriptorHelper, Engine, HelperDescriptor, Scope};

/// Which helpers a run executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperSelection {
    All,
    /// A single helper by key. Its dependencies must already be built.
    Only(String),
}

impl FromStr for HelperSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "all" => HelperSelection::All,
            key => HelperSelection::Only(key.to_string()),
        })
    }
}

impl fmt::Display for HelperSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelperSelection::All => f.write_str("all"),
            HelperSelection::Only(key) => f.write_str(key),
        }
    }
}

/// Registry of all aggregation helpers, in declaration order.
pub struct HelperRegistry {
    helpers: Vec<Arc<dyn AggregationHelper>>,
}

impl HelperRegistry {
    /// Create a registry with every catalog descriptor bound to `engine`.
    ///
    /// Fails if the engine's source overrides shard a source by state that a
    /// global helper reads.
    pub fn new(engine: Arc<Engine>) -> AggregationResult<Self> {
        check_state_overrides(&catalog::DESCRIPTORS, engine.sources())?;
        let helpers = catalog::DESCRIPTORS
            .iter()
            .copied()
            .map(|d| Arc::new(DescriptorHelper::new(d, engine.clone())) as Arc<dyn AggregationHelper>)
            .collect();
        Ok(Self { helpers })
    }

    pub fn from_helpers(helpers: Vec<Arc<dyn AggregationHelper>>) -> Self {
        Self { helpers }
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn AggregationHelper>> {
        self.helpers.iter().find(|h| h.descriptor().key == key)
    }

    pub fn helpers(&self) -> &[Arc<dyn AggregationHelper>] {
        &self.helpers
    }

    /// Helpers to run for `selection`, dependencies first.
    pub fn plan(&self, selection: &HelperSelection) -> AggregationResult<Vec<Arc<dyn AggregationHelper>>> {
        let descriptors: Vec<&HelperDescriptor> =
            self.helpers.iter().map(|h| h.descriptor()).collect();
        let order = plan_order(&descriptors)?;
        match selection {
            HelperSelection::All => Ok(order.into_iter().map(|i| self.helpers[i].clone()).collect()),
            HelperSelection::Only(key) => self
                .get(key)
                .map(|h| vec![h.clone()])
                .ok_or_else(|| AggregationError::UnknownHelper(key.clone())),
        }
    }
}

/// Global helpers read each source once per month through its source-wide
/// name, so a per-state override on one of their sources would be skipped.
pub fn check_state_overrides(
    descriptors: &[&HelperDescriptor],
    sources: &SourceResolver,
) -> AggregationResult<()> {
    for descriptor in descriptors.iter().filter(|d| d.scope == Scope::Global) {
        if let Some(source) = descriptor
            .sources
            .iter()
            .find(|s| sources.has_state_overrides(s.id))
        {
            return Err(AggregationError::StateShardedSource {
                helper: descriptor.key.to_string(),
                source_id: source.id.to_string(),
            });
        }
    }
    Ok(())
}

/// Topological order over `depends_on`. Among helpers whose dependencies are
/// satisfied, the one declared first goes first.
pub fn plan_order(descriptors: &[&HelperDescriptor]) -> AggregationResult<Vec<usize>> {
    let index: HashMap<&str, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| (d.key, i))
        .collect();

    let mut edges: Vec<Vec<usize>> = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let deps = descriptor
            .depends_on
            .iter()
            .map(|dep| {
                index
                    .get(dep)
                    .copied()
                    .ok_or_else(|| AggregationError::UnknownHelper(dep.to_string()))
            })
            .collect::<AggregationResult<Vec<_>>>()?;
        edges.push(deps);
    }

    let mut done = vec![false; descriptors.len()];
    let mut order = Vec::with_capacity(descriptors.len());
    while order.len() < descriptors.len() {
        let next = (0..descriptors.len())
            .find(|&i| !done[i] && edges[i].iter().all(|&dep| done[dep]));
        match next {
            Some(i) => {
                done[i] = true;
                order.push(i);
            }
            None => {
                let path = find_cycle(&edges, &done)
                    .into_iter()
                    .map(|i| descriptors[i].key.to_string())
                    .collect();
                return Err(AggregationError::DependencyCycle(path));
            }
        }
    }
    Ok(order)
}

/// Walks dependency edges among unfinished helpers until a node repeats.
fn find_cycle(edges: &[Vec<usize>], done: &[bool]) -> Vec<usize> {
    let Some(start) = (0..edges.len()).find(|&i| !done[i]) else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(&next) = edges[current].iter().find(|&&dep| !done[dep]) else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::descriptor::{QueryShape, Scope, SelectSpec, TableRef};

    const fn stub(key: &'static str, depends_on: &'static [&'static str]) -> HelperDescriptor {
        HelperDescriptor {
            key,
            target: "stub",
            scope: Scope::Global,
            sources: &[],
            depends_on,
            distribution_column: "supervisor_id",
            state_column: "state_id",
            lookback_months: 0,
            scratch: &[],
            query: QueryShape::Select(SelectSpec {
                from: TableRef::Fact("stub"),
                alias: "s",
                joins: &[],
                filters: &[],
                columns: &[],
                group_by: &[],
            }),
            indexes: &[],
            validations: &[],
        }
    }

    static A: HelperDescriptor = stub("a", &["c"]);
    static B: HelperDescriptor = stub("b", &[]);
    static C: HelperDescriptor = stub("c", &[]);
    static X: HelperDescriptor = stub("x", &["z"]);
    static Y: HelperDescriptor = stub("y", &["x"]);
    static Z: HelperDescriptor = stub("z", &["y"]);
    static ORPHAN: HelperDescriptor = stub("orphan", &["missing"]);

    #[test]
    fn test_catalog_plans_in_declaration_order() {
        let descriptors: Vec<&HelperDescriptor> = catalog::DESCRIPTORS.to_vec();
        let order = plan_order(&descriptors).unwrap();
        assert_eq!(order, (0..descriptors.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_dependencies_move_ahead_and_ties_keep_declaration_order() {
        let order = plan_order(&[&A, &B, &C]).unwrap();
        let keys: Vec<_> = order.iter().map(|&i| [&A, &B, &C][i].key).collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_cycle_is_reported_with_its_path() {
        let err = plan_order(&[&B, &X, &Y, &Z]).unwrap_err();
        match err {
            AggregationError::DependencyCycle(path) => {
                assert_eq!(path, vec!["x", "z", "y", "x"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let err = plan_order(&[&ORPHAN]).unwrap_err();
        assert!(matches!(err, AggregationError::UnknownHelper(key) if key == "missing"));
    }

    #[test]
    fn test_state_overrides_allowed_for_state_scoped_sources() {
        let sources = SourceResolver::from_toml_str(
            "icds-cas",
            r#"
            [sources."static-dashboard_thr_forms".states]
            "st-up" = "thr_up"

            [sources."static-child_health_cases"]
            table = "child_health_all"
            "#,
        )
        .unwrap();
        check_state_overrides(&catalog::DESCRIPTORS, &sources).unwrap();
    }

    #[test]
    fn test_state_overrides_rejected_for_global_sources() {
        let sources = SourceResolver::from_toml_str(
            "icds-cas",
            r#"
            [sources."static-person_cases_v3".states]
            "st-up" = "person_cases_up"
            "#,
        )
        .unwrap();
        let err = check_state_overrides(&catalog::DESCRIPTORS, &sources).unwrap_err();
        match err {
            AggregationError::StateShardedSource { helper, source_id } => {
                assert_eq!(helper, "agg-person-cases");
                assert_eq!(source_id, "static-person_cases_v3");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_selection_from_str() {
        assert_eq!("all".parse::<HelperSelection>().unwrap(), HelperSelection::All);
        assert_eq!(
            "agg-awc".parse::<HelperSelection>().unwrap(),
            HelperSelection::Only("agg-awc".to_string())
        );
        assert_eq!(HelperSelection::Only("agg-awc".into()).to_string(), "agg-awc");
    }
}
