//! Grid expansion and parameter sweep strategies.

use ks_types::{validation_error, ExpResult, ParameterError, ParameterPoint, ParameterSpace};
use rand::Rng;
use tracing::{debug, info};

/// Every point of the Cartesian product of `space`, in lexicographic order
/// over the declared dimension order with the last dimension varying
/// fastest. The empty space yields a single empty point.
pub fn grid(space: &ParameterSpace) -> Result<Vec<ParameterPoint>, ParameterError> {
    space.validate()?;

    let mut result: Vec<ParameterPoint> = vec![ParameterPoint::new()];
    for param in space.parameters() {
        let mut next = Vec::with_capacity(result.len() * param.values.len());
        for existing in &result {
            for value in &param.values {
                next.push(existing.extended(&param.name, value.clone()));
            }
        }
        result = next;
    }

    debug!(points = result.len(), dimensions = space.len(), "expanded parameter grid");
    Ok(result)
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send + Sync {
    /// Generate the next batch of parameter points to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<ParameterPoint>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

// ---- Grid search ----

/// Exhaustive grid search, handed out in batches.
#[derive(Debug, Clone)]
pub struct GridSearch {
    cursor: usize,
    points: Vec<ParameterPoint>,
}

impl GridSearch {
    pub fn new(space: &ParameterSpace) -> Result<Self, ParameterError> {
        Ok(Self {
            cursor: 0,
            points: grid(space)?,
        })
    }

    /// Points not yet suggested.
    pub fn remaining(&self) -> usize {
        self.points.len() - self.cursor
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterPoint> {
        let end = self.cursor.saturating_add(count).min(self.points.len());
        let batch = self.points[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent uniform choice of one candidate per dimension.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: ParameterSpace,
}

impl RandomSearch {
    pub fn new(space: ParameterSpace) -> Result<Self, ParameterError> {
        space.validate()?;
        Ok(Self { space })
    }

    fn sample_one(&self) -> ParameterPoint {
        let mut rng = rand::rng();
        self.space
            .parameters()
            .iter()
            .fold(ParameterPoint::new(), |point, param| {
                let idx = rng.random_range(0..param.values.len());
                point.extended(&param.name, param.values[idx].clone())
            })
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterPoint> {
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Selection ----

/// Strategy used to pick the points of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Grid,
    Random,
}

/// Points to launch for `space`. Grid search takes every point unless
/// `trials` caps it; random search draws exactly `trials` points and
/// requires it.
pub fn select_points(
    space: &ParameterSpace,
    kind: StrategyKind,
    trials: Option<usize>,
) -> ExpResult<Vec<ParameterPoint>> {
    let (mut strategy, count): (Box<dyn SearchStrategy>, usize) = match kind {
        StrategyKind::Grid => {
            let search = GridSearch::new(space)?;
            let count = trials.unwrap_or(search.remaining());
            (Box::new(search), count)
        }
        StrategyKind::Random => {
            let count =
                trials.ok_or_else(|| validation_error!("random search needs a trial count"))?;
            (Box::new(RandomSearch::new(space.clone())?), count)
        }
    };

    let points = strategy.suggest(count);
    info!(strategy = strategy.name(), points = points.len(), "selected parameter points");
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_types::ParameterValue;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn sample_space() -> ParameterSpace {
        ParameterSpace::new()
            .add("x", [1, 2, 3, 5, 8, 13, 21])
            .add("y", [true, false])
            .add("z", ["foo", "bar"])
    }

    #[test]
    fn grid_orders_last_dimension_fastest() {
        let space = ParameterSpace::new().add("x", [1, 2]).add("y", [true, false]);
        let points = grid(&space).unwrap();

        let pairs: Vec<(ParameterValue, ParameterValue)> = points
            .iter()
            .map(|p| (p.get("x").unwrap().clone(), p.get("y").unwrap().clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (ParameterValue::Int(1), ParameterValue::Bool(true)),
                (ParameterValue::Int(1), ParameterValue::Bool(false)),
                (ParameterValue::Int(2), ParameterValue::Bool(true)),
                (ParameterValue::Int(2), ParameterValue::Bool(false)),
            ]
        );
    }

    #[test]
    fn grid_of_empty_space_is_one_empty_point() {
        let points = grid(&ParameterSpace::new()).unwrap();
        assert_eq!(points.len(), 1);
        assert!(points[0].is_empty());
    }

    #[test]
    fn grid_rejects_empty_dimension() {
        let space = ParameterSpace::new().add("x", [1]).add("y", Vec::<i64>::new());
        match grid(&space) {
            Err(ParameterError::InvalidParameterSpace { name }) => assert_eq!(name, "y"),
            other => panic!("expected invalid space, got {other:?}"),
        }
    }

    #[test]
    fn grid_rejects_names_sharing_an_env_var() {
        let space = ParameterSpace::new().add("lr", [0.1]).add("LR", [0.2]);
        assert!(matches!(
            grid(&space),
            Err(ParameterError::DuplicateParameter { .. })
        ));
    }

    #[test]
    fn grid_points_follow_declared_name_order() {
        let space = ParameterSpace::new().add("b", [1]).add("a", [2]);
        let points = grid(&space).unwrap();
        let names: Vec<&str> = points[0].names().collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn grid_search_produces_correct_count() {
        let space = sample_space();
        assert_eq!(space.grid_size(), Some(28));

        let mut gs = GridSearch::new(&space).unwrap();
        let batch = gs.suggest(100);
        assert_eq!(batch.len(), 28);
        assert_eq!(gs.remaining(), 0);
        assert_eq!(gs.name(), "grid");
    }

    #[test]
    fn grid_search_cursor_advances() {
        let space = ParameterSpace::new().add("x", [1, 2, 3, 4, 5]);
        let mut gs = GridSearch::new(&space).unwrap();
        let first = gs.suggest(3);
        assert_eq!(first.len(), 3);
        let second = gs.suggest(10);
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].get("x"), Some(&ParameterValue::Int(4)));
        assert!(gs.suggest(1).is_empty());
    }

    #[test]
    fn grid_search_survives_huge_batch() {
        let space = ParameterSpace::new().add("x", [1, 2, 3]);
        let mut gs = GridSearch::new(&space).unwrap();
        assert_eq!(gs.suggest(1).len(), 1);
        assert_eq!(gs.suggest(usize::MAX).len(), 2);
        assert!(gs.suggest(usize::MAX).is_empty());
        assert_eq!(gs.remaining(), 0);
    }

    #[test]
    fn select_grid_takes_every_point() {
        let space = sample_space();
        let points = select_points(&space, StrategyKind::Grid, None).unwrap();
        assert_eq!(points, grid(&space).unwrap());
    }

    #[test]
    fn select_grid_is_capped_by_trials() {
        let space = ParameterSpace::new().add("x", [1, 2]).add("y", [true, false]);
        let points = select_points(&space, StrategyKind::Grid, Some(2)).unwrap();
        assert_eq!(points, grid(&space).unwrap()[..2].to_vec());
        assert_eq!(points[1].get("y"), Some(&ParameterValue::Bool(false)));
    }

    #[test]
    fn select_random_needs_trials() {
        let space = sample_space();
        let err = select_points(&space, StrategyKind::Random, None).unwrap_err();
        assert!(matches!(err, ks_types::ExpError::Validation(_)));

        let points = select_points(&space, StrategyKind::Random, Some(7)).unwrap();
        assert_eq!(points.len(), 7);
    }

    #[test]
    fn select_rejects_invalid_space() {
        let space = ParameterSpace::new().add("x", Vec::<i64>::new());
        assert!(select_points(&space, StrategyKind::Grid, None).is_err());
        assert!(select_points(&space, StrategyKind::Random, Some(1)).is_err());
    }

    #[test]
    fn random_search_draws_from_candidates() {
        let space = sample_space();
        let mut rs = RandomSearch::new(space.clone()).unwrap();
        let suggestions = rs.suggest(50);
        assert_eq!(suggestions.len(), 50);

        for point in &suggestions {
            assert_eq!(point.len(), 3);
            for def in space.parameters() {
                let value = point.get(&def.name).unwrap();
                assert!(def.values.contains(value), "unexpected {}={value}", def.name);
            }
        }
    }

    #[test]
    fn random_search_rejects_empty_dimension() {
        let space = ParameterSpace::new().add("x", Vec::<bool>::new());
        assert!(RandomSearch::new(space).is_err());
    }

    fn arb_space() -> impl Strategy<Value = ParameterSpace> {
        prop::collection::vec(1usize..5, 0..5).prop_map(|sizes| {
            sizes
                .iter()
                .enumerate()
                .fold(ParameterSpace::new(), |space, (i, size)| {
                    space.add(format!("p{i}"), (0..*size as i64).collect::<Vec<_>>())
                })
        })
    }

    proptest! {
        /// Property: the grid has exactly the product of dimension sizes,
        /// with every name present and no repeated point
        #[test]
        fn prop_grid_is_full_product(space in arb_space()) {
            let points = grid(&space).unwrap();
            let expected: usize = space.parameters().iter().map(|p| p.values.len()).product();
            prop_assert_eq!(points.len(), expected);

            let mut seen = HashSet::new();
            for point in &points {
                prop_assert_eq!(point.len(), space.len());
                for def in space.parameters() {
                    prop_assert!(point.get(&def.name).is_some());
                }
                prop_assert!(seen.insert(point.to_json_string().unwrap()));
            }
        }

        /// Property: expansion is deterministic
        #[test]
        fn prop_grid_is_deterministic(space in arb_space()) {
            prop_assert_eq!(grid(&space).unwrap(), grid(&space).unwrap());
        }
    }
}
