//! Batch evaluation of zmanim that reference each other.
//!
//! [`DependencyGraph`] collects the `@key` references of every definition, finds the keys that sit on
//! a reference cycle, and orders the rest so that each zman is evaluated after everything it
//! references. [`ZmanCalculator::evaluate_all`] runs that order against one memoizing ephemeris,
//! recording a result per key; one failing zman never stops the others.

use crate::ephemeris::{CachedEphemeris, Ephemeris, NoaaEphemeris};
use crate::evaluator::{EvaluationContext, evaluate};
use crate::formula::{Expression, SyntaxError, parse};
use crate::time::CalculationDate;
use crate::types::GeoLocation;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::OnceLock;

/// Outcome for one key of a batch.
pub type ZmanResult = Result<DateTime<Utc>>;

/// A named formula. The parse is cached on first use.
#[derive(Debug, Clone)]
pub struct ZmanDefinition {
    key: String,
    formula: String,
    display_name: Option<String>,
    parsed: OnceLock<core::result::Result<Expression, SyntaxError>>,
}

impl ZmanDefinition {
    /// Creates a definition.
    pub fn new(key: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            formula: formula.into(),
            display_name: None,
            parsed: OnceLock::new(),
        }
    }

    /// Attaches a human-readable name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Batch key, referenced from other formulas as `@key`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Formula source.
    #[must_use]
    pub fn formula(&self) -> &str {
        &self.formula
    }

    /// Human-readable name, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// The parsed formula.
    ///
    /// # Errors
    /// The formula's `SyntaxError`.
    pub fn expression(&self) -> core::result::Result<&Expression, SyntaxError> {
        self.parsed
            .get_or_init(|| parse(&self.formula))
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// References between the zmanim of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    references: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Builds the graph from parsed definitions. Definitions that fail to parse are nodes without
    /// edges.
    pub fn new<'d>(definitions: impl IntoIterator<Item = &'d ZmanDefinition>) -> Self {
        let references = definitions
            .into_iter()
            .map(|definition| {
                let keys = definition
                    .expression()
                    .map(|expression| {
                        expression
                            .references()
                            .into_iter()
                            .map(str::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();
                (definition.key().to_owned(), keys)
            })
            .collect();
        Self { references }
    }

    /// Keys in the graph, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.references.keys().map(String::as_str)
    }

    /// Keys referenced by `key`, including keys that are not defined.
    #[must_use]
    pub fn references(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.references.get(key)
    }

    /// The shortest reference path from `key` back to itself, e.g. `["a", "b", "a"]`.
    ///
    /// `None` when `key` is not on a cycle.
    #[must_use]
    pub fn cycle_through(&self, key: &str) -> Option<Vec<String>> {
        let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
        let mut queue = VecDeque::from([key]);

        while let Some(current) = queue.pop_front() {
            for next in self.references.get(current).into_iter().flatten() {
                if next == key {
                    let mut path = vec![current.to_owned()];
                    let mut node = current;
                    while let Some(&previous) = parent.get(node) {
                        path.push(previous.to_owned());
                        node = previous;
                    }
                    path.reverse();
                    path.push(key.to_owned());
                    return Some(path);
                }
                if self.references.contains_key(next.as_str()) && !parent.contains_key(next.as_str()) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Every key that lies on a cycle, with its cycle path.
    #[must_use]
    pub fn cycles(&self) -> BTreeMap<&str, Vec<String>> {
        self.keys()
            .filter_map(|key| self.cycle_through(key).map(|cycle| (key, cycle)))
            .collect()
    }

    /// Keys not on a cycle, each after the keys it references. Ties are broken alphabetically.
    #[must_use]
    pub fn evaluation_order(&self) -> Vec<&str> {
        let on_cycle = self.cycles();
        let nodes: BTreeSet<&str> = self.keys().filter(|key| !on_cycle.contains_key(key)).collect();

        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for &key in &nodes {
            let dependencies: Vec<&str> = self.references[key]
                .iter()
                .map(String::as_str)
                .filter(|dependency| nodes.contains(dependency))
                .collect();
            pending.insert(key, dependencies.len());
            for dependency in dependencies {
                dependents.entry(dependency).or_default().push(key);
            }
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&key, _)| key)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(key) = ready.pop_first() {
            order.push(key);
            for &dependent in dependents.get(key).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
        order
    }
}

/// Evaluates formulas for one date and location.
#[derive(Debug, Clone)]
pub struct ZmanCalculator<E = NoaaEphemeris> {
    ephemeris: E,
}

impl Default for ZmanCalculator {
    fn default() -> Self {
        Self::new(NoaaEphemeris::new())
    }
}

impl<E: Ephemeris> ZmanCalculator<E> {
    /// Calculator backed by `ephemeris`.
    pub const fn new(ephemeris: E) -> Self {
        Self { ephemeris }
    }

    /// The underlying ephemeris.
    pub const fn ephemeris(&self) -> &E {
        &self.ephemeris
    }

    /// Evaluates one standalone formula; references are unknown.
    ///
    /// # Errors
    /// `Syntax` when the formula does not parse, otherwise any evaluation failure.
    pub fn evaluate_formula(
        &self,
        formula: &str,
        date: &CalculationDate,
        location: &GeoLocation,
    ) -> Result<DateTime<Utc>> {
        let expression = parse(formula)?;
        evaluate(&expression, &EvaluationContext::new(*date, *location, &self.ephemeris))
    }

    /// Evaluates a batch, returning one result per distinct key.
    ///
    /// Each solar event is computed at most once for the whole batch. Keys on a reference cycle
    /// fail with `CircularReference` before anything is evaluated. When a key is defined twice the
    /// last definition wins.
    ///
    /// # Example
    /// ```
    /// use zmanim_engine::{CalculationDate, GeoLocation, ZmanCalculator, ZmanDefinition};
    ///
    /// let date = CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap();
    /// let location = GeoLocation::new(31.7683, 35.2137, 750.0).unwrap();
    /// let results = ZmanCalculator::default().evaluate_all(
    ///     &[
    ///         ZmanDefinition::new("shkia", "sunset"),
    ///         ZmanDefinition::new("tzais", "@shkia + 18min"),
    ///         ZmanDefinition::new("a", "@b + 1min"),
    ///         ZmanDefinition::new("b", "@a - 1min"),
    ///     ],
    ///     &date,
    ///     &location,
    /// );
    ///
    /// assert!(results["tzais"].is_ok());
    /// assert!(results["a"].is_err() && results["b"].is_err());
    /// ```
    pub fn evaluate_all(
        &self,
        definitions: &[ZmanDefinition],
        date: &CalculationDate,
        location: &GeoLocation,
    ) -> BTreeMap<String, ZmanResult> {
        let mut unique: BTreeMap<&str, &ZmanDefinition> = BTreeMap::new();
        for definition in definitions {
            if unique.insert(definition.key(), definition).is_some() {
                log::warn!("zman `{}` is defined more than once; using the last definition", definition.key());
            }
        }

        let graph = DependencyGraph::new(unique.values().copied());
        let mut results: BTreeMap<String, ZmanResult> = BTreeMap::new();

        for (key, definition) in &unique {
            if let Err(error) = definition.expression() {
                results.insert((*key).to_owned(), Err(Error::from(error)));
            }
        }
        for (key, cycle) in graph.cycles() {
            results.insert(key.to_owned(), Err(Error::circular_reference(cycle)));
        }

        let order = graph.evaluation_order();
        log::debug!("evaluating {} zmanim for {}: {order:?}", order.len(), date.date());

        let ephemeris = CachedEphemeris::new(&self.ephemeris);
        for key in order {
            let Ok(expression) = unique[key].expression() else {
                continue;
            };
            let result = {
                let context = EvaluationContext::new(*date, *location, &ephemeris).with_references(&results);
                evaluate(expression, &context)
            };
            results.insert(key.to_owned(), result);
        }

        for (key, result) in &results {
            if let Err(error) = result {
                log::warn!("zman `{key}` failed: {error}");
            }
        }
        log::debug!(
            "batch for {} used {} distinct ephemeris queries",
            date.date(),
            ephemeris.len()
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn definitions(pairs: &[(&str, &str)]) -> Vec<ZmanDefinition> {
        pairs
            .iter()
            .map(|(key, formula)| ZmanDefinition::new(*key, *formula))
            .collect()
    }

    #[test]
    fn test_definition_caches_parse() {
        let definition = ZmanDefinition::new("alos", "solar(16.1, before_sunrise)").with_display_name("Alos");
        let first: *const Expression = definition.expression().unwrap();
        let second: *const Expression = definition.expression().unwrap();
        assert_eq!(first, second);
        assert_eq!(definition.display_name(), Some("Alos"));
        assert!(ZmanDefinition::new("bad", "sunrise +").expression().is_err());
    }

    #[test]
    fn test_cycle_paths() {
        let defs = definitions(&[
            ("a", "@b + 1min"),
            ("b", "@a - 1min"),
            ("c", "@c + 1min"),
            ("d", "@a"),
            ("e", "sunrise"),
        ]);
        let graph = DependencyGraph::new(&defs);

        assert_eq!(graph.cycle_through("a").unwrap(), ["a", "b", "a"]);
        assert_eq!(graph.cycle_through("b").unwrap(), ["b", "a", "b"]);
        assert_eq!(graph.cycle_through("c").unwrap(), ["c", "c"]);
        assert_eq!(graph.cycle_through("d"), None);
        assert_eq!(graph.cycles().keys().copied().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn test_longer_cycle_path() {
        let defs = definitions(&[("x", "@y"), ("y", "@z"), ("z", "max(@x, sunrise)")]);
        let graph = DependencyGraph::new(&defs);
        assert_eq!(graph.cycle_through("y").unwrap(), ["y", "z", "x", "y"]);
    }

    #[test]
    fn test_evaluation_order() {
        let defs = definitions(&[
            ("tzais", "@shkia + 18min"),
            ("shkia", "sunset"),
            ("plag", "proportional_hours(10.75, custom(@netz, @shkia))"),
            ("netz", "sunrise"),
            ("missing", "@nowhere"),
        ]);
        let graph = DependencyGraph::new(&defs);
        assert_eq!(graph.evaluation_order(), ["missing", "netz", "shkia", "plag", "tzais"]);
    }

    #[test]
    fn test_order_skips_cycles_and_keeps_dependents() {
        let defs = definitions(&[("a", "@b"), ("b", "@a"), ("d", "@a + 5min"), ("e", "sunset")]);
        assert_eq!(DependencyGraph::new(&defs).evaluation_order(), ["d", "e"]);
    }

    #[test]
    fn test_evaluate_all_isolates_failures() {
        let date = CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap();
        let location = GeoLocation::new(31.7683, 35.2137, 750.0).unwrap();
        let results = ZmanCalculator::default().evaluate_all(
            &definitions(&[
                ("shkia", "sunset"),
                ("tzais", "@shkia + 18min"),
                ("broken", "sunset +"),
                ("uses_broken", "@broken + 5min"),
                ("a", "@b + 1min"),
                ("b", "@a - 1min"),
                ("d", "@a"),
                ("lost", "@nowhere"),
            ]),
            &date,
            &location,
        );

        assert_eq!(results.len(), 8);
        assert!(results["shkia"].is_ok());
        assert!(results["tzais"].as_ref().unwrap() > results["shkia"].as_ref().unwrap());

        let kind = |key: &str| results[key].as_ref().unwrap_err().kind();
        assert_eq!(kind("broken"), ErrorKind::Syntax);
        assert_eq!(kind("uses_broken"), ErrorKind::Syntax);
        assert_eq!(kind("a"), ErrorKind::CircularReference);
        assert_eq!(kind("b"), ErrorKind::CircularReference);
        assert_eq!(kind("d"), ErrorKind::CircularReference);
        assert_eq!(results["lost"], Err(Error::unknown_reference("nowhere")));
        assert!(matches!(
            results["d"],
            Err(Error::ReferenceFailed { ref key, .. }) if key == "a"
        ));
    }

    #[test]
    fn test_evaluate_formula() {
        let date = CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap();
        let location = GeoLocation::new(31.7683, 35.2137, 750.0).unwrap();
        let calculator = ZmanCalculator::new(NoaaEphemeris::new());

        assert!(calculator.evaluate_formula("sunset + 40min", &date, &location).is_ok());
        assert_eq!(
            calculator.evaluate_formula("sunset +", &date, &location).unwrap_err().kind(),
            ErrorKind::Syntax
        );
        assert_eq!(
            calculator.evaluate_formula("@tzais", &date, &location),
            Err(Error::unknown_reference("tzais"))
        );
    }
}
