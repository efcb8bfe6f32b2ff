//! Batch evaluation: dependency order, cycles, shared ephemeris queries and failure isolation.

use chrono::{DateTime, Utc};
use std::cell::Cell;
use zmanim_engine::{
    CalculationDate, Direction, Ephemeris, Error, ErrorKind, GeoLocation, Horizon, NoaaEphemeris,
    SolarEvent, ZmanCalculator, ZmanDefinition,
};

/// Counts sunset queries on their way to the NOAA ephemeris.
#[derive(Default)]
struct CountingEphemeris {
    inner: NoaaEphemeris,
    sunsets: Cell<usize>,
    total: Cell<usize>,
}

impl Ephemeris for CountingEphemeris {
    fn solar_event(
        &self,
        date: &CalculationDate,
        location: &GeoLocation,
        event: SolarEvent,
    ) -> zmanim_engine::Result<DateTime<Utc>> {
        self.total.set(self.total.get() + 1);
        if event == SolarEvent::crossing(Horizon::Visible, Direction::AfterSunset) {
            self.sunsets.set(self.sunsets.get() + 1);
        }
        self.inner.solar_event(date, location, event)
    }
}

fn jerusalem() -> (CalculationDate, GeoLocation) {
    (
        CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap(),
        GeoLocation::new(31.7683, 35.2137, 750.0).unwrap(),
    )
}

#[test]
fn test_mutual_references_are_cycles() {
    let (date, location) = jerusalem();
    let results = ZmanCalculator::default().evaluate_all(
        &[
            ZmanDefinition::new("a", "@b + 1min"),
            ZmanDefinition::new("b", "@a - 1min"),
        ],
        &date,
        &location,
    );

    assert_eq!(results.len(), 2);
    assert_eq!(
        results["a"],
        Err(Error::circular_reference(vec!["a".into(), "b".into(), "a".into()]))
    );
    assert_eq!(
        results["b"],
        Err(Error::circular_reference(vec!["b".into(), "a".into(), "b".into()]))
    );
}

#[test]
fn test_long_cycles_terminate() {
    let (date, location) = jerusalem();
    let mut definitions: Vec<ZmanDefinition> = (0..500)
        .map(|i| ZmanDefinition::new(format!("z{i}"), format!("@z{} + 1min", i + 1)))
        .collect();
    definitions.push(ZmanDefinition::new("z500", "@z0"));

    let results = ZmanCalculator::default().evaluate_all(&definitions, &date, &location);
    assert_eq!(results.len(), 501);
    assert!(results.values().all(|r| r.as_ref().unwrap_err().kind() == ErrorKind::CircularReference));
}

#[test]
fn test_fifty_zmanim_share_one_sunset() {
    let (date, location) = jerusalem();
    let mut definitions = vec![ZmanDefinition::new("shkia", "sunset")];
    for i in 1..50 {
        let formula = if i % 2 == 0 {
            format!("sunset + {i}min")
        } else {
            format!("@shkia + {i}min")
        };
        definitions.push(ZmanDefinition::new(format!("z{i}"), formula));
    }

    let calculator = ZmanCalculator::new(CountingEphemeris::default());
    let results = calculator.evaluate_all(&definitions, &date, &location);

    assert_eq!(results.len(), 50);
    assert!(results.values().all(Result::is_ok));
    assert_eq!(calculator.ephemeris().sunsets.get(), 1);
    assert_eq!(calculator.ephemeris().total.get(), 1);
}

#[test]
fn test_cache_lives_for_one_batch() {
    let (date, location) = jerusalem();
    let definitions = [
        ZmanDefinition::new("netz", "sunrise"),
        ZmanDefinition::new("shkia", "sunset"),
        ZmanDefinition::new("chatzos", "proportional_hours(6, gra)"),
        ZmanDefinition::new("plag", "proportional_hours(10.75, gra)"),
    ];

    let calculator = ZmanCalculator::new(CountingEphemeris::default());
    calculator.evaluate_all(&definitions, &date, &location);
    assert_eq!(calculator.ephemeris().total.get(), 2);

    calculator.evaluate_all(&definitions, &date, &location);
    assert_eq!(calculator.ephemeris().sunsets.get(), 2);
}

#[test]
fn test_failures_stay_with_their_key() {
    let (date, location) = jerusalem();
    let results = ZmanCalculator::default().evaluate_all(
        &[
            ZmanDefinition::new("netz", "sunrise"),
            ZmanDefinition::new("typo", "sunrize"),
            ZmanDefinition::new("after_typo", "@typo + 5min"),
            ZmanDefinition::new("missing", "@nonexistent"),
            ZmanDefinition::new("fallback", "first_valid(@missing, @netz)"),
            ZmanDefinition::new("reversed", "proportional_hours(3, custom(sunset, sunrise))"),
            ZmanDefinition::new("range", "solar(120, before_sunrise)"),
        ],
        &date,
        &location,
    );

    let kind = |key: &str| results[key].as_ref().unwrap_err().kind();
    assert!(results["netz"].is_ok());
    assert_eq!(kind("typo"), ErrorKind::Syntax);
    assert_eq!(kind("after_typo"), ErrorKind::Syntax);
    assert_eq!(kind("missing"), ErrorKind::UnknownReference);
    assert_eq!(results["fallback"], results["netz"]);
    assert_eq!(kind("reversed"), ErrorKind::DegenerateDayFrame);
    assert_eq!(kind("range"), ErrorKind::ArityOrRange);

    let detail = results["after_typo"].as_ref().unwrap_err().to_string();
    assert!(detail.contains("@typo"), "{detail}");
}

#[test]
fn test_polar_failure_propagates_through_references() {
    let date = CalculationDate::parse("2024-06-21", "Europe/Oslo").unwrap();
    let tromso = GeoLocation::new(69.65, 18.96, 0.0).unwrap();
    let results = ZmanCalculator::default().evaluate_all(
        &[
            ZmanDefinition::new("alos", "solar(16.1, before_sunrise)"),
            ZmanDefinition::new("misheyakir", "@alos + 30min"),
            ZmanDefinition::new("chatzos", "solar_noon"),
            ZmanDefinition::new("safe_alos", "first_valid(@alos, solar_midnight)"),
        ],
        &date,
        &tromso,
    );

    let misheyakir = results["misheyakir"].as_ref().unwrap_err();
    assert_eq!(misheyakir.kind(), ErrorKind::AngleNotReached);
    assert!(matches!(misheyakir, Error::ReferenceFailed { key, .. } if key == "alos"));
    assert!(matches!(misheyakir.root_cause(), Error::AngleNotReached { .. }));
    assert!(results["chatzos"].is_ok());
    assert!(results["safe_alos"].is_ok());
}

#[test]
fn test_batch_matches_standalone_formulas() {
    let (date, location) = jerusalem();
    let calculator = ZmanCalculator::default();
    let results = calculator.evaluate_all(
        &[
            ZmanDefinition::new("netz", "sunrise"),
            ZmanDefinition::new("shkia", "sunset"),
            ZmanDefinition::new("chatzos", "midpoint(@netz, @shkia)"),
            ZmanDefinition::new("chatzos_hours", "proportional_hours(6, gra)"),
        ],
        &date,
        &location,
    );

    let standalone = calculator
        .evaluate_formula("midpoint(sunrise, sunset)", &date, &location)
        .unwrap();
    assert_eq!(results["chatzos"].as_ref().unwrap(), &standalone);

    let drift = (*results["chatzos_hours"].as_ref().unwrap() - standalone).num_milliseconds().abs();
    assert!(drift <= 1000, "drift {drift} ms");
}

#[test]
fn test_last_duplicate_definition_wins() {
    let (date, location) = jerusalem();
    let results = ZmanCalculator::default().evaluate_all(
        &[
            ZmanDefinition::new("tzais", "sunset + 18min"),
            ZmanDefinition::new("tzais", "sunset + 72min"),
        ],
        &date,
        &location,
    );
    let sunset = ZmanCalculator::default()
        .evaluate_formula("sunset", &date, &location)
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!((*results["tzais"].as_ref().unwrap() - sunset).num_minutes(), 72);
}
