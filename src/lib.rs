//! # Zmanim Engine
//!
//! Formula-driven zmanim: halachic times of day computed from user-authored formulas over solar
//! events, for any date and location.
//!
//! The crate pairs two pieces:
//! - **Ephemeris**: the NOAA mid-precision solar calculator (sub-minute below ±72° latitude) giving
//!   solar noon, solar midnight and the crossing of any zenith angle, with polar day and night
//!   reported as [`Error::AngleNotReached`] rather than a garbage time
//! - **Formula language**: a small typed expression language (`solar(16.1, before_sunrise)`,
//!   `proportional_hours(3, mga)`, `@other_zman + 18min`, `if (...) { } else { }`) parsed once
//!   into a closed [`Expression`] tree and evaluated against an [`EvaluationContext`]
//!
//! [`ZmanCalculator::evaluate_all`] evaluates a batch of definitions that reference each other:
//! cycles are detected before evaluation, every solar event is computed once per batch, and each
//! key gets its own result.
//!
//! ## Features
//!
//! - Deterministic: identical inputs give identical instants; evaluation has no shared state
//! - Every failure is a value with a stable [`ErrorKind`]
//! - Rounding to the minute is a presentation step ([`RoundingMode`]), never part of evaluation
//!
//! ## Feature Flags
//!
//! - `serde` (default): `Serialize`/`Deserialize` for the JSON calculation surface
//!   ([`CalculationRequest`]), [`ErrorKind`], [`RoundingMode`] and [`EngineConfig`]
//!
//! ## References
//!
//! - Meeus, J. (1998). Astronomical Algorithms, 2nd ed. Willmann-Bell. Chapters 7, 25 and 28.
//! - NOAA Global Monitoring Laboratory. Solar Calculator.
//!   <https://gml.noaa.gov/grad/solcalc/calcdetails.html>
//!
//! ## Quick Start
//!
//! ### One formula
//! ```rust
//! use zmanim_engine::{CalculationDate, GeoLocation, ZmanCalculator};
//!
//! let date = CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap();
//! let jerusalem = GeoLocation::new(31.7683, 35.2137, 750.0).unwrap();
//!
//! let alos = ZmanCalculator::default()
//!     .evaluate_formula("solar(16.1, before_sunrise)", &date, &jerusalem)
//!     .unwrap();
//! println!("Alos: {}", date.to_local(alos).format("%H:%M:%S"));
//! ```
//!
//! ### A batch with references
//! ```rust
//! use zmanim_engine::{CalculationDate, ErrorKind, GeoLocation, ZmanCalculator, ZmanDefinition};
//!
//! let date = CalculationDate::parse("2024-12-21", "Europe/Oslo").unwrap();
//! let tromso = GeoLocation::new(69.65, 18.96, 0.0).unwrap();
//!
//! let results = ZmanCalculator::default().evaluate_all(
//!     &[
//!         ZmanDefinition::new("noon", "solar_noon"),
//!         ZmanDefinition::new("netz", "sunrise"),
//!         ZmanDefinition::new("sof_zman_shma", "proportional_hours(3, custom(@netz, sunset))"),
//!     ],
//!     &date,
//!     &tromso,
//! );
//!
//! // Polar night: no sunrise, so anything built on it fails too, while noon still exists
//! assert!(results["noon"].is_ok());
//! assert_eq!(results["netz"].as_ref().unwrap_err().kind(), ErrorKind::AngleNotReached);
//! assert_eq!(results["sof_zman_shma"].as_ref().unwrap_err().kind(), ErrorKind::AngleNotReached);
//! ```
//!
//! ### Raw solar events
//! ```rust
//! use zmanim_engine::{compute_solar_event, CalculationDate, Direction, GeoLocation, Horizon, SolarEvent};
//!
//! let date = CalculationDate::parse("2024-03-20", "America/New_York").unwrap();
//! let nyc = GeoLocation::new(40.7128, -74.0060, 0.0).unwrap();
//!
//! let dusk = compute_solar_event(
//!     &date,
//!     &nyc,
//!     SolarEvent::crossing(Horizon::CivilTwilight, Direction::AfterSunset),
//! )
//! .unwrap();
//! println!("Civil dusk: {}", date.to_local(dusk));
//! ```
//!
//! ## Conventions
//!
//! - **Zenith angle**: 0° = directly overhead, 90° = geometric horizon, 90.833° = visible sunrise
//! - **Degrees below the horizon** (as in `solar(16.1, ...)`): zenith = 90° + degrees
//! - **Longitude**: positive east of Greenwich

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery, clippy::cargo, clippy::all)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cargo_common_metadata,
    clippy::multiple_crate_versions, // Acceptable for dev-dependencies
    clippy::float_cmp, // Exact comparisons of mathematical constants in tests
)]

// Public API exports
pub use crate::config::{EngineConfig, RoundingMode};
pub use crate::ephemeris::{CachedEphemeris, Ephemeris, NoaaEphemeris, compute_solar_event};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::evaluator::{EvaluationContext, NoReferences, ReferenceResolver, evaluate};
pub use crate::formula::{Expression, Position, SyntaxError, SyntaxErrorKind, parse};
#[cfg(feature = "serde")]
pub use crate::request::{
    CalculationRequest, CalculationResponse, FormulaInput, LocationInput, ZmanOutcome,
};
pub use crate::resolver::{DependencyGraph, ZmanCalculator, ZmanDefinition, ZmanResult};
pub use crate::time::CalculationDate;
pub use crate::types::{
    Direction, GeoLocation, Horizon, PolarCondition, Season, SolarAngleQuery, SolarDayFrame,
    SolarEvent,
};

// Algorithm modules
pub mod ephemeris;
pub mod noaa;

// Formula language
pub mod evaluator;
pub mod formula;
pub mod resolver;

// Core modules
pub mod config;
pub mod error;
pub mod types;

// Internal modules
mod math;

// Public modules
#[cfg(feature = "serde")]
pub mod request;
pub mod time;
