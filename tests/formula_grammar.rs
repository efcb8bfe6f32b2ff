//! Acceptance and rejection of formula text as publishers write it.

use zmanim_engine::formula::{DayFrame, Expression, MAX_NESTING_DEPTH, Primitive};
use zmanim_engine::{
    CalculationDate, Direction, Error, ErrorKind, GeoLocation, Position, SyntaxErrorKind,
    ZmanCalculator, parse,
};

fn offset_chain(links: usize) -> String {
    format!("sunrise{}", " + 1min".repeat(links))
}

#[test]
fn test_published_formulas_parse() {
    let formulas = [
        "sunrise",
        "visible_sunset",
        "solar_noon",
        "solar_midnight",
        "elevated_sunrise",
        "solar(16.1, before_sunrise)",
        "solar(8.5, after_sunset)",
        "solar(0, before_geometric_sunrise)",
        "solar(90, after_noon)",
        "seasonal_solar(16.1, before_sunrise)",
        "proportional_hours(3, gra)",
        "proportional_hours(3, mga)",
        "proportional_hours(4, mga_90_zmanis)",
        "proportional_hours(9.5, baal_hatanya)",
        "proportional_hours(10.75, ateret_torah)",
        "proportional_hours(-1.5, gra)",
        "proportional_hours(13, gra)",
        "proportional_hours(3, custom(solar(16.1, before_sunrise), solar(16.1, after_sunset)))",
        "proportional_minutes(72, before_sunrise)",
        "proportional_minutes(18, after_geometric_sunset)",
        "midpoint(visible_sunrise, visible_sunset)",
        "midpoint(visible_sunset, astronomical_dusk)",
        "max(solar_noon + 30min, proportional_hours(6.5, gra))",
        "min(sunset + 72min, solar(16.1, after_sunset))",
        "earlier_of(@a, @b)",
        "later_of(sunrise, civil_dawn)",
        "first_valid(solar(16.1, before_visible_sunrise), visible_sunrise - 72min)",
        "first_valid(visible_sunrise, visible_sunset, solar_noon)",
        "@alos_hashachar + 1hr 30min",
        "sunset - 1.5hr",
        "sunrise + (sunset - sunrise) / 2",
        "sunset + 0.5min",
        "if (month >= 5 && month <= 7 && latitude > 50) { solar_noon } else { solar(16.1, before_visible_sunrise) }",
        "if ((latitude > 50 && month >= 5) || month == 12) { visible_sunrise } else { visible_sunset }",
        "if (!(latitude > 60)) { visible_sunrise } else { visible_sunset }",
        "if (date == 29-Feb) { visible_sunrise } else { visible_sunset }",
        "if (date >= 21-Mar && date < 23-Sep) { sunset } else if (season == \"winter\") { sunset + 5min } else { sunset + 10min }",
        "if (day_of_year > 100 || elevation > 500 || longitude < 0) { sunrise } else { sunset }",
        "sunset // trailing comment\n + 40min",
        "/* Rabbeinu Tam */ sunset + 72min",
    ];

    for formula in formulas {
        if let Err(error) = parse(formula) {
            panic!("`{formula}` rejected: {error}");
        }
    }
}

#[test]
fn test_rejections_are_located() {
    let cases = [
        ("sunrize", SyntaxErrorKind::UnknownIdentifier, (1, 1)),
        ("solar(16.1, before_lunch)", SyntaxErrorKind::UnknownIdentifier, (1, 13)),
        ("proportional_hours(3, gr)", SyntaxErrorKind::UnknownIdentifier, (1, 23)),
        ("solar(16.1)", SyntaxErrorKind::Arity, (1, 11)),
        ("midpoint(sunrise)", SyntaxErrorKind::Arity, (1, 17)),
        ("solar(95, before_sunrise)", SyntaxErrorKind::OutOfRange, (1, 7)),
        ("solar(16.1, before_sunrise", SyntaxErrorKind::UnterminatedCall, (1, 1)),
        ("sunset + 72xyz", SyntaxErrorKind::InvalidUnit, (1, 12)),
        ("sunset # 5min", SyntaxErrorKind::UnexpectedCharacter, (1, 8)),
        ("sunset + /* 5min", SyntaxErrorKind::UnterminatedComment, (1, 10)),
        ("sunrise + sunset", SyntaxErrorKind::TypeMismatch, (1, 9)),
        ("sunrise\n  + sunset", SyntaxErrorKind::TypeMismatch, (2, 3)),
    ];

    for (source, kind, (line, column)) in cases {
        let error = parse(source).unwrap_err();
        assert_eq!(error.kind, kind, "`{source}`: {error}");
        assert_eq!(error.position, Position::new(line, column), "`{source}`: {error}");
    }
}

#[test]
fn test_error_kinds_on_the_wire() {
    let kind = |source: &str| Error::from(parse(source).unwrap_err()).kind();

    assert_eq!(kind("sunrise +"), ErrorKind::Syntax);
    assert_eq!(kind("frobnicate(1)"), ErrorKind::Syntax);
    assert_eq!(kind("solar(16.1)"), ErrorKind::ArityOrRange);
    assert_eq!(kind("solar(-1, before_sunrise)"), ErrorKind::ArityOrRange);
    assert_eq!(kind("sunset + 3days"), ErrorKind::ArityOrRange);
}

#[test]
fn test_unary_sign_binds_to_literals() {
    let expression = parse("proportional_hours(-1.5, gra)").unwrap();
    assert_eq!(
        expression,
        Expression::ProportionalHours {
            hours: -1.5,
            frame: DayFrame::Gra,
        }
    );
    assert!(parse("sunset + -18min").is_ok());
}

#[test]
fn test_plus_minus_associate_left() {
    // (sunset - 10min) - 5min, not sunset - (10min - 5min)
    let Expression::Binary { left, .. } = parse("sunset - 10min - 5min").unwrap() else {
        panic!("expected a binary expression");
    };
    assert!(matches!(*left, Expression::Binary { .. }));
}

#[test]
fn test_aliases_resolve_at_parse_time() {
    assert_eq!(parse("visible_sunrise").unwrap(), parse("sunrise").unwrap());
    assert_eq!(
        parse("solar(16.1, before_visible_sunrise)").unwrap(),
        Expression::Solar {
            degrees: 16.1,
            direction: Direction::BeforeSunrise,
        }
    );
    assert_eq!(parse("proportional_hours(3, mga_72)").unwrap(), parse("proportional_hours(3, mga)").unwrap());
    assert_eq!(
        parse("civil_dusk").unwrap(),
        Expression::Primitive(Primitive::CivilDusk)
    );
}

#[test]
fn test_canonical_text_is_stable() {
    for source in [
        "solar(16.1, before_sunrise)",
        "proportional_hours(3, mga)",
        "@shkia + 18min",
        "max(sunrise, civil_dawn + 30min)",
    ] {
        let expression = parse(source).unwrap();
        assert_eq!(expression.to_string(), source);
        assert_eq!(parse(&expression.to_string()).unwrap(), expression);
    }
}

#[test]
fn test_references_are_collected() {
    let expression = parse(
        "if (month > 6) { midpoint(@netz, @shkia) } else { proportional_hours(3, custom(@alos, @tzais)) }",
    )
    .unwrap();
    let references: Vec<&str> = expression.references().into_iter().collect();
    assert_eq!(references, ["alos", "netz", "shkia", "tzais"]);
}

#[test]
fn test_deep_parentheses_are_rejected() {
    let nested = |depth: usize| format!("{}sunrise{}", "(".repeat(depth), ")".repeat(depth));

    assert!(parse(&nested(MAX_NESTING_DEPTH)).is_ok());

    let error = parse(&nested(MAX_NESTING_DEPTH + 1)).unwrap_err();
    assert_eq!(error.kind, SyntaxErrorKind::TooDeep);
    assert_eq!(error.position, Position::new(1, MAX_NESTING_DEPTH as u32 + 1));

    let error = parse(&nested(100_000)).unwrap_err();
    assert_eq!(error.kind, SyntaxErrorKind::TooDeep);
    assert_eq!(Error::from(error).kind(), ErrorKind::Syntax);
}

#[test]
fn test_deep_calls_and_conditions_are_rejected() {
    let calls = format!("{}sunset{}", "min(sunrise, ".repeat(1000), ")".repeat(1000));
    assert_eq!(parse(&calls).unwrap_err().kind, SyntaxErrorKind::TooDeep);

    let negations = format!("if ({}month > 3) {{ sunrise }} else {{ sunset }}", "!".repeat(1000));
    assert_eq!(parse(&negations).unwrap_err().kind, SyntaxErrorKind::TooDeep);

    let conjunctions = format!(
        "if ({}month > 3) {{ sunrise }} else {{ sunset }}",
        "day > 1 && ".repeat(5000)
    );
    assert_eq!(parse(&conjunctions).unwrap_err().kind, SyntaxErrorKind::TooDeep);

    let else_ifs = format!("{}{{ sunset }}", "if (month > 3) { sunrise } else ".repeat(1000));
    assert_eq!(parse(&else_ifs).unwrap_err().kind, SyntaxErrorKind::TooDeep);
}

#[test]
fn test_long_offset_chains_are_bounded() {
    let longest = parse(&offset_chain(MAX_NESTING_DEPTH - 1)).unwrap();
    assert_eq!(longest.depth(), MAX_NESTING_DEPTH);

    // Each link deepens the left-leaning tree; the failing link is the 128th `+`
    let error = parse(&offset_chain(MAX_NESTING_DEPTH)).unwrap_err();
    assert_eq!(error.kind, SyntaxErrorKind::TooDeep);
    assert_eq!(error.position, Position::new(1, 7 * MAX_NESTING_DEPTH as u32 + 2));

    let date = CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap();
    let location = GeoLocation::new(31.7683, 35.2137, 0.0).unwrap();
    let calculator = ZmanCalculator::default();

    let error = calculator
        .evaluate_formula(&offset_chain(20_000), &date, &location)
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Syntax);

    let sunrise = calculator.evaluate_formula("sunrise", &date, &location).unwrap();
    let shifted = calculator
        .evaluate_formula(&offset_chain(MAX_NESTING_DEPTH - 1), &date, &location)
        .unwrap();
    assert_eq!((shifted - sunrise).num_minutes(), MAX_NESTING_DEPTH as i64 - 1);
}

#[test]
fn test_oversized_count_is_out_of_range() {
    let source = format!("proportional_hours(1{}, gra)", "0".repeat(400));
    let error = parse(&source).unwrap_err();
    assert_eq!(error.kind, SyntaxErrorKind::OutOfRange);
    assert_eq!(error.position, Position::new(1, 20));
    assert_eq!(Error::from(error).kind(), ErrorKind::ArityOrRange);

    let condition = format!("if (day_of_year > 1{}) {{ sunrise }} else {{ sunset }}", "0".repeat(400));
    assert_eq!(parse(&condition).unwrap_err().kind, SyntaxErrorKind::OutOfRange);
}

#[test]
fn test_daytime_side_directions_name_the_same_crossing() {
    let morning = parse("solar(16.1, before_sunrise)").unwrap();
    let evening = parse("solar(16.1, after_sunset)").unwrap();

    for alias in ["after_sunrise", "after_visible_sunrise", "after_geometric_sunrise"] {
        assert_eq!(parse(&format!("solar(16.1, {alias})")).unwrap(), morning, "{alias}");
    }
    for alias in ["before_sunset", "before_visible_sunset", "before_geometric_sunset"] {
        assert_eq!(parse(&format!("solar(16.1, {alias})")).unwrap(), evening, "{alias}");
    }
    assert_eq!(parse("solar(16.1, after_sunrise)").unwrap().to_string(), "solar(16.1, before_sunrise)");
}

#[test]
fn test_daytime_side_directions_only_in_solar() {
    let cases = [
        ("seasonal_solar(16.1, after_sunrise)", (1, 22)),
        ("seasonal_solar(16.1, before_noon)", (1, 22)),
        ("proportional_minutes(72, before_sunset)", (1, 26)),
        ("proportional_minutes(72, after_geometric_sunrise)", (1, 26)),
    ];
    for (source, (line, column)) in cases {
        let error = parse(source).unwrap_err();
        assert_eq!(error.kind, SyntaxErrorKind::UnknownIdentifier, "`{source}`");
        assert_eq!(error.position, Position::new(line, column), "`{source}`");
    }
}
