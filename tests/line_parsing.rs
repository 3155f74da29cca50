use inhaler_logger_lib::device::InhalerCatalog;
use inhaler_logger_lib::serial::{parse_line, ParseError, FIELD_COUNT};

const FIELDS: [&str; FIELD_COUNT] = [
    "2024", "12", "02", "14", "30", "15", "22.5", "45.0", "1013.0", "3.5", "2.0",
];

#[test]
fn test_flow_matches_formula_for_catalog_inhalers() {
    let catalog = InhalerCatalog::builtin();
    for device in catalog.devices() {
        for step in 0..50 {
            let dp = step as f64 * 0.137;
            let line = format!("2024 12 02 14 30 15 22.5 45.0 1013.0 {} {}", step, dp);
            let reading = parse_line(&line, device.resistance).unwrap();

            let expected = ((dp * 1000.0).sqrt() / device.resistance * 60.0 * 100.0).round() / 100.0;
            assert_eq!(reading.flow_rate_lpm, expected, "{} at {} kPa", device.name, dp);
            assert_eq!(reading.pressure_drop_kpa, dp);
            assert_eq!(reading.measurement_time_s, step as f64);
        }
    }
}

#[test]
fn test_only_eleven_tokens_are_accepted() {
    for count in 0..=14 {
        let tokens: Vec<&str> = FIELDS.iter().cycle().take(count).copied().collect();
        let line = tokens.join(" ");
        let result = parse_line(&line, 1.0);

        if count == FIELD_COUNT {
            assert!(result.is_ok(), "{:?}", result);
        } else {
            match result {
                Err(ParseError::MalformedLine { tokens, .. }) => assert_eq!(tokens, count),
                other => panic!("{} tokens: expected MalformedLine, got {:?}", count, other),
            }
        }
    }
}

#[test]
fn test_separator_runs_and_tabs() {
    let reading = parse_line("\t2024  12 02\t14 30 15   22.5 45.0 1013.0 3.5 2.0  ", 1.0).unwrap();
    assert_eq!(reading.year, 2024);
    assert_eq!(reading.day, 2);
    assert_eq!(reading.flow_rate_lpm, 2683.28);
}

#[test]
fn test_error_keeps_offending_line() {
    let err = parse_line("2024 12 02 14 30 15 22.5 45.0 1013.0 3.5 n/a", 1.0).unwrap_err();
    assert_eq!(err.line(), "2024 12 02 14 30 15 22.5 45.0 1013.0 3.5 n/a");
    match err {
        ParseError::FieldTypeError { field, .. } => assert_eq!(field, "pressure drop"),
        other => panic!("unexpected {:?}", other),
    }
}
