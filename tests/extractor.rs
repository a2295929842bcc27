//! Fixture-based extractor test, mirroring
//! `original_source/parsers/current_test.go`'s `TestParse`: load a source
//! file and a combined build-output capture from `testdata/`, parse them,
//! and check that assembly, mapping and diagnostics all came out non-empty.

use goce_core::extractor::{find_matching, ExtractorInput};

#[test]
fn parses_testdata_fixture() {
    let source = std::fs::read_to_string("tests/testdata/main.go").unwrap();
    let build_output = std::fs::read("tests/testdata/buildoutput").unwrap();

    let version = semver::Version::new(1, 22, 0);
    let extractor = find_matching(&version).expect("1.22.0 is above the version floor");

    let result = extractor.parse(ExtractorInput {
        source_code: &source,
        build_output: &build_output,
        structured_json: None,
    });

    assert!(!result.assembly.is_empty());
    assert!(!result.mapping.is_empty());
    assert!(!result.diagnostics.is_empty());

    assert!(result.mapping.len() >= 4, "expected one mapping entry per distinct source line");
    assert_eq!(result.assembly.lines().count(), 5);

    let has_inlining_analysis = result
        .diagnostics
        .iter()
        .any(|d| matches!(d, goce_core::model::Diagnostic::InliningAnalysis { .. }));
    let has_inlined_call = result
        .diagnostics
        .iter()
        .any(|d| matches!(d, goce_core::model::Diagnostic::InlinedCall { .. }));
    let has_heap_escape = result
        .diagnostics
        .iter()
        .any(|d| matches!(d, goce_core::model::Diagnostic::HeapEscape { .. }));

    assert!(has_inlining_analysis, "expected a can-inline diagnostic from the fixture");
    assert!(has_inlined_call, "expected an inlined-call diagnostic from the fixture");
    assert!(has_heap_escape, "expected a heap-escape diagnostic from the fixture");
}

#[test]
fn old_toolchain_version_yields_no_extractor() {
    assert!(find_matching(&semver::Version::new(1, 16, 0)).is_none());
}
