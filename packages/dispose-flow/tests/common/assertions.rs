//! Custom assertions for verdict lists

use dispose_flow::{DiagnosticKind, OperationId, Verdict};

pub fn assert_no_verdicts(verdicts: &[Verdict]) {
    assert!(
        verdicts.is_empty(),
        "Expected no verdicts, got {}: {:#?}",
        verdicts.len(),
        verdicts
    );
}

/// Exactly one verdict of `kind` reported at `operation`
pub fn assert_single_verdict(verdicts: &[Verdict], kind: DiagnosticKind, operation: OperationId) -> &Verdict {
    assert_eq!(
        verdicts.len(),
        1,
        "Expected exactly one verdict, got {}: {:#?}",
        verdicts.len(),
        verdicts
    );
    let verdict = &verdicts[0];
    assert_eq!(verdict.kind, kind, "Wrong diagnostic kind for {:?}", verdict);
    assert_eq!(
        verdict.site.operation, operation,
        "Verdict reported at the wrong operation: {:?}",
        verdict
    );
    verdict
}
