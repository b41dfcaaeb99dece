//! Test fixtures

use dispose_flow::{
    analyze_procedure, AnalysisConfig, CancellationToken, DisposableTypeSet, Procedure,
    ProcedureId, Program, QualifiedName, Verdict,
};

/// Disposable type used by most scenarios
pub const RES: &str = "Res";

/// `Res`, two library streams and `System.Object` as a carrier
pub fn types() -> DisposableTypeSet {
    DisposableTypeSet::from_names([RES, "System.IO.FileStream", "System.IO.StreamReader"])
        .with_carrier("System.Object")
}

/// `Acme.Widget.<method>`
pub fn name(method: &str) -> QualifiedName {
    QualifiedName::new("Acme", "Widget", method)
}

/// Analyze a single procedure with the default configuration
pub fn run(procedure: Procedure) -> Vec<Verdict> {
    run_with(&AnalysisConfig::default(), procedure)
}

pub fn run_with(config: &AnalysisConfig, procedure: Procedure) -> Vec<Verdict> {
    let mut program = Program::new();
    let id = program.add(procedure);
    run_in(&program, id, config)
}

/// Analyze `id` of a multi-procedure program
pub fn run_in(program: &Program, id: ProcedureId, config: &AnalysisConfig) -> Vec<Verdict> {
    analyze_procedure(program, id, config, &types(), &CancellationToken::new())
        .expect("analysis should succeed")
        .verdicts
}
