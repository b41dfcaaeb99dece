//! Callee re-analysis and ownership rule scenarios

mod common;

use common::*;
use dispose_flow::{
    analyze_procedure, AnalysisConfig, Argument, CalleeRef, CancellationToken, DiagnosticKind,
    DisposeAnalysisKind, InterproceduralKind, Operand, OperationKind, OwnershipEffect, OwnershipRules,
    Procedure, ProcedureBuilder, ProcedureId, Program, QualifiedName, Receiver, SymbolId,
};
use pretty_assertions::assert_eq;

/// `void <method>(Res r)`; `body` lowers the callee statements
fn helper(method: &str, body: impl FnOnce(&mut ProcedureBuilder, SymbolId)) -> Procedure {
    let mut b = ProcedureBuilder::method(name(method));
    let r = b.parameter("r", RES);
    body(&mut b, r);
    b.build()
}

/// Program with `callee` at id 0 and `a = new Res(); <callee>(a);` at id 1
fn pass_to(callee: Procedure) -> (Program, ProcedureId) {
    let mut program = Program::new();
    let path = callee.name.method_path();
    let callee_id = program.add(callee);

    let mut b = ProcedureBuilder::method(name("Caller"));
    let a = b.local("a");
    b.alloc(a, RES, "new Res()");
    b.call(None, CalleeRef::resolved(path, callee_id), vec![Argument::symbol(a)]);
    let caller = program.add(b.build());
    (program, caller)
}

fn use_helper() -> Procedure {
    helper("Use", |b, r| {
        let copy = b.local("copy");
        b.assign(copy, Operand::Symbol(r));
    })
}

fn rules(callee: &str, effects: Vec<OwnershipEffect>) -> AnalysisConfig {
    let rules = OwnershipRules::builtin()
        .with_rule(callee, effects)
        .expect("rule pattern should compile");
    AnalysisConfig::default().with_ownership_rules(rules)
}

// ═══════════════════════════════════════════════════════════════════════════
// Callee re-analysis
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_callee_that_only_reads_keeps_caller_ownership() {
    let (program, caller) = pass_to(use_helper());

    let verdicts = run_in(&program, caller, &AnalysisConfig::default());
    assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, 0);
}

#[test]
fn test_without_interprocedural_analysis_arguments_escape() {
    let (program, caller) = pass_to(use_helper());
    let config = AnalysisConfig::default().with_interprocedural(InterproceduralKind::None);

    assert_no_verdicts(&run_in(&program, caller, &config));
}

#[test]
fn test_callee_releases_argument() {
    let (program, caller) = pass_to(helper("Close", |b, r| {
        b.release(r);
    }));

    assert_no_verdicts(&run_in(&program, caller, &AnalysisConfig::default()));
}

#[test]
fn test_callee_stores_argument_in_static_field() {
    let (program, caller) = pass_to(helper("Register", |b, r| {
        b.field_write(Receiver::Static("Acme.Registry".into()), "Current", Operand::Symbol(r));
    }));

    assert_no_verdicts(&run_in(&program, caller, &AnalysisConfig::default()));
}

#[test]
fn test_call_chain_limit_falls_back_to_escape() {
    let (program, caller) = pass_to(use_helper());
    let config = AnalysisConfig::default().with_max_call_chain(0);

    assert_no_verdicts(&run_in(&program, caller, &config));
}

#[test]
fn test_callee_budget_falls_back_to_escape() {
    let (program, caller) = pass_to(use_helper());
    let config = AnalysisConfig::from_options([("max_interprocedural_callee_analyses", "0")]);

    assert_no_verdicts(&run_in(&program, caller, &config));
}

#[test]
fn test_ownership_transfer_at_method_call() {
    let (program, caller) = pass_to(use_helper());
    let config = AnalysisConfig::from_options([("dispose_ownership_transfer_at_method_call", "true")]);

    assert_no_verdicts(&run_in(&program, caller, &config));
}

#[test]
fn test_recursive_callee_terminates() {
    // Rec(Res r) { Rec(r); }
    let rec_id = ProcedureId(0);
    let (program, caller) = pass_to(helper("Rec", |b, r| {
        b.call(None, CalleeRef::resolved("Acme.Widget.Rec", rec_id), vec![Argument::symbol(r)]);
    }));

    // the recursive call is summarized conservatively, so the argument escapes
    assert_no_verdicts(&run_in(&program, caller, &AnalysisConfig::default()));
}

#[test]
fn test_callee_analysis_counted_in_stats() {
    let (program, caller) = pass_to(use_helper());

    let analysis = analyze_procedure(
        &program,
        caller,
        &AnalysisConfig::default(),
        &types(),
        &CancellationToken::new(),
    )
    .expect("analysis should succeed");
    assert_eq!(analysis.stats.callee_analyses, 1);
    assert!(analysis.stats.block_visits > 0);
}

#[test]
fn test_factory_result_reported_at_caller_call_site() {
    // Res Create() { var r = new Res(); return r; }
    let mut b = ProcedureBuilder::method(name("Create"));
    b.returns(RES);
    let r = b.local("r");
    b.alloc(r, RES, "new Res()");
    b.ret(Some(Operand::Symbol(r)));

    let mut program = Program::new();
    let create = program.add(b.build());

    let mut b = ProcedureBuilder::method(name("Caller"));
    let x = b.local("x");
    let call = b.call(Some(x), CalleeRef::resolved("Acme.Widget.Create", create), vec![]);
    let caller = program.add(b.build());

    let verdicts = run_in(&program, caller, &AnalysisConfig::default());
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, call);
    assert_eq!(verdict.site.procedure, caller);
    assert_eq!(verdict.creation, "Create()");
}

#[test]
fn test_release_method_that_throws_keeps_exception_path_open() {
    // Res.Dispose() { throw; }  a = new Res(); a.Dispose();
    let mut b = ProcedureBuilder::method(QualifiedName::new("", RES, "Dispose"));
    b.this();
    b.throw(None);
    let mut program = Program::new();
    let dispose = program.add(b.build());

    let mut b = ProcedureBuilder::method(name("Close"));
    let a = b.local("a");
    let alloc = b.alloc(a, RES, "new Res()");
    b.push(OperationKind::ReleaseCall {
        receiver: a,
        method: Some(CalleeRef::resolved("Res.Dispose", dispose)),
    });
    let caller = program.add(b.build());

    let config = AnalysisConfig::default().with_analysis_kind(DisposeAnalysisKind::AllPaths);
    let verdicts = run_in(&program, caller, &config);
    assert_single_verdict(&verdicts, DiagnosticKind::NotDisposedOnExceptionPaths, alloc);
}

/// `h = new Holder(a)` with a resolved constructor `Holder(Res r)`
fn construct_holder(stores_argument: bool) -> (Program, ProcedureId) {
    let mut b = ProcedureBuilder::constructor(QualifiedName::new("Acme", "Holder", ".ctor"));
    let r = b.parameter("r", RES);
    if stores_argument {
        b.field_write(Receiver::This, "resource", Operand::Symbol(r));
    }
    let mut program = Program::new();
    let ctor = program.add(b.build());

    let mut b = ProcedureBuilder::method(name("Caller"));
    let a = b.local("a");
    let h = b.local("h");
    b.alloc(a, RES, "new Res()");
    b.alloc_with(
        h,
        "Acme.Holder",
        vec![Argument::symbol(a)],
        Some(CalleeRef::resolved("Acme.Holder..ctor", ctor)),
        "new Holder(a)",
    );
    let caller = program.add(b.build());
    (program, caller)
}

#[test]
fn test_constructor_storing_argument_takes_ownership() {
    let (program, caller) = construct_holder(true);

    assert_no_verdicts(&run_in(&program, caller, &AnalysisConfig::default()));
}

#[test]
fn test_constructor_ignoring_argument_leaves_it_with_caller() {
    let (program, caller) = construct_holder(false);

    let verdicts = run_in(&program, caller, &AnalysisConfig::default());
    assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Ownership rules
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_rule_returns_new_instance() {
    let config = rules("Acme.Pool.Rent", vec![OwnershipEffect::ReturnsNewInstance]);
    let mut b = ProcedureBuilder::method(name("Borrow"));
    let x = b.local("x");
    let call = b.call(Some(x), CalleeRef::named("Acme.Pool.Rent").with_return_type(RES), vec![]);

    let verdicts = run_with(&config, b.build());
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, call);
    assert_eq!(verdict.creation, "Rent()");
}

#[test]
fn test_builtin_factory_uses_target_type() {
    let mut b = ProcedureBuilder::method(name("Read"));
    let fs = b.typed_local("fs", "System.IO.FileStream");
    let call = b.call(Some(fs), CalleeRef::named("System.IO.File.OpenRead"), vec![]);

    let verdicts = run(b.build());
    assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, call);
}

#[test]
fn test_rule_out_argument_new_instance() {
    let config = rules(
        "Acme.Pool.TryRent",
        vec![OwnershipEffect::OutArgumentNewInstance { index: 0 }],
    );
    let build = |release: bool| {
        let mut b = ProcedureBuilder::method(name("TryBorrow"));
        let r = b.typed_local("r", RES);
        b.call(None, CalleeRef::named("Acme.Pool.TryRent"), vec![Argument::out(r)]);
        if release {
            b.release(r);
        }
        b.build()
    };

    assert_single_verdict(&run_with(&config, build(false)), DiagnosticKind::NotDisposed, 0);
    assert_no_verdicts(&run_with(&config, build(true)));
}

#[test]
fn test_rule_without_effect_keeps_ownership() {
    let build = || {
        let mut b = ProcedureBuilder::method(name("Log"));
        let a = b.local("a");
        b.alloc(a, RES, "new Res()");
        b.call(None, CalleeRef::named("Acme.Log.Write"), vec![Argument::symbol(a)]);
        b.build()
    };

    // unmatched: conservative escape
    assert_no_verdicts(&run(build()));

    let config = rules("Acme.Log.*", vec![OwnershipEffect::NoEffect]);
    assert_single_verdict(&run_with(&config, build()), DiagnosticKind::NotDisposed, 0);
}

#[test]
fn test_rule_disposes_argument() {
    let config = rules("Acme.Util.Close", vec![OwnershipEffect::DisposesArgument { index: 0 }]);
    let mut b = ProcedureBuilder::method(name("Shutdown"));
    let a = b.local("a");
    b.alloc(a, RES, "new Res()");
    b.call(None, CalleeRef::named("Acme.Util.Close"), vec![Argument::symbol(a)]);

    assert_no_verdicts(&run_with(&config, b.build()));
}
