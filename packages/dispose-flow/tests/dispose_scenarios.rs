//! Intraprocedural dispose scenarios
//!
//! Each test lowers a small method with the procedure builder and checks the
//! verdicts reported for it.

mod common;

use common::*;
use dispose_flow::{
    AnalysisConfig, Argument, CalleeRef, Classification, Condition, DiagnosticKind, DisposeAnalysisKind,
    Operand, OperationKind, PathKind, Procedure, ProcedureBuilder, Receiver,
};
use pretty_assertions::assert_eq;

fn all_paths() -> AnalysisConfig {
    AnalysisConfig::default().with_analysis_kind(DisposeAnalysisKind::AllPaths)
}

// ═══════════════════════════════════════════════════════════════════════════
// Straight-line code
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_released_through_alias() {
    let mut b = ProcedureBuilder::method(name("Alias"));
    let a = b.local("a");
    let c = b.local("c");
    b.alloc(a, RES, "new Res()");
    b.assign(c, Operand::Symbol(a));
    b.release(c);

    assert_no_verdicts(&run(b.build()));
}

#[test]
fn test_never_released() {
    let mut b = ProcedureBuilder::method(name("Leak"));
    let a = b.local("a");
    let alloc = b.alloc(a, RES, "new Res()");

    let verdicts = run(b.build());
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, alloc);
    assert_eq!(verdict.creation, "new Res()");
    assert_eq!(verdict.classification, Classification::NotDisposed);
    assert_eq!(verdict.path_kind, PathKind::AllPaths);
    assert!(verdict.message().contains("new Res()"));
}

#[test]
fn test_non_disposable_type_ignored() {
    let mut b = ProcedureBuilder::method(name("Plain"));
    let a = b.local("a");
    b.alloc(a, "Acme.Point", "new Point()");

    assert_no_verdicts(&run(b.build()));
}

#[test]
fn test_creation_text_is_first_syntax_line() {
    let mut b = ProcedureBuilder::method(name("Multiline"));
    let a = b.local("a");
    let alloc = b.alloc(a, RES, "new Res(\n    \"path\")");

    let verdicts = run(b.build());
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, alloc);
    assert_eq!(verdict.creation, "new Res(");
}

#[test]
fn test_overwritten_reference_reported_at_first_creation() {
    let mut b = ProcedureBuilder::method(name("Overwrite"));
    let a = b.local("a");
    let first = b.alloc(a, RES, "new Res(1)");
    b.alloc(a, RES, "new Res(2)");
    b.release(a);

    let verdicts = run(b.build());
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, first);
    assert_eq!(verdict.creation, "new Res(1)");
}

#[test]
fn test_null_assignment_loses_reference() {
    let mut b = ProcedureBuilder::method(name("Drop"));
    let a = b.local("a");
    let alloc = b.alloc(a, RES, "new Res()");
    b.assign(a, Operand::Null);

    let verdicts = run(b.build());
    assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, alloc);
}

// ═══════════════════════════════════════════════════════════════════════════
// Escapes
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_stored_into_this_field() {
    let mut b = ProcedureBuilder::method(name("Keep"));
    b.this();
    let a = b.local("a");
    b.alloc(a, RES, "new Res()");
    b.field_write(Receiver::This, "resource", Operand::Symbol(a));

    assert_no_verdicts(&run(b.build()));
}

#[test]
fn test_stored_into_static_field() {
    let mut b = ProcedureBuilder::method(name("Register"));
    let a = b.local("a");
    b.alloc(a, RES, "new Res()");
    b.field_write(Receiver::Static("Acme.Registry".into()), "Current", Operand::Symbol(a));

    assert_no_verdicts(&run(b.build()));
}

#[test]
fn test_stored_into_local_object_field() {
    // h = new Holder(); a = new Res(); h.Resource = a;
    let mut b = ProcedureBuilder::method(name("Attach"));
    let h = b.local("h");
    let a = b.local("a");
    b.alloc(h, "Acme.Holder", "new Holder()");
    b.alloc(a, RES, "new Res()");
    b.field_write(Receiver::Local(h), "Resource", Operand::Symbol(a));

    let procedure = b.build();
    assert_no_verdicts(&run(procedure.clone()));
    assert_no_verdicts(&run_with(&all_paths(), procedure));
}

#[test]
fn test_returned_to_caller() {
    let mut b = ProcedureBuilder::method(name("Open"));
    b.returns(RES);
    let a = b.local("a");
    b.alloc(a, RES, "new Res()");
    b.ret(Some(Operand::Symbol(a)));

    assert_no_verdicts(&run(b.build()));
}

#[test]
fn test_passed_to_unresolved_call() {
    let mut b = ProcedureBuilder::method(name("Hand"));
    let a = b.local("a");
    b.alloc(a, RES, "new Res()");
    b.call(None, CalleeRef::named("Acme.Sink.Take"), vec![Argument::symbol(a)]);

    assert_no_verdicts(&run(b.build()));
}

#[test]
fn test_escape_on_one_branch_only() {
    let mut b = ProcedureBuilder::method(name("MaybeRegister"));
    let a = b.local("a");
    let register = b.new_block();
    let skip = b.new_block();
    let alloc = b.alloc(a, RES, "new Res()");
    b.branch(Condition::Opaque, register, skip);
    b.switch_to(register);
    b.field_write(Receiver::Static("Acme.Registry".into()), "Current", Operand::Symbol(a));

    let verdicts = run(b.build());
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::MaybeNotDisposed, alloc);
    assert_eq!(verdict.classification, Classification::MaybeDisposed);
}

#[test]
fn test_opaque_operand_escapes() {
    let mut b = ProcedureBuilder::method(name("Lambda"));
    let a = b.local("a");
    let f = b.local("f");
    b.alloc(a, RES, "new Res()");
    b.push(OperationKind::Opaque {
        target: Some(f),
        operands: vec![Operand::Symbol(a)],
    });

    assert_no_verdicts(&run(b.build()));
}

// ═══════════════════════════════════════════════════════════════════════════
// Branches and loops
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_released_on_one_branch() {
    let mut b = ProcedureBuilder::method(name("Partial"));
    let a = b.local("a");
    let release = b.new_block();
    let keep = b.new_block();
    let alloc = b.alloc(a, RES, "new Res()");
    b.branch(Condition::Opaque, release, keep);
    b.switch_to(release);
    b.release(a);

    let verdicts = run(b.build());
    assert_single_verdict(&verdicts, DiagnosticKind::MaybeNotDisposed, alloc);

    // maybe-verdicts are filtered in the only-not-disposed modes
    let mut b = ProcedureBuilder::method(name("Partial"));
    let a = b.local("a");
    let release = b.new_block();
    let keep = b.new_block();
    b.alloc(a, RES, "new Res()");
    b.branch(Condition::Opaque, release, keep);
    b.switch_to(release);
    b.release(a);
    let config =
        AnalysisConfig::default().with_analysis_kind(DisposeAnalysisKind::NonExceptionPathsOnlyNotDisposed);
    assert_no_verdicts(&run_with(&config, b.build()));
}

#[test]
fn test_null_check_guards_release() {
    // a = null; if (..) a = new Res(); if (a != null) a.Dispose();
    let mut b = ProcedureBuilder::method(name("Guarded"));
    let a = b.local("a");
    let create = b.new_block();
    let check = b.new_block();
    let release = b.new_block();
    let skip = b.new_block();

    b.assign(a, Operand::Null);
    b.branch(Condition::Opaque, create, check);
    b.switch_to(create);
    b.alloc(a, RES, "new Res()");
    b.goto(check);
    b.switch_to(check);
    b.branch(Condition::IsNotNull(a), release, skip);
    b.switch_to(release);
    b.release(a);

    assert_no_verdicts(&run(b.build()));
}

#[test]
fn test_loop_allocation_without_release() {
    let mut b = ProcedureBuilder::method(name("Spin"));
    let a = b.local("a");
    let header = b.new_block();
    let body = b.new_block();
    let done = b.new_block();
    b.goto(header);
    b.switch_to(header);
    b.branch(Condition::Opaque, body, done);
    b.switch_to(body);
    let alloc = b.alloc(a, RES, "new Res()");
    b.loop_back(header);
    b.switch_to(done);
    b.ret(None);

    let verdicts = run(b.build());
    assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, alloc);
}

#[test]
fn test_loop_allocation_released_each_iteration() {
    let mut b = ProcedureBuilder::method(name("Cycle"));
    let a = b.local("a");
    let header = b.new_block();
    let body = b.new_block();
    let done = b.new_block();
    b.goto(header);
    b.switch_to(header);
    b.branch(Condition::Opaque, body, done);
    b.switch_to(body);
    b.alloc(a, RES, "new Res()");
    b.release(a);
    b.loop_back(header);
    b.switch_to(done);
    b.ret(None);

    assert_no_verdicts(&run(b.build()));
}

#[test]
fn test_loop_reassignment_folds_into_first_creation() {
    // a = new Res(); while (..) { a.Dispose(); a = new Res(); }
    let mut b = ProcedureBuilder::method(name("Rotate"));
    let a = b.local("a");
    let header = b.new_block();
    let body = b.new_block();
    let done = b.new_block();
    let first = b.alloc(a, RES, "new Res()");
    b.goto(header);
    b.switch_to(header);
    b.branch(Condition::Opaque, body, done);
    b.switch_to(body);
    b.release(a);
    b.alloc(a, RES, "new Res()");
    b.loop_back(header);
    b.switch_to(done);
    b.ret(None);

    let verdicts = run(b.build());
    assert_single_verdict(&verdicts, DiagnosticKind::MaybeNotDisposed, first);
}

// ═══════════════════════════════════════════════════════════════════════════
// Exceptions
// ═══════════════════════════════════════════════════════════════════════════

/// try { a = new Res(); F(); a.Dispose(); } catch { }
fn release_inside_try() -> Procedure {
    let mut b = ProcedureBuilder::method(name("TryRelease"));
    let a = b.local("a");
    let body = b.new_block();
    let handler = b.new_block();
    b.goto(body);
    b.switch_to(body);
    b.alloc(a, RES, "new Res()");
    b.call(None, CalleeRef::named("Acme.Util.F"), vec![]);
    b.release(a);
    let protected = b.try_region(&[body]);
    b.catch_region(protected, &[handler], true);
    b.build()
}

#[test]
fn test_catch_path_reported_only_when_tracking_exceptions() {
    assert_no_verdicts(&run(release_inside_try()));

    let verdicts = run_with(&all_paths(), release_inside_try());
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::NotDisposedOnExceptionPaths, 0);
    assert_eq!(verdict.path_kind, PathKind::ExceptionPathsOnly);
}

#[test]
fn test_finally_releases_on_every_path() {
    // a = null; try { a = new Res(); F(); } finally { a?.Dispose(); }
    let mut b = ProcedureBuilder::method(name("Finally"));
    let a = b.local("a");
    let body = b.new_block();
    let cleanup = b.new_block();
    b.assign(a, Operand::Null);
    b.goto(body);
    b.switch_to(body);
    b.alloc(a, RES, "new Res()");
    b.call(None, CalleeRef::named("Acme.Util.F"), vec![]);
    b.goto(cleanup);
    b.switch_to(cleanup);
    b.release(a);
    let protected = b.try_region(&[body]);
    b.finally_region(protected, &[cleanup]);

    assert_no_verdicts(&run_with(&all_paths(), b.build()));
}

#[test]
fn test_throw_leaves_instance_open_on_exception_path() {
    let mut b = ProcedureBuilder::method(name("Fail"));
    let a = b.local("a");
    let alloc = b.alloc(a, RES, "new Res()");
    b.throw(None);
    let procedure = b.build();

    assert_no_verdicts(&run(procedure.clone()));
    let verdicts = run_with(&all_paths(), procedure);
    assert_single_verdict(&verdicts, DiagnosticKind::NotDisposedOnExceptionPaths, alloc);
}

#[test]
fn test_thrown_instance_escapes() {
    // a = new Res(); throw a;
    let mut b = ProcedureBuilder::method(name("Rethrow"));
    let a = b.local("a");
    b.alloc(a, RES, "new Res()");
    b.throw(Some(Operand::Symbol(a)));

    assert_no_verdicts(&run_with(&all_paths(), b.build()));
}

/// a = new Res(); try { F(); } catch { a.Dispose(); }
fn release_only_in_catch() -> Procedure {
    let mut b = ProcedureBuilder::method(name("CatchRelease"));
    let a = b.local("a");
    let body = b.new_block();
    let handler = b.new_block();
    b.alloc(a, RES, "new Res()");
    b.goto(body);
    b.switch_to(body);
    b.call(None, CalleeRef::named("Acme.Util.F"), vec![]);
    b.switch_to(handler);
    b.release(a);
    let protected = b.try_region(&[body]);
    b.catch_region(protected, &[handler], true);
    b.build()
}

#[test]
fn test_release_only_in_catch_is_not_disposed() {
    let verdicts = run(release_only_in_catch());
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, 0);
    assert_eq!(verdict.classification, Classification::NotDisposed);
    assert_eq!(verdict.path_kind, PathKind::AllPaths);

    let verdicts = run_with(&all_paths(), release_only_in_catch());
    assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Containers
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_tuple_round_trip_release() {
    let mut b = ProcedureBuilder::method(name("Pair"));
    let a = b.local("a");
    let t = b.local("t");
    let x = b.local("x");
    b.alloc(a, RES, "new Res()");
    b.push(OperationKind::TupleCreate {
        target: t,
        elements: vec![Operand::Symbol(a), Operand::Null],
    });
    b.push(OperationKind::Deconstruct {
        targets: vec![Some(x), None],
        tuple: t,
    });
    b.release(x);

    assert_no_verdicts(&run(b.build()));
}

/// list = new List(); r = new Res(); list.Add(r); [x = list[0]; x.Dispose();]
fn collection(release_element: bool, return_list: bool) -> Procedure {
    let mut b = ProcedureBuilder::method(name("Collect"));
    let list = b.local("list");
    let r = b.local("r");
    let x = b.local("x");
    b.alloc(list, "System.Collections.Generic.List", "new List<Res>()");
    b.alloc(r, RES, "new Res()");
    b.push(OperationKind::ElementWrite {
        collection: list,
        value: Operand::Symbol(r),
    });
    if release_element {
        b.push(OperationKind::ElementRead { target: x, collection: list });
        b.release(x);
    }
    if return_list {
        b.ret(Some(Operand::Symbol(list)));
    }
    b.build()
}

#[test]
fn test_collection_element_released() {
    assert_no_verdicts(&run(collection(true, false)));
}

#[test]
fn test_collection_returned_with_elements() {
    assert_no_verdicts(&run(collection(false, true)));
}

#[test]
fn test_collection_element_never_released() {
    let verdicts = run(collection(false, false));
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, 1);
    assert_eq!(verdict.creation, "new Res()");
}

// ═══════════════════════════════════════════════════════════════════════════
// Ownership rules
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_owning_wrapper_takes_constructor_argument() {
    let build = |release: bool| {
        let mut b = ProcedureBuilder::method(name("Wrap"));
        let fs = b.local("fs");
        let reader = b.local("reader");
        b.alloc(fs, "System.IO.FileStream", "new FileStream(path)");
        b.alloc_with(
            reader,
            "System.IO.StreamReader",
            vec![Argument::symbol(fs)],
            None,
            "new StreamReader(fs)",
        );
        if release {
            b.release(reader);
        }
        b.build()
    };

    assert_no_verdicts(&run(build(true)));

    let verdicts = run(build(false));
    let verdict = assert_single_verdict(&verdicts, DiagnosticKind::NotDisposed, 1);
    assert_eq!(verdict.creation, "new StreamReader(fs)");
}

// ═══════════════════════════════════════════════════════════════════════════
// Determinism
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_repeated_runs_agree() {
    let procedure = collection(false, false);
    let first = run_with(&all_paths(), procedure.clone());
    let second = run_with(&all_paths(), procedure);
    assert_eq!(first, second);
}
