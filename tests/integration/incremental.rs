//! Incremental compilation through the interpreter façade

use proptest::prelude::*;
use weft::util::diagnostic::DiagnosticCode;
use weft::kernel::TransactionId;
use weft::{CompilationResult, Interpreter, Outcome};

fn int(outcome: &Outcome) -> Option<i64> {
    outcome.value.and_then(|v| v.as_int())
}

const KEYWORDS: &[&str] = &["int", "void", "auto", "extern", "if", "else", "while", "return"];

#[test]
fn test_declare_then_evaluate() {
    let mut interp = Interpreter::new();
    assert_eq!(interp.declare("int x = 5;").result, CompilationResult::Success);
    assert_eq!(int(&interp.evaluate("x + 1")), Some(6));
}

#[test]
fn test_continued_declaration() {
    let mut interp = Interpreter::new();
    let first = interp.declare("int f() {");
    assert_eq!(first.result, CompilationResult::MoreInputExpected);
    assert!(interp.last_transaction().is_none());

    let second = interp.declare("return 1; }");
    assert_eq!(second.result, CompilationResult::Success);
    assert_eq!(first.transaction, second.transaction);
    assert_eq!(int(&interp.evaluate("f()")), Some(1));
}

#[test]
fn test_failed_declaration_never_existed() {
    let mut interp = Interpreter::new();
    let failed = interp.declare("int y = undefinedSymbol();");
    assert_eq!(failed.result, CompilationResult::Failure);
    assert!(!interp.is_declared("y"));

    let lookup = interp.evaluate("y");
    assert_eq!(lookup.result, CompilationResult::Failure);
    assert_eq!(lookup.diagnostics[0].code, DiagnosticCode::UndeclaredIdentifier);
    assert!(interp.last_transaction().is_none());
}

#[test]
fn test_each_success_appends_one_transaction() {
    let mut interp = Interpreter::new();
    interp.declare("int a = 1;");
    interp.evaluate("a");
    interp.execute("a = 2;");
    interp.parse("int header(int v);");
    let committed = (0..10)
        .filter(|i| interp.transaction(TransactionId(*i)).is_some())
        .count();
    assert_eq!(committed, 4);
}

#[test]
fn test_wrapped_input_is_buffered_until_balanced() {
    let mut interp = Interpreter::new();
    interp.declare("int n = 3;");
    assert!(interp.evaluate("(n *").needs_more_input());
    assert!(interp.is_continuing());
    assert_eq!(int(&interp.evaluate(" 4)")), Some(12));

    assert!(interp.process("while (n) {").needs_more_input());
    assert!(interp.process(" n = n - 1; }").is_success());
    assert_eq!(int(&interp.evaluate("n")), Some(0));
}

#[test]
fn test_line_comment_ends_with_its_chunk() {
    let mut interp = Interpreter::new();
    assert!(interp.declare("int f() { // first line").needs_more_input());
    assert_eq!(interp.declare("return 1; }").result, CompilationResult::Success);
    assert_eq!(int(&interp.evaluate("f()")), Some(1));

    assert!(interp.evaluate("(1 + // one").needs_more_input());
    assert_eq!(int(&interp.evaluate("2)")), Some(3));
    assert!(!interp.is_continuing());
}

#[test]
fn test_deep_nesting_is_rejected() {
    let mut interp = Interpreter::new();
    let deep = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
    let outcome = interp.evaluate(&deep);
    assert_eq!(outcome.result, CompilationResult::Failure);
    assert_eq!(outcome.diagnostics[0].code, DiagnosticCode::NestingTooDeep);
    assert!(interp.last_transaction().is_none());

    let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
    assert_eq!(int(&interp.evaluate(&shallow)), Some(1));
}

#[test]
fn test_cancelled_continuation_leaves_nothing() {
    let mut interp = Interpreter::new();
    interp.declare("int g() {");
    interp.cancel_continuation();
    assert!(!interp.is_continuing());
    assert!(!interp.is_declared("g"));
    assert!(interp.last_transaction().is_none());
}

#[test]
fn test_process_dispatches_on_shape() {
    let mut interp = Interpreter::new();
    let declared = interp.process("int k = 7;");
    assert!(declared.is_success());
    assert_eq!(declared.execution, None);

    let evaluated = interp.process("k * 6");
    assert_eq!(int(&evaluated), Some(42));
}

#[test]
fn test_fatal_warnings_from_config() {
    let config = weft::InterpreterConfig {
        fatal_warnings: true,
        ..weft::InterpreterConfig::default()
    };
    let mut interp = Interpreter::with_config(config);
    let out = interp.declare("int sign(int v) { if (v) { return 1; } }");
    assert_eq!(out.result, CompilationResult::Failure);
    assert!(!interp.is_declared("sign"));
    assert!(interp.declare("int one() { 1 == 1; return 1; }").is_success());
}

proptest! {
    #[test]
    fn prop_rollback_is_total(name in "[a-z][a-z0-9_]{0,7}") {
        prop_assume!(!KEYWORDS.contains(&name.as_str()));
        let mut interp = Interpreter::new();
        let source = format!("int {} = 1; int {}_f() {{ return missing_{}(); }}", name, name, name);
        prop_assert_eq!(interp.declare(&source).result, CompilationResult::Failure);
        prop_assert!(!interp.is_declared(&name));
        let function = format!("{}_f", name);
        prop_assert!(!interp.is_declared(&function));
        prop_assert!(interp.last_transaction().is_none());
    }

    #[test]
    fn prop_chunked_input_matches_whole(split in 1usize..40) {
        let whole = "int add(int a, int b) { return a + b; } int seven = 7;";
        let (head, tail) = whole.split_at(split);

        let mut chunked = Interpreter::new();
        let first = chunked.declare(head);
        prop_assume!(first.result == CompilationResult::MoreInputExpected);
        let second = chunked.declare(tail);

        let mut at_once = Interpreter::new();
        let single = at_once.declare(whole);

        prop_assert_eq!(second.result, single.result);
        prop_assert_eq!(second.diagnostics, single.diagnostics);
        prop_assert_eq!(
            chunked.last_transaction().map(|t| t.decls().len()),
            at_once.last_transaction().map(|t| t.decls().len())
        );
        prop_assert_eq!(
            int(&chunked.evaluate("add(seven, 1)")),
            int(&at_once.evaluate("add(seven, 1)"))
        );
    }
}

#[test]
fn test_unique_names_are_distinct() {
    let mut interp = Interpreter::new();
    let names: std::collections::HashSet<String> =
        (0..100).map(|_| interp.create_unique_name()).collect();
    assert_eq!(names.len(), 100);
    assert!(names.iter().all(|name| interp.is_unique_name(name)));
}
