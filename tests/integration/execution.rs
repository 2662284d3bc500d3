//! Execution, static initialization and unloading

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use weft::backends::ExecFault;
use weft::kernel::engine::SymbolLocation;
use weft::kernel::TransactionId;
use weft::{
    CompilationResult, ExecutionResult, Interpreter, InterpreterConfig, NativeFunction, Outcome,
    UnloadPolicy, UnloadResult, Unloadable, Value,
};

fn int(outcome: &Outcome) -> Option<i64> {
    outcome.value.and_then(|v| v.as_int())
}

/// Interpreter with a native `trace(v)` that records its argument
fn traced() -> (Interpreter, Arc<Mutex<Vec<i64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut interp = Interpreter::new();
    interp.add_symbol(
        "trace",
        NativeFunction::host(move |args| {
            sink.lock().push(args[0]);
            0
        }),
    );
    assert!(interp.declare("extern int trace(int v);").is_success());
    (interp, seen)
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_static_initializers_run_once() {
    let mut interp = Interpreter::new();
    interp.declare(
        "int counter = 0;
         int bump() { counter = counter + 1; return counter; }
         int seed = bump();",
    );
    for _ in 0..3 {
        assert_eq!(int(&interp.evaluate("counter")), Some(1));
        assert_eq!(int(&interp.evaluate("seed")), Some(1));
    }
}

#[test]
fn test_initializers_follow_commit_order() {
    let (mut interp, seen) = traced();
    interp.declare("int first = trace(1);");
    interp.declare("int second = trace(2); int third = trace(3);");
    interp.execute("trace(4);");
    assert_eq!(*seen.lock(), vec![1, 2, 3, 4]);
}

#[test]
fn test_unload_runs_at_exit_actions_in_reverse() {
    let (mut interp, seen) = traced();
    let declared = interp.declare(
        "void bye(int v) { trace(v); }
         int install() { atexit(bye, 1); atexit(bye, 2); atexit(bye, 3); return 0; }
         int installed = install();",
    );
    let id = declared.transaction.unwrap();
    assert!(interp.emit_all_decls(id).is_success());
    assert!(seen.lock().is_empty());

    assert_eq!(interp.unload(Unloadable::Transaction(id)), UnloadResult::Unloaded);
    assert_eq!(*seen.lock(), vec![3, 2, 1]);
    assert!(interp.transaction(id).is_none());
    for name in ["bye", "install", "installed"] {
        assert!(!interp.is_declared(name));
        assert_eq!(interp.address_of_global(name), None);
    }
    assert_eq!(interp.unload(Unloadable::Transaction(id)), UnloadResult::NotFound);
}

#[test]
fn test_at_exit_belongs_to_the_running_transaction() {
    let (mut interp, seen) = traced();
    interp.declare("void note(int v) { trace(v * 10); }");
    let run = interp.execute("atexit(note, 4); atexit(note, 5);");
    assert!(run.is_success());

    assert_eq!(interp.unload_last(), UnloadResult::Unloaded);
    assert_eq!(*seen.lock(), vec![50, 40]);
    assert_eq!(interp.run_static_destructors_once(), 0);
}

#[test]
fn test_at_exit_keeps_the_registered_function() {
    let (mut interp, seen) = traced();
    let original = interp
        .declare("void bye(int v) { trace(v); }")
        .transaction
        .unwrap();
    let registering = interp.execute("atexit(bye, 1);");
    assert!(registering.is_success());
    let registering = registering.transaction.unwrap();

    assert_eq!(
        interp.unload(Unloadable::Transaction(original)),
        UnloadResult::Unloaded
    );
    assert!(interp.declare("void bye(int v) { trace(v + 1000); }").is_success());
    assert!(interp.emit_all_decls(interp.last_transaction().unwrap().id()).is_success());

    assert_eq!(
        interp.unload(Unloadable::Transaction(registering)),
        UnloadResult::Unloaded
    );
    assert!(seen.lock().is_empty());
}

#[test]
fn test_unloaded_transaction_is_unknown() {
    let mut interp = Interpreter::new();
    let id = interp.declare("int k = 1;").transaction.unwrap();
    assert_eq!(interp.unload_last(), UnloadResult::Unloaded);
    assert_eq!(
        interp.emit_all_decls(id).result,
        ExecutionResult::UnknownFunction
    );
    assert_eq!(
        interp.emit_all_decls(TransactionId(7)).result,
        ExecutionResult::UnknownFunction
    );
}

#[test]
fn test_blocked_initializer_only_holds_back_its_users() {
    let mut interp = Interpreter::new();
    interp.declare("extern int g(); int r = g();");
    assert_eq!(int(&interp.evaluate("1 + 1")), Some(2));

    let user = interp.evaluate("r");
    assert_eq!(user.execution, Some(ExecutionResult::UnresolvedSymbols));
    assert_eq!(user.unresolved, vec!["g".to_string()]);

    interp.add_symbol("g", NativeFunction::host(|_| 5));
    assert_eq!(int(&interp.evaluate("r")), Some(5));
}

#[test]
fn test_static_destructors_run_on_drop() {
    let seen = {
        let (mut interp, seen) = traced();
        interp.declare("void done(int v) { trace(v); }");
        interp.execute("atexit(done, 8); atexit(done, 9);");
        seen
    };
    assert_eq!(*seen.lock(), vec![9, 8]);
}

#[test]
fn test_run_function() {
    let mut interp = Interpreter::new();
    interp.declare("int seven() { return 7; } int twice(int v) { return v * 2; }");
    interp.parse("int prototype(); int header_only() { return 1; }");

    let run = interp.run_function("seven");
    assert_eq!(run.result, ExecutionResult::Success);
    assert_eq!(run.value, Some(Value::Int(7)));
    assert_eq!(
        interp.run_function("missing").result,
        ExecutionResult::UnknownFunction
    );
    assert_eq!(
        interp.run_function("twice").result,
        ExecutionResult::UnknownFunction
    );
    assert_eq!(
        interp.run_function("prototype").result,
        ExecutionResult::FunctionNotCompiled
    );
    assert_eq!(
        interp.run_function("header_only").result,
        ExecutionResult::FunctionNotCompiled
    );
}

#[test]
fn test_echo_prints_value() {
    let buffer = SharedBuffer::default();
    let mut interp = Interpreter::new().with_output(buffer.clone());
    let outcome = interp.echo("6 * 7");
    assert_eq!(int(&outcome), Some(42));
    interp.echo("(1 +");
    interp.echo(" 1)");
    let printed = String::from_utf8(buffer.0.lock().clone()).unwrap();
    assert_eq!(printed, "(int) 42\n(int) 2\n");
}

#[test]
fn test_runtime_faults_are_reported() {
    let mut interp = Interpreter::new();
    let divided = interp.evaluate("1 / 0");
    assert_eq!(divided.result, CompilationResult::Success);
    assert_eq!(divided.execution, Some(ExecutionResult::Faulted));
    assert_eq!(divided.fault, Some(ExecFault::DivisionByZero));
    assert_eq!(int(&interp.evaluate("2 + 2")), Some(4));
}

#[test]
fn test_call_depth_is_bounded() {
    let config = InterpreterConfig {
        max_call_depth: 32,
        ..InterpreterConfig::default()
    };
    let mut interp = Interpreter::with_config(config);
    interp.declare("int down(int n) { return down(n + 1); }");
    let deep = interp.evaluate("down(0)");
    assert_eq!(deep.execution, Some(ExecutionResult::Faulted));
    assert!(matches!(deep.fault, Some(ExecFault::StackOverflow { .. })));
}

#[test]
fn test_reject_live_dependents() {
    let config = InterpreterConfig {
        unload_policy: UnloadPolicy::RejectLiveDependents,
        ..InterpreterConfig::default()
    };
    let mut interp = Interpreter::with_config(config);
    let base = interp.declare("int base() { return 1; }").transaction.unwrap();
    let user = interp
        .declare("int user() { return base() + 1; }")
        .transaction
        .unwrap();

    assert_eq!(
        interp.unload(Unloadable::Transaction(base)),
        UnloadResult::HasDependents(vec![user])
    );
    assert_eq!(int(&interp.evaluate("user()")), Some(2));
    // The wrapper that called `user` is itself a dependent.
    assert_eq!(interp.unload_last(), UnloadResult::Unloaded);
    assert_eq!(interp.unload(Unloadable::Transaction(user)), UnloadResult::Unloaded);
    assert_eq!(interp.unload(Unloadable::Transaction(base)), UnloadResult::Unloaded);
}

#[test]
fn test_dangling_dependents_report_unresolved() {
    let mut interp = Interpreter::new();
    let base = interp.declare("int base() { return 1; }").transaction.unwrap();
    interp.declare("int user() { return base() + 1; }");

    assert_eq!(interp.unload(Unloadable::Transaction(base)), UnloadResult::Unloaded);
    let run = interp.evaluate("user()");
    assert_eq!(run.result, CompilationResult::Success);
    assert_eq!(run.execution, Some(ExecutionResult::UnresolvedSymbols));
    assert_eq!(run.unresolved, vec!["base".to_string()]);
}

#[test]
fn test_autoload_declares_missing_definitions() {
    let mut interp = Interpreter::new();
    interp.set_definition_provider(Box::new(|name| {
        (name == "helper").then(|| "int helper() { return 40; }".to_string())
    }));
    interp.declare("extern int helper(); int use_helper() { return helper() + 2; }");

    assert_eq!(int(&interp.evaluate("use_helper()")), Some(42));
    let autoloaded = interp.last_transaction().unwrap();
    assert!(autoloaded.origin().is_some());
}

#[test]
fn test_lazy_function_creator() {
    let mut interp = Interpreter::new();
    interp.install_lazy_function_creator(Box::new(|name| {
        (name == "answer").then(|| NativeFunction::host(|_| 42))
    }));
    interp.declare("extern int answer();");
    assert_eq!(int(&interp.evaluate("answer()")), Some(42));
    assert_eq!(
        interp.address_of_global("answer"),
        Some(SymbolLocation::Native)
    );
}

#[test]
fn test_address_of_global() {
    let mut interp = Interpreter::new();
    interp.declare("int g1 = 3;");
    assert!(matches!(
        interp.address_of_global("g1"),
        Some(SymbolLocation::Jit(_))
    ));
    assert_eq!(interp.address_of_global("nothing"), None);
}
