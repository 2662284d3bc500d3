//! Library loading through in-memory and on-disk loaders

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weft::backends::loader::{MemoryCatalog, MemoryLibrary, MemoryLoader};
use parking_lot::Mutex;
use weft::kernel::context::FileKind;
use weft::kernel::Transaction;
use weft::{
    CompilationResult, ExecutionResult, Interpreter, InterpreterCallbacks, InterpreterConfig,
    LoadLibResult, UnloadResult, Unloadable,
};

fn with_catalog(catalog: &MemoryCatalog) -> Interpreter {
    Interpreter::with_loader(
        InterpreterConfig::default(),
        Box::new(MemoryLoader::new(catalog.clone())),
    )
}

#[test]
fn test_unresolved_until_library_loads() {
    let catalog = MemoryCatalog::new();
    let mut interp = with_catalog(&catalog);

    let declared = interp.declare("extern int g(); int r = g();");
    assert_eq!(declared.result, CompilationResult::Success);
    let id = declared.transaction.unwrap();

    let early = interp.emit_all_decls(id);
    assert_eq!(early.result, ExecutionResult::UnresolvedSymbols);
    assert_eq!(early.unresolved, vec!["g".to_string()]);

    catalog.provide("libg", MemoryLibrary::new().with_function("g", |_| 7));
    assert_eq!(interp.load_library("libg", false), LoadLibResult::Success);
    assert_eq!(interp.emit_all_decls(id).result, ExecutionResult::Success);
    assert_eq!(interp.evaluate("r").value.and_then(|v| v.as_int()), Some(7));
}

#[test]
fn test_library_load_is_recorded_once() {
    let catalog = MemoryCatalog::new();
    catalog.provide("libm", MemoryLibrary::new().with_function("sq", |a| a[0] * a[0]));
    let mut interp = with_catalog(&catalog);

    assert_eq!(interp.load_library("libm", true), LoadLibResult::Success);
    assert_eq!(interp.load_library("libm", true), LoadLibResult::AlreadyLoaded);
    assert_eq!(interp.load_library("libnone", false), LoadLibResult::Error);
    assert_eq!(interp.loaded_files().len(), 1);
    assert_eq!(interp.loaded_files()[0].kind, FileKind::DynamicLibrary);

    interp.declare("extern int sq(int v);");
    assert_eq!(interp.evaluate("sq(9)").value.and_then(|v| v.as_int()), Some(81));
    assert_eq!(
        interp.unload(Unloadable::Library("libm")),
        UnloadResult::Permanent
    );
}

#[test]
fn test_unloading_a_library_reverses_it() {
    let closed = Arc::new(AtomicUsize::new(0));
    let hook = Arc::clone(&closed);
    let catalog = MemoryCatalog::new();
    catalog.provide(
        "libtmp",
        MemoryLibrary::new()
            .with_function("tmp", |_| 5)
            .with_destructor(move || {
                hook.fetch_add(1, Ordering::SeqCst);
            }),
    );
    let mut interp = with_catalog(&catalog);
    interp.declare("extern int tmp();");
    interp.load_library("libtmp", false);
    assert_eq!(interp.evaluate("tmp()").value.and_then(|v| v.as_int()), Some(5));

    assert_eq!(
        interp.unload(Unloadable::Library("libtmp")),
        UnloadResult::Unloaded
    );
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    let after = interp.evaluate("tmp()");
    assert_eq!(after.execution, Some(ExecutionResult::UnresolvedSymbols));
    assert_eq!(
        interp.unload(Unloadable::Library("libtmp")),
        UnloadResult::NotFound
    );
}

#[test]
fn test_library_destructors_run_at_shutdown() {
    let closed = Arc::new(AtomicUsize::new(0));
    let hook = Arc::clone(&closed);
    let catalog = MemoryCatalog::new();
    catalog.provide(
        "libexit",
        MemoryLibrary::new().with_destructor(move || {
            hook.fetch_add(1, Ordering::SeqCst);
        }),
    );
    {
        let mut interp = with_catalog(&catalog);
        interp.load_library("libexit", true);
    }
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_missing_shared_object_is_an_error() {
    let mut interp = Interpreter::new();
    assert_eq!(
        interp.load_library("/nonexistent/libweft_missing.so", false),
        LoadLibResult::Error
    );
    assert!(interp.loaded_files().is_empty());
}

/// Records every event as a short string
struct EventLog(Arc<Mutex<Vec<String>>>);

impl InterpreterCallbacks for EventLog {
    fn transaction_committed(
        &mut self,
        transaction: &Transaction,
    ) {
        self.0.lock().push(format!("commit {}", transaction.id()));
    }

    fn transaction_unloaded(
        &mut self,
        transaction: &Transaction,
    ) {
        self.0.lock().push(format!("unload {}", transaction.id()));
    }

    fn library_loaded(
        &mut self,
        name: &str,
    ) {
        self.0.lock().push(format!("open {}", name));
    }

    fn library_unloaded(
        &mut self,
        name: &str,
    ) {
        self.0.lock().push(format!("close {}", name));
    }
}

#[test]
fn test_callbacks_observe_state_changes_in_order() {
    let catalog = MemoryCatalog::new();
    catalog.provide("libcb", MemoryLibrary::new().with_function("cb", |_| 3));
    let mut interp = with_catalog(&catalog);
    let events = Arc::new(Mutex::new(Vec::new()));
    interp.set_callbacks(Some(Box::new(EventLog(Arc::clone(&events)))));

    interp.declare("extern int cb();");
    assert_eq!(
        interp.declare("int broken = nope;").result,
        CompilationResult::Failure
    );
    interp.load_library("libcb", false);
    interp.load_library("libcb", false);
    assert_eq!(interp.evaluate("cb()").value.and_then(|v| v.as_int()), Some(3));
    assert_eq!(interp.unload_last(), UnloadResult::Unloaded);
    assert_eq!(interp.unload(Unloadable::Library("libcb")), UnloadResult::Unloaded);

    assert_eq!(
        *events.lock(),
        vec![
            "commit #0",
            "open libcb",
            "commit #2",
            "unload #2",
            "close libcb",
        ]
    );

    interp.set_callbacks(None);
    interp.declare("int quiet = 1;");
    assert_eq!(events.lock().len(), 5);
}
