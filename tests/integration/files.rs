//! Loading source files

use std::io::Write;

use weft::backends::loader::{MemoryCatalog, MemoryLibrary, MemoryLoader};
use weft::kernel::context::FileKind;
use weft::{CompilationResult, Interpreter, InterpreterConfig};

fn source_file(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".c")
        .tempfile()
        .unwrap();
    write!(file, "{}", text).unwrap();
    file
}

#[test]
fn test_load_source_file_once() {
    let file = source_file("int from_file() { return 3; }\nint scale = 10;\n");
    let mut interp = Interpreter::new();

    assert_eq!(interp.load_file(file.path(), false), CompilationResult::Success);
    assert_eq!(interp.load_file(file.path(), false), CompilationResult::Success);
    assert_eq!(interp.loaded_files().len(), 1);
    assert_eq!(interp.loaded_files()[0].kind, FileKind::Source);
    assert_eq!(
        interp
            .evaluate("from_file() * scale")
            .value
            .and_then(|v| v.as_int()),
        Some(30)
    );
}

#[test]
fn test_broken_files_leave_no_trace() {
    let mut interp = Interpreter::new();
    let unfinished = source_file("int broken() {");
    assert_eq!(
        interp.load_file(unfinished.path(), false),
        CompilationResult::Failure
    );
    assert!(!interp.is_continuing());

    let invalid = source_file("int bad = nowhere;");
    assert_eq!(interp.load_file(invalid.path(), false), CompilationResult::Failure);
    assert!(!interp.is_declared("bad"));
    assert!(interp.loaded_files().is_empty());

    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
        interp.load_file(dir.path().join("absent.c"), false),
        CompilationResult::Failure
    );
}

#[test]
fn test_shared_objects_go_through_the_loader() {
    let catalog = MemoryCatalog::new();
    catalog.provide("libfoo.so", MemoryLibrary::new().with_function("foo", |_| 11));
    let mut interp = Interpreter::with_loader(
        InterpreterConfig::default(),
        Box::new(MemoryLoader::new(catalog)),
    );

    assert_eq!(interp.load_file("libfoo.so", true), CompilationResult::Success);
    assert_eq!(interp.loaded_files()[0].kind, FileKind::DynamicLibrary);
    interp.declare("extern int foo();");
    assert_eq!(interp.evaluate("foo()").value.and_then(|v| v.as_int()), Some(11));
}

#[test]
fn test_config_file_drives_interpreter() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "raw-input = true").unwrap();
    let config = InterpreterConfig::load(file.path()).unwrap();
    let mut interp = Interpreter::with_config(config);
    assert_eq!(interp.process("1 + 1").result, CompilationResult::Failure);
    assert!(interp.process("int fine = 1;").is_success());
}
