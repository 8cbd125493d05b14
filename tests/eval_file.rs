use std::fs;

use curv::{Interpreter, Value};

/// Write a helper script into a scratch directory and return the path the
/// "calling" script would have alongside it.
fn scratch_script(dir_tag: &str, file_name: &str, contents: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("curv-test-{}-{}", std::process::id(), dir_tag));
    fs::create_dir_all(&dir).expect("create scratch dir");
    fs::write(dir.join(file_name), contents).expect("write scratch script");
    dir.join("main.curv")
}

#[test]
fn file_loads_and_evaluates_another_script() {
    let caller = scratch_script("lib", "lib.curv", "{sq(x) = x * x; two = 2}");
    let mut interp = Interpreter::new();
    let value = interp
        .run(caller.to_str().expect("utf8 path"), "file(\"lib.curv\").sq(6)")
        .expect("run");
    assert_eq!(value, Value::Num(36.0));
}

#[test]
fn file_paths_resolve_relative_to_the_caller() {
    let caller = scratch_script("rel", "inc.curv", "40 + 2");
    let mut interp = Interpreter::new();
    let value = interp
        .run(caller.to_str().expect("utf8 path"), "file(\"inc.curv\")")
        .expect("run");
    assert_eq!(value, Value::Num(42.0));
}

#[test]
fn missing_file_reports_the_call_site() {
    let caller = scratch_script("missing", "unused.curv", "0");
    let mut interp = Interpreter::new();
    let err = interp
        .run(caller.to_str().expect("utf8 path"), "file(\"nope.curv\")")
        .unwrap_err();
    assert!(err.message.contains("file: can't open"), "{}", err.message);
    assert!(err.message.contains("nope.curv"), "{}", err.message);
}

#[test]
fn included_script_errors_carry_both_scripts() {
    let caller = scratch_script("err", "bad.curv", "sqrt(-1)");
    let mut interp = Interpreter::new();
    let err = interp
        .run(caller.to_str().expect("utf8 path"), "file(\"bad.curv\")")
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("sqrt: domain error"), "{}", text);
    assert!(text.contains("bad.curv"), "{}", text);
    assert!(text.contains("file(\"bad.curv\")"), "{}", text);
}
