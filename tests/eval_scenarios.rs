use curv::{Interpreter, Value};

#[test]
fn arithmetic_precedence() {
    let mut interp = Interpreter::new();
    let value = interp.run("test", "1 + 2 * 3").expect("run");
    assert_eq!(value, Value::Num(7.0));
}

#[test]
fn let_bindings_with_norm() {
    let mut interp = Interpreter::new();
    let value = interp.run("test", "let (x = 3, y = 4) norm[x,y]").expect("run");
    assert_eq!(value, Value::Num(5.0));
}

#[test]
fn let_bound_function() {
    let mut interp = Interpreter::new();
    let value = interp.run("test", "let (f = x -> x*x) f(5)").expect("run");
    assert_eq!(value, Value::Num(25.0));
}

#[test]
fn module_field_references_sibling() {
    let mut interp = Interpreter::new();
    let value = interp.run("test", "{a = 1; b = a + 1}.b").expect("run");
    assert_eq!(value, Value::Num(2.0));
}

#[test]
fn recursive_module_function() {
    let mut interp = Interpreter::new();
    let value = interp
        .run("test", "{fact(n) = if (n <= 1) 1 else n * fact(n-1)}.fact(5)")
        .expect("run");
    assert_eq!(value, Value::Num(120.0));
}

#[test]
fn echo_prints_and_returns_null() {
    let mut interp = Interpreter::new();
    let value = interp.run("test", "echo(\"hi\", 1+1)").expect("run");
    assert_eq!(value, Value::Null);
    assert_eq!(interp.output(), "ECHO: \"hi\",2\n");
}

#[test]
fn let_forward_reference_is_illegal() {
    let mut interp = Interpreter::new();
    let err = interp.run("test", "let (x = y, y = 1) x").unwrap_err();
    assert!(
        err.message.contains("illegal recursive reference"),
        "{}",
        err.message
    );
}

#[test]
fn sqrt_of_negative_is_a_domain_error() {
    // Scalar and broadcast paths agree: a NaN result raises.
    let mut interp = Interpreter::new();
    let err = interp.run("test", "sqrt(-1)").unwrap_err();
    assert!(err.message.contains("sqrt: domain error"), "{}", err.message);

    let err = interp.run("test", "sqrt[4, -1]").unwrap_err();
    assert!(err.message.contains("sqrt: domain error"), "{}", err.message);
}
