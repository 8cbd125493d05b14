use curv::Interpreter;

fn eval_err(source: &str) -> curv::Exception {
    Interpreter::new().run("test", source).unwrap_err()
}

#[test]
fn lexical_errors() {
    assert!(eval_err("\"abc").message.contains("unterminated string"));
    assert!(eval_err("a # b").message.contains("bad character"));
}

#[test]
fn syntactic_errors() {
    assert!(eval_err("1 +").message.contains("missing expression"));
    assert!(eval_err("(1").message.contains("unmatched delimiter"));
    assert!(eval_err("1 2 )").message.contains("syntax error in program"));
    assert!(eval_err("let x = 1").message.contains("let: malformed argument"));
    assert!(eval_err("for x 1").message.contains("for: malformed argument"));
}

#[test]
fn semantic_errors() {
    assert!(eval_err("frobnicate").message.contains("frobnicate: not defined"));
    assert!(eval_err("{a = 1; a = 2}").message.contains("a: multiply defined"));
    assert!(eval_err("(1, x) -> x").message.contains("not a parameter"));
    assert!(eval_err("let (1 + 1) 2").message.contains("not a definition"));
    assert!(eval_err("(x) = 1; 2").message.contains("invalid definiendum"));
    assert!(eval_err("1 .(2, 3)").message.contains("invalid expression after '.'"));
}

#[test]
fn runtime_errors() {
    assert!(eval_err("1(2)").message.contains("not callable"));
    assert!(
        eval_err("let (f = x -> x) f(1, 2)")
            .message
            .contains("wrong number of arguments")
    );
    assert!(eval_err("sqrt \"x\"").message.contains("sqrt: not a number"));
    assert!(eval_err("norm [1, \"x\"]").message.contains("norm: domain error"));
    assert!(eval_err("{a = a + 1}.a").message.contains("illegal recursive reference"));
    assert!(eval_err("{a = 1}.b").message.contains("b: field not found"));
    assert!(eval_err("1 && true").message.contains("not a boolean"));
    assert!(eval_err("1 < \"x\"").message.contains("<: not a number"));
    assert!(eval_err("[1, 2].[5]").message.contains("index out of range"));
}

#[test]
fn errors_carry_source_locations() {
    let err = eval_err("let (x = 3)\n  x + frobnicate");
    let text = err.to_string();
    assert!(text.contains("frobnicate: not defined"), "{}", text);
    assert!(text.contains("file test, line 2"), "{}", text);
    assert!(text.contains("frobnicate"), "{}", text);
}

#[test]
fn call_errors_include_the_call_chain() {
    let err = eval_err("let (f = x -> x.missing, g = y -> f(y)) g({a = 1, b = 2})");
    let text = err.to_string();
    assert!(text.contains("missing: field not found"), "{}", text);
    // The raising site plus both active call sites are in the chain.
    assert!(text.contains("f(y)"), "{}", text);
    assert!(text.contains("g({a = 1, b = 2})"), "{}", text);
}

#[test]
fn output_before_an_error_is_kept() {
    let mut interp = Interpreter::new();
    let err = interp.run("test", "(echo(1); frob)").unwrap_err();
    assert!(err.message.contains("frob: not defined"));
    // Analysis fails before evaluation, so nothing was printed...
    assert_eq!(interp.output(), "");
    // ...but a runtime failure after an echo keeps the echo.
    let err = interp.run("test", "(echo(1); 1(2))").unwrap_err();
    assert!(err.message.contains("not callable"));
    assert_eq!(interp.output(), "ECHO: 1\n");
}
