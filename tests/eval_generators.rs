use curv::{Interpreter, Value};

fn eval(source: &str) -> Value {
    Interpreter::new().run("test", source).expect("run")
}

#[test]
fn ranges_generate_inclusive_sequences() {
    assert_eq!(eval("[1..5]"), eval("[1, 2, 3, 4, 5]"));
    assert_eq!(eval("[1..<5]"), eval("[1, 2, 3, 4]"));
    assert_eq!(eval("[1..9 by 2]"), eval("[1, 3, 5, 7, 9]"));
    assert_eq!(eval("[5..1 by -2]"), eval("[5, 3, 1]"));
    assert_eq!(eval("[5..1]"), eval("[]"));
}

#[test]
fn range_outside_a_list_materializes() {
    assert_eq!(eval("1..3"), eval("[1, 2, 3]"));
}

#[test]
fn for_splices_into_lists() {
    assert_eq!(eval("[for (i = [1, 2, 3]) i * 2]"), eval("[2, 4, 6]"));
    assert_eq!(eval("[for (i = 1..3) for (j = 1..i) j]"), eval("[1, 1, 2, 1, 2, 3]"));
}

#[test]
fn spread_splices_a_list() {
    assert_eq!(eval("[0, ...[1, 2], 3]"), eval("[0, 1, 2, 3]"));
}

#[test]
fn conditional_generators_filter() {
    assert_eq!(eval("[for (i = 1..6) if (i < 4) i]"), eval("[1, 2, 3]"));
}

#[test]
fn comma_sequences_splice() {
    assert_eq!(eval("[(1, 2), 3]"), eval("[1, 2, 3]"));
}

#[test]
fn semicolon_sequencing_keeps_the_last_value() {
    let mut interp = Interpreter::new();
    let value = interp.run("test", "(echo(1); echo(2); 42)").expect("run");
    assert_eq!(value, Value::Num(42.0));
    assert_eq!(interp.output(), "ECHO: 1\nECHO: 2\n");
}

#[test]
fn argument_evaluation_is_left_to_right() {
    let mut interp = Interpreter::new();
    let value = interp
        .run("test", "let (f = (a, b) -> a + b) f((echo(1); 1), (echo(2); 2))")
        .expect("run");
    assert_eq!(value, Value::Num(3.0));
    assert_eq!(interp.output(), "ECHO: 1\nECHO: 2\n");
}

#[test]
fn and_or_short_circuit() {
    let mut interp = Interpreter::new();
    assert_eq!(
        interp.run("test", "false && (echo(9); true)").expect("run"),
        Value::Bool(false)
    );
    assert_eq!(
        interp.run("test", "true || (echo(9); true)").expect("run"),
        Value::Bool(true)
    );
    assert_eq!(interp.output(), "");

    assert_eq!(
        interp.run("test", "true && (echo(1); true)").expect("run"),
        Value::Bool(true)
    );
    assert_eq!(interp.output(), "ECHO: 1\n");
}

#[test]
fn if_selects_a_single_branch() {
    let mut interp = Interpreter::new();
    let value = interp
        .run("test", "if (1 < 2) (echo(\"then\"); 1) else (echo(\"else\"); 2)")
        .expect("run");
    assert_eq!(value, Value::Num(1.0));
    assert_eq!(interp.output(), "ECHO: \"then\"\n");
}

#[test]
fn left_and_right_call_operators() {
    assert_eq!(eval("sqrt << 16"), Value::Num(4.0));
    assert_eq!(eval("16 >> sqrt"), Value::Num(4.0));
    assert_eq!(eval("[3, 4] >> norm"), Value::Num(5.0));
}

#[test]
fn pure_evaluation_is_deterministic() {
    let source = "let (f = x -> x * x) [for (i = 1..4) f(i)]";
    assert_eq!(eval(source), eval(source));
}
