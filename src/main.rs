use std::env;
use std::fs;
use std::io::{self, IsTerminal, Read};

use curv::{Interpreter, Value};

fn main() {
    let args: Vec<String> = env::args().collect();

    let (name, input) = if args.len() > 1 {
        let source = fs::read_to_string(&args[1]).unwrap_or_else(|err| {
            eprintln!("Failed to read {}: {}", args[1], err);
            std::process::exit(1);
        });
        (args[1].clone(), source)
    } else if io::stdin().is_terminal() {
        curv::repl::run_repl();
        return;
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).unwrap_or_else(|err| {
            eprintln!("Failed to read stdin: {}", err);
            std::process::exit(1);
        });
        ("<stdin>".to_string(), buf)
    };

    let mut interpreter = Interpreter::new();
    match interpreter.run(&name, &input) {
        Ok(value) => {
            print!("{}", interpreter.take_output());
            if value != Value::Null {
                println!("{}", value);
            }
        }
        Err(err) => {
            print!("{}", interpreter.take_output());
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}
