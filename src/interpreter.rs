use crate::error::Exception;
use crate::eval::Evaluator;
use crate::location::Location;
use crate::script::Script;
use crate::system::BufferSystem;
use crate::token::{Token, TokenKind};
use crate::value::Value;

/// One-stop façade over the whole pipeline: scan, parse, analyze, and
/// evaluate a source text, capturing everything `echo` printed.
#[derive(Default)]
pub struct Interpreter {
    output: String,
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter {
            output: String::new(),
        }
    }

    /// Run a program and return its value.  Console output produced during
    /// the run is appended to `output()`, even when the run fails.
    pub fn run(&mut self, name: &str, source: &str) -> Result<Value, Exception> {
        let script = Script::new(name, source);
        let mut system = BufferSystem::new();
        let mut ev = Evaluator::new(&mut system);
        let mut result = ev.eval_script(script.clone());

        // Force module fields up front so the caller sees plain values
        // when printing; a field whose forcing fails turns into the run's
        // error.
        let module = match &result {
            Ok(Value::Module(m)) => Some(m.clone()),
            _ => None,
        };
        if let Some(module) = module {
            let whole = Location::new(
                script.clone(),
                Token {
                    kind: TokenKind::Phrase,
                    first_white: 0,
                    first: 0,
                    last: script.source.len() as u32,
                },
            );
            for &(_, slot) in &module.dictionary {
                if let Err(e) = ev.force_module_slot(&module.slots, slot, &whole) {
                    result = Err(e);
                    break;
                }
            }
        }

        self.output
            .push_str(&String::from_utf8_lossy(&system.out));
        result
    }

    /// Everything `echo` has printed across runs of this interpreter.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}
