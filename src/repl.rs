use std::path::PathBuf;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::interpreter::Interpreter;
use crate::value::Value;

/// Check if the input has unbalanced brackets, suggesting more input is
/// needed before evaluating.
fn is_incomplete(input: &str) -> bool {
    let mut depth_brace = 0i32;
    let mut depth_paren = 0i32;
    let mut depth_bracket = 0i32;
    let mut in_string = false;
    let mut in_comment = false;
    let mut prev = '\0';

    for ch in input.chars() {
        if in_string {
            if ch == '"' {
                in_string = false;
            }
            prev = ch;
            continue;
        }
        if in_comment {
            if ch == '\n' {
                in_comment = false;
            }
            prev = ch;
            continue;
        }
        match ch {
            '"' => in_string = true,
            '/' if prev == '/' => in_comment = true,
            '{' => depth_brace += 1,
            '}' => depth_brace -= 1,
            '(' => depth_paren += 1,
            ')' => depth_paren -= 1,
            '[' => depth_bracket += 1,
            ']' => depth_bracket -= 1,
            _ => {}
        }
        prev = ch;
    }

    depth_brace > 0 || depth_paren > 0 || depth_bracket > 0 || in_string
}

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".curv_history"))
}

pub fn run_repl() {
    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("Failed to initialize line editor: {}", err);
            std::process::exit(1);
        }
    };

    let history = history_path();
    if let Some(ref path) = history {
        let _ = rl.load_history(path);
    }

    let mut interpreter = Interpreter::new();
    let mut accumulated = String::new();

    loop {
        let prompt = if accumulated.is_empty() { "curv> " } else { "....> " };

        match rl.readline(prompt) {
            Ok(line) => {
                if accumulated.is_empty() {
                    accumulated = line;
                } else {
                    accumulated.push('\n');
                    accumulated.push_str(&line);
                }

                if is_incomplete(&accumulated) {
                    continue;
                }

                let input = std::mem::take(&mut accumulated);
                if input.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&input);

                match interpreter.run("<repl>", &input) {
                    Ok(value) => {
                        print!("{}", interpreter.take_output());
                        if value != Value::Null {
                            println!("{}", value);
                        }
                    }
                    Err(err) => {
                        print!("{}", interpreter.take_output());
                        eprintln!("{}", err);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                accumulated.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Readline error: {}", err);
                break;
            }
        }
    }

    if let Some(ref path) = history {
        let _ = rl.save_history(path);
    }
}

#[cfg(test)]
mod tests {
    use super::is_incomplete;

    #[test]
    fn balanced_input_is_complete() {
        assert!(!is_incomplete("let (x = 1) x"));
    }

    #[test]
    fn open_brackets_ask_for_more() {
        assert!(is_incomplete("{a = 1;"));
        assert!(is_incomplete("[1, 2,"));
        assert!(is_incomplete("(1 +"));
    }

    #[test]
    fn brackets_inside_strings_do_not_count() {
        assert!(!is_incomplete("\"a ( b [ c {\""));
    }

    #[test]
    fn brackets_inside_comments_do_not_count() {
        assert!(!is_incomplete("1 // ( [ {\n"));
    }
}
