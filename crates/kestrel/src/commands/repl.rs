//! `kestrel repl` — reads lines, tracks brace depth to find the end of a
//! multi-line statement, and prints the completion value unless it is
//! `undefined` (spec.md §6).

use anyhow::Result;
use kestrel_interpreter::Context;
use std::io::{self, BufRead, Write};

use super::run::format_uncaught;

pub fn run() -> Result<()> {
    println!("Kestrel {} - type .exit to quit", env!("CARGO_PKG_VERSION"));

    let ctx = Context::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buffer = String::new();
    let mut depth: i32 = 0;
    let mut source_count: u32 = 0;

    loop {
        let prompt = if depth > 0 { "... " } else { "> " };
        print!("{prompt}");
        stdout.flush()?;

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("error reading input: {e}");
                break;
            }
        }

        let trimmed = line.trim_end();
        if depth == 0 {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == ".exit" || trimmed == ".quit" {
                break;
            }
        }

        depth += brace_delta(trimmed);
        buffer.push_str(&line);

        if depth > 0 {
            continue;
        }
        depth = 0;

        let source = std::mem::take(&mut buffer);
        source_count += 1;
        let filename = format!("<repl:{source_count}>");
        match ctx.evaluate(&source, &filename) {
            Ok(value) if value.is_undefined() => {}
            Ok(value) => println!("{value}"),
            Err(err) => eprintln!("{}", format_uncaught(&err)),
        }

        // Safe to collect here: the completion value above has already
        // been printed (or was undefined) and nothing else holds a
        // `GcRef` outside the rooted global object/environment.
        if source_count % 32 == 0 {
            ctx.collect_garbage();
        }
    }

    println!("\nbye");
    Ok(())
}

/// Net change in open-bracket depth contributed by a line, ignoring
/// brackets inside string/template literals or line comments so a stray
/// `"{"` in a string doesn't wedge the REPL in multi-line mode.
fn brace_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut chars = line.chars().peekable();
    let mut in_string: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => in_string = Some(c),
            '/' if chars.peek() == Some(&'/') => break,
            '{' | '(' | '[' => delta += 1,
            '}' | ')' | ']' => delta -= 1,
            _ => {}
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_balanced_braces() {
        assert_eq!(brace_delta("function f() {"), 1);
        assert_eq!(brace_delta("}"), -1);
        assert_eq!(brace_delta("let x = 1;"), 0);
    }

    #[test]
    fn ignores_braces_inside_strings() {
        assert_eq!(brace_delta(r#"let s = "{ not a brace";"#), 0);
    }

    #[test]
    fn ignores_line_comments() {
        assert_eq!(brace_delta("let x = 1; // { comment"), 0);
    }
}
