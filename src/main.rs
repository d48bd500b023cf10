use std::env;
use std::io;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};

// Usage: echo <input_text> | tinyregex -E <pattern>
//
// Exits 0 when the pattern matches somewhere in the line (printing the
// matched span), 1 when it does not.
fn main() -> Result<ExitCode> {
    let mut args = env::args().skip(1);
    if args.next().as_deref() != Some("-E") {
        bail!("expected first argument to be '-E'");
    }
    let pattern = args.next().context("expected a pattern argument")?;
    let program = tinyregex::compile(&pattern)
        .with_context(|| format!("cannot compile pattern {pattern:?}"))?;

    let mut input_line = String::new();
    io::stdin()
        .read_line(&mut input_line)
        .context("failed to read input")?;

    // Trim the trailing newline for correct '$' anchor matching
    let line = input_line.trim_end_matches('\n');

    match program.match_from(line, 0)? {
        Some(found) => {
            println!("{}", found.region().text_in(line));
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::from(1)),
    }
}
