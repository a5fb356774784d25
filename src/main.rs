//! Entrypoint for the flintc CLI.

use std::io::{self, BufRead, Write};
use std::{env, fs, process};

use flintc::driver::pipeline;

static USAGE: &str = r#"
usage: flintc [FILE]

With FILE, compile and run it as one unit. Without arguments, read one
unit per line from stdin.
"#;

fn main() {
    let _ = simple_logger::SimpleLogger::new().env().init();

    let mut args = env::args().skip(1);
    let status = match args.next() {
        Some(arg) if arg == "-h" || arg == "--help" => {
            print_usage();
            0
        }
        Some(path) => run_file(&path),
        None => repl(),
    };
    process::exit(status);
}

fn run_file(path: &str) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("cannot read {}: {}", path, err);
            return 1;
        }
    };

    match pipeline::run_source(&source) {
        Ok(Some(result)) => {
            println!("result={}", result);
            0
        }
        Ok(None) => 0,
        Err(err) => {
            eprintln!("{}", err.render(&source));
            1
        }
    }
}

/// Minimal REPL: every line is its own compilation unit with its own
/// module context.
fn repl() -> i32 {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        if stdout.flush().is_err() {
            return 1;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return 0, // EOF
            Ok(_) => {}
            Err(err) => {
                eprintln!("read error: {}", err);
                return 1;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        match pipeline::run_source(&line) {
            Ok(Some(result)) => println!("result={}", result),
            Ok(None) => {}
            Err(err) => eprintln!("{}", err.render(&line)),
        }
    }
}

fn print_usage() {
    println!("flintc {}", env!("CARGO_PKG_VERSION"));
    println!("{}", USAGE);
}
