//! Thin process shim: read the one request document from stdin, hand it to
//! the library, write the one response document to stdout, set the exit
//! code. All logging happens inside `depsolve_json::run` (§4.7, §5).

use std::io::{self, Read, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut raw = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut raw) {
        eprintln!("IOError: {}", e);
        let body = serde_json::json!({ "kind": "IOError", "reason": e.to_string() });
        println!("{}", serde_json::to_string(&body).unwrap_or_default());
        return ExitCode::FAILURE;
    }

    let (body, code) = depsolve_json::run(&raw);
    println!("{}", serde_json::to_string(&body).unwrap_or_default());
    io::stdout().flush().ok();

    if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
