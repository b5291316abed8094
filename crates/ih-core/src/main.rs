use std::io::{self, IsTerminal, Read};

use ih_core::assistant::AssistantSession;
use ih_core::batch::run_batch;
use ih_core::config::Config;
use ih_core::logging::init_logging;
use ih_core::repl::run_repl;

fn print_help() {
    println!("ihumure - mental health assistant in the terminal");
    println!();
    println!("Usage:");
    println!("  ihumure                     Interactive mode");
    println!("  ihumure \"question\"          Ask once and print the answer");
    println!("  echo \"question\" | ihumure   Ask once via stdin pipe");
    println!();
    println!("Options:");
    println!("  --version         Print version");
    println!("  --help            Print this help");
    println!();
    println!("Environment:");
    println!("  IHUMURE_BACKEND_URL       Backend project URL");
    println!("  IHUMURE_PUBLISHABLE_KEY   Publishable API key");
    println!("  RUST_LOG                  Diagnostic log filter (stderr)");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("ihumure {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = Config::load_or_default();
    init_logging(&config.logging);

    // One-shot: positional arg or piped stdin
    let positional: Vec<&str> = args
        .iter()
        .filter(|a| !a.starts_with('-'))
        .map(String::as_str)
        .collect();

    let question = if !positional.is_empty() {
        Some(positional.join(" "))
    } else if !io::stdin().is_terminal() {
        let mut buf = String::new();
        match io::stdin().read_to_string(&mut buf) {
            Ok(_) if !buf.trim().is_empty() => Some(buf.trim().to_string()),
            _ => None,
        }
    } else {
        None
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Some(question) = question {
        let code = runtime.block_on(run_batch(&config, &question));
        std::process::exit(code);
    }

    let client = match config.chat_client() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("hint: set IHUMURE_BACKEND_URL and IHUMURE_PUBLISHABLE_KEY");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_repl(AssistantSession::new(client))) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
