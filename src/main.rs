//! mudlink Binary
//!
//! Run with: cargo run -- [host] [port] [options]
//!
//! Options:
//!   --config <path>     Load settings from a JSON file
//!   --timeout-ms <ms>   Read timeout / prompt flush delay (default: 100)
//!   --line-ending <eol> Command terminator: lf, crlf or cr (default: lf)
//!   --crlf              Same as --line-ending crlf
//!   --echo              Echo submitted commands into the transcript
//!
//! Game text goes to stdout, logs go to stderr.

use std::env;
use std::process;

use log::info;
use tokio::io::BufReader;

use mudlink::{ClientConfig, Connection, ConsoleClient, LineEnding};

fn print_help() {
    println!("mudlink v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: mudlink [host] [port] [options]");
    println!();
    println!("Options:");
    println!("  --config <path>     Load settings from a JSON file");
    println!("  --timeout-ms <ms>   Read timeout / prompt flush delay (default: 100)");
    println!("  --line-ending <eol> Command terminator: lf, crlf or cr (default: lf)");
    println!("  --crlf              Same as --line-ending crlf");
    println!("  --echo              Echo submitted commands (never while the server masks input)");
    println!("  --help, -h          Show this help");
    println!();
    println!("Type /quit to disconnect.");
    println!();
    println!("Examples:");
    println!("  mudlink aardmud.org 4000");
    println!("  mudlink --config ~/.mudlink.json --crlf");
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// Apply command line arguments on top of an optional config file.
fn parse_args(args: &[String]) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    // The config file is the base layer, so find it first
    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(path) => ClientConfig::from_json_file(path)?,
            None => fail("--config requires a path"),
        },
        None => ClientConfig::default(),
    };

    let mut positional = 0;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => i += 2,
            "--timeout-ms" => {
                match args.get(i + 1).and_then(|v| v.parse::<u64>().ok()) {
                    Some(ms) => config.read_timeout_ms = ms,
                    None => fail("--timeout-ms requires a number of milliseconds"),
                }
                i += 2;
            }
            "--line-ending" => {
                match args.get(i + 1) {
                    Some(value) => config.line_ending = value.parse::<LineEnding>()?,
                    None => fail("--line-ending requires lf, crlf or cr"),
                }
                i += 2;
            }
            "--crlf" => {
                config.line_ending = LineEnding::Crlf;
                i += 1;
            }
            "--echo" => {
                config.local_echo = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            arg => {
                // Positional arguments: host, port
                match positional {
                    0 => config.host = arg.to_string(),
                    1 => match arg.parse::<u16>() {
                        Ok(port) => config.port = port,
                        Err(_) => fail(&format!("invalid port: {}", arg)),
                    },
                    _ => fail(&format!("unexpected argument: {}", arg)),
                }
                positional += 1;
                i += 1;
            }
        }
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config = parse_args(&args)?;

    let (connection, events) = Connection::connect(&config).await?;

    let mut client = ConsoleClient::new(connection, tokio::io::stdout(), config.local_echo);
    let end = client.run(events, BufReader::new(tokio::io::stdin())).await?;
    info!("Disconnected ({:?})", end);

    // stdin reads are blocking under the hood; don't wait for the next line
    process::exit(0);
}
