mod debug_report;

use promptweave::{rewrite_verbose_with, rewrite_with, Pipeline};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

const DEFAULT_RULES_DIR: &str = "./rules";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut pipeline = Pipeline::new(&config.rules_dir);

    if config.cache_key {
        match pipeline.cache_key(&config.positive, &config.negative) {
            Ok(key) => println!("{key}"),
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        return;
    }

    if config.trace {
        match rewrite_verbose_with(&config.positive, &config.negative, &mut pipeline) {
            Ok(result) => debug_report::print_run(&result, config.color),
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
    } else {
        match rewrite_with(&config.positive, &config.negative, &mut pipeline) {
            Ok(result) => {
                println!("{}", result.positive);
                if !result.negative.is_empty() {
                    println!("---");
                    println!("{}", result.negative);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
    }
}

struct CliConfig {
    positive: String,
    negative: String,
    rules_dir: PathBuf,
    trace: bool,
    cache_key: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut positive: Option<String> = None;
    let mut negative = String::new();
    let mut rules_dir = PathBuf::from(DEFAULT_RULES_DIR);
    let mut trace = false;
    let mut cache_key = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("promptweave {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--trace" => trace = true,
            "--cache-key" => cache_key = true,
            "--rules" => {
                let value = args.next().ok_or_else(|| "error: --rules expects a value".to_string())?;
                rules_dir = PathBuf::from(value);
            }
            "--positive" | "-p" => {
                let value = args.next().ok_or_else(|| "error: --positive expects a value".to_string())?;
                if positive.is_some() {
                    return Err("error: positive prompt provided multiple times".to_string());
                }
                positive = Some(value);
            }
            "--negative" | "-n" => {
                let value = args.next().ok_or_else(|| "error: --negative expects a value".to_string())?;
                negative = value;
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    if positive.is_some() {
                        return Err("error: positive prompt provided multiple times".to_string());
                    }
                    positive = Some(rest);
                }
                break;
            }
            _ if arg.starts_with("--rules=") => {
                rules_dir = PathBuf::from(arg.trim_start_matches("--rules="));
            }
            _ if arg.starts_with("--positive=") => {
                if positive.is_some() {
                    return Err("error: positive prompt provided multiple times".to_string());
                }
                positive = Some(arg.trim_start_matches("--positive=").to_string());
            }
            _ if arg.starts_with("--negative=") => {
                negative = arg.trim_start_matches("--negative=").to_string();
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                if positive.is_some() {
                    return Err("error: positive prompt provided multiple times".to_string());
                }
                positive = Some(rest);
                break;
            }
        }
    }

    let positive = match positive {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    if positive.trim().is_empty() && negative.trim().is_empty() {
        return Err(format!("error: no prompt provided\n\n{}", help_text()));
    }

    Ok(CliConfig { positive, negative, rules_dir, trace, cache_key, color })
}

fn read_stdin_input() -> Result<String, String> {
    if io::stdin().is_terminal() {
        return Ok(String::new());
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "promptweave {version}

Rule-driven rewriting for positive/negative prompt pairs.

Usage:
  promptweave [OPTIONS] [--] <positive prompt...>
  promptweave [OPTIONS] -p <positive> -n <negative>

Options:
  -p, --positive <text>      Positive prompt. If omitted, reads remaining args
                             or stdin when no args are provided.
  -n, --negative <text>      Negative prompt. Default: empty.
  --rules <dir>              Rule file directory. Default: {default_rules}
  --trace                    Print a full rule execution trace.
  --cache-key                Print the rewrite cache key and exit.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Exit codes:
  0  Success.
  1  Rule loading or validation error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        default_rules = DEFAULT_RULES_DIR
    )
}
