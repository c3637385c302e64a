use anyhow::Result;

use crate::inspect;

pub fn handle_commands(args: &[String]) -> Result<bool> {
    match args.get(1).map(|s| s.as_str()) {
        Some("inspect") => {
            inspect::run_from_args(args)?;
            Ok(true)
        }
        Some("inspect-help") => {
            inspect::print_help();
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub fn print_usage() {
    eprintln!("Usage: linewatch <inspect|inspect-help> [flags]");
    eprintln!("Run `linewatch inspect-help` for the full flag list.");
}
