use crate::cli::OutputFormat;
use crate::types::RunOutcome;
use serde_json::Value;

pub fn print_run_outcome(outcome: &RunOutcome, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => {
            println!(
                "✅ Role {} on {} finished in {:.1}s",
                outcome.role,
                outcome.node,
                outcome.duration().num_milliseconds() as f64 / 1000.0
            );
            println!("Run: {}", outcome.run_id);
            println!();
            print!("{}", outcome.log);
            if !outcome.log.ends_with('\n') && !outcome.log.is_empty() {
                println!();
            }
        }
    }
    Ok(())
}

/// Print a resolved value: strings bare, everything else as JSON
pub fn print_resolved(expression: &str, value: Option<&Value>) -> anyhow::Result<()> {
    match value {
        Some(Value::String(text)) => println!("{text}"),
        Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
        None => eprintln!("{expression} resolved to nothing"),
    }
    Ok(())
}
