#![forbid(unsafe_code)]

use std::path::PathBuf;

use nf_conformance::{MatrixOutcome, run_fill_null_matrix};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut write_report: Option<PathBuf> = None;
    let mut require_green = false;
    let mut quiet = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--write-report" => {
                let value = args
                    .next()
                    .ok_or("--write-report requires a path (e.g. matrix.json)")?;
                write_report = Some(PathBuf::from(value));
            }
            "--require-green" => {
                require_green = true;
            }
            "--quiet" => {
                quiet = true;
            }
            other => return Err(format!("unknown flag: {other}").into()),
        }
    }

    let outcomes = run_fill_null_matrix();
    let disagreements: Vec<&MatrixOutcome> = outcomes.iter().filter(|o| !o.agrees).collect();

    if !quiet {
        for outcome in &outcomes {
            let verdict = if outcome.agrees { "ok" } else { "MISMATCH" };
            println!(
                "fill_null {:?} x {:?}: resolvable={} resolved={:?} produced={:?} [{verdict}]",
                outcome.left,
                outcome.right,
                outcome.expected_resolvable,
                outcome.resolved,
                outcome.produced,
            );
        }
    }
    println!(
        "{} pairs swept, {} resolvable, {} disagreements",
        outcomes.len(),
        outcomes.iter().filter(|o| o.expected_resolvable).count(),
        disagreements.len(),
    );

    if let Some(path) = write_report {
        let payload = serde_json::to_string_pretty(&outcomes)?;
        std::fs::write(&path, payload)?;
        println!("report written to {}", path.display());
    }

    if require_green && !disagreements.is_empty() {
        return Err(format!(
            "{} type pairs disagree between resolve and runtime",
            disagreements.len()
        )
        .into());
    }

    Ok(())
}
