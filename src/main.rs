use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::io::Read;

use triage_queue::{assess, priority_score, IntakeForm, TriageError, VERSION};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("score") => {
            let source = args.get(2).map(String::as_str).unwrap_or("-");
            run_score(source)
        }
        Some("version") => {
            println!("triage-queue {}", VERSION);
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

/// Score one intake form (JSON file, or stdin with "-") without queueing it
fn run_score(source: &str) -> Result<()> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read intake form from stdin")?;
        buf
    } else {
        fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))?
    };

    let form: IntakeForm = serde_json::from_str(&raw).context("Intake form is not valid JSON")?;

    let intake = match form.validate() {
        Ok(intake) => intake,
        Err(TriageError::Validation(errors)) => {
            eprintln!("❌ Intake form rejected:");
            for error in &errors {
                eprintln!("   • {}", error);
            }
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    let assessment = assess(&intake.vitals, &intake.demographics);
    let priority = priority_score(&assessment, intake.demographics.age);

    println!("🩺 Triage assessment");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Risk level:     {}", assessment.risk_level);
    println!("Risk score:     {}", assessment.risk_score);
    println!("Priority:       {:.1}", priority);
    println!("Service time:   {} min", assessment.risk_level.service_minutes());

    if assessment.factors.is_empty() {
        println!("\n✓ No abnormal findings");
    } else {
        println!("\nContributing factors:");
        for factor in &assessment.factors {
            println!(
                "   {:<18} {:<9} +{:<3} (reading {})",
                format!("{:?}", factor.factor),
                format!("{:?}", factor.tier),
                factor.points,
                factor.value
            );
        }
    }

    Ok(())
}

fn print_usage() {
    println!("triage-queue {}", VERSION);
    println!();
    println!("USAGE:");
    println!("    triage-queue score <intake.json | ->   Score one intake form locally");
    println!("    triage-queue version");
    println!();
    println!("The queue itself is served by triage-server (build with --features server).");
}
