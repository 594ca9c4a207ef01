use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, bail};
use linescript::parse_script_parts;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut compact = false;
    let mut start_line_number = 1;
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--compact" | "-c" => {
                compact = true;
            }
            "--start-line" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing line number after {arg}"))?;
                start_line_number = value
                    .parse()
                    .with_context(|| format!("Invalid start line '{value}'"))?;
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let script = match parse_script_parts(&[source.as_str()], start_line_number) {
        Ok(script) => script,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    let rendered = if compact {
        serde_json::to_string(&script)
    } else {
        serde_json::to_string_pretty(&script)
    }
    .context("Serializing model")?;
    println!("{rendered}");
    Ok(())
}
