//! Verify command implementation.

use ciphera_canonical::Digest;
use ciphera_ledger::{verify_chain, ChainReport, LedgerFileReader, ReadMode};
use serde_json::json;

use crate::error::CliError;

pub fn run(ledger: String, strict: bool, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if strict {
        ReadMode::Strict
    } else {
        ReadMode::Permissive
    };
    let mut reader = LedgerFileReader::open(&ledger, mode)
        .map_err(|e| format!("Failed to open ledger: {}", e))?;
    let entries = reader.read_all()?;
    let truncated_bytes = reader.file_len().saturating_sub(reader.position());

    let report = verify_chain(&entries, &Digest::genesis(), 0);

    if json_output {
        let out = json!({
            "ledger": ledger,
            "entries": entries.len(),
            "truncated_bytes": truncated_bytes,
            "report": report,
            "tail_hash": entries.last().map(|e| e.entry_hash.b64.clone()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{:<12} {}", "LEDGER", ledger);
        println!("{:<12} {}", "ENTRIES", entries.len());
        if truncated_bytes > 0 {
            println!("{:<12} {} bytes ignored", "TRUNCATED", truncated_bytes);
        }
        match &report {
            ChainReport::Intact { checked } => {
                println!("{:<12} intact ({} checked)", "CHAIN", checked)
            }
            ChainReport::Broken { index, reason } => {
                println!("{:<12} broken at {}: {}", "CHAIN", index, reason)
            }
        }
    }

    if strict {
        if let ChainReport::Broken { index, reason } = report {
            return Err(CliError::ChainBroken { index, reason }.into());
        }
    }

    Ok(())
}
