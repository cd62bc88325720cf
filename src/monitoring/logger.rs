use anyhow::Result;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;

use crate::execution::types::Bet;
use crate::strategies::types::Signal;

/// Flat CSV trail of signals and bets, one row per event. Secondary to the
/// SQLite ledger; meant for eyeballing a day in a spreadsheet.
pub struct CsvLogger {
    log_path: String,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        if !std::path::Path::new(&log_path).exists() {
            if let Some(parent) = std::path::Path::new(&log_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let mut file = OpenOptions::new().create(true).write(true).open(&log_path)?;

            writeln!(
                file,
                "timestamp,event,market_id,direction,price,estimated_prob,edge,confidence,stake,note"
            )?;
        }

        Ok(Self { log_path })
    }

    pub fn log_signal(&self, signal: &Signal, rejected: Option<&str>) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(
            file,
            "{},signal,{},{},{:.4},{:.4},{:.4},{},,{}",
            signal.timestamp.to_rfc3339(),
            signal.market_id,
            signal.direction,
            signal.quoted_price,
            signal.estimated_prob,
            signal.edge,
            signal.confidence,
            rejected.unwrap_or("accepted"),
        )?;

        Ok(())
    }

    pub fn log_bet(&self, bet: &Bet) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(
            file,
            "{},bet,{},{},{:.4},{:.4},{:.4},,{:.2},{}",
            bet.timestamp.to_rfc3339(),
            bet.market_id,
            bet.direction,
            bet.execution_price,
            bet.estimated_prob,
            bet.edge_at_entry,
            bet.stake_amount,
            bet.mode,
        )?;

        Ok(())
    }

    pub fn log_event(&self, event: &str) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(file, "{},event,,,,,,,,{}", Utc::now().to_rfc3339(), event)?;

        Ok(())
    }
}
