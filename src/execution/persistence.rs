use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::data::types::Resolution;
use crate::execution::types::{Bet, EquitySample, Position, ResolvedBet};
use crate::strategies::types::{Direction, Signal};

/// Append-only SQLite ledger behind the execution simulator: bankroll, bets,
/// open positions, resolutions, equity samples and the signal log. The open
/// database is also what crash recovery reads at startup.
pub struct TradeStore {
    conn: Connection,
}

impl TradeStore {
    /// Open (or create) the ledger. `:memory:` is used by backtests and
    /// tests. Failure here is fatal; the loop must not start without it.
    pub fn open(path: &str, initial_bankroll: f64) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
            }
            Connection::open(path).with_context(|| format!("Failed to open ledger at {}", path))?
        };

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS bankroll (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                amount REAL NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                market_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                stake REAL NOT NULL,
                execution_price REAL NOT NULL,
                estimated_prob REAL NOT NULL,
                edge_at_entry REAL NOT NULL,
                kelly_fraction REAL NOT NULL,
                mode TEXT NOT NULL,
                shares REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                outcome TEXT,
                pnl REAL,
                resolved_at TEXT
            );

            CREATE TABLE IF NOT EXISTS positions (
                market_id TEXT PRIMARY KEY,
                direction TEXT NOT NULL,
                shares REAL NOT NULL,
                avg_price REAL NOT NULL,
                cost REAL NOT NULL,
                opened_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS resolutions (
                market_id TEXT PRIMARY KEY,
                outcome TEXT NOT NULL,
                resolved_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS equity_samples (
                date TEXT PRIMARY KEY,
                bankroll REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS signal_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                market_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                quoted_price REAL NOT NULL,
                estimated_prob REAL NOT NULL,
                edge REAL NOT NULL,
                confidence INTEGER NOT NULL,
                reasoning TEXT NOT NULL,
                rejected TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_bets_status ON bets(status);
            CREATE INDEX IF NOT EXISTS idx_bets_market_id ON bets(market_id);
            CREATE INDEX IF NOT EXISTS idx_bets_resolved_at ON bets(resolved_at);
            "#,
        )?;

        let store = Self { conn };
        store.ensure_bankroll(initial_bankroll)?;
        Ok(store)
    }

    fn ensure_bankroll(&self, initial_bankroll: f64) -> Result<()> {
        let existing: Option<f64> = self
            .conn
            .query_row("SELECT amount FROM bankroll WHERE id = 1", [], |row| row.get(0))
            .optional()?;

        if existing.is_none() {
            self.conn.execute(
                "INSERT INTO bankroll (id, amount, updated_at) VALUES (1, ?1, ?2)",
                params![initial_bankroll, Utc::now().to_rfc3339()],
            )?;
        }
        Ok(())
    }

    pub fn bankroll(&self) -> Result<f64> {
        let amount = self
            .conn
            .query_row("SELECT amount FROM bankroll WHERE id = 1", [], |row| row.get(0))?;
        Ok(amount)
    }

    /// Debit bankroll, append the bet, create-or-merge the position — one
    /// transaction, so a crash mid-way leaves no partial commit. The caller
    /// has already checked bankroll and direction.
    pub fn execute_bet(&mut self, bet: &Bet) -> Result<Position> {
        let shares = bet.stake_amount / bet.execution_price;
        let ts = bet.timestamp.to_rfc3339();

        let tx = self.conn.transaction()?;

        tx.execute(
            "UPDATE bankroll SET amount = amount - ?1, updated_at = ?2 WHERE id = 1",
            params![bet.stake_amount, ts],
        )?;

        tx.execute(
            "INSERT INTO bets (ts, market_id, direction, stake, execution_price, estimated_prob,
                               edge_at_entry, kelly_fraction, mode, shares)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                ts,
                bet.market_id,
                bet.direction.as_str(),
                bet.stake_amount,
                bet.execution_price,
                bet.estimated_prob,
                bet.edge_at_entry,
                bet.kelly_fraction_applied,
                bet.mode.as_str(),
                shares,
            ],
        )?;

        let existing: Option<(f64, f64, String)> = tx
            .query_row(
                "SELECT shares, avg_price, opened_at FROM positions WHERE market_id = ?1",
                params![bet.market_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let position = match existing {
            None => {
                tx.execute(
                    "INSERT INTO positions (market_id, direction, shares, avg_price, cost, opened_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        bet.market_id,
                        bet.direction.as_str(),
                        shares,
                        bet.execution_price,
                        bet.stake_amount,
                        ts,
                    ],
                )?;
                Position {
                    market_id: bet.market_id.clone(),
                    direction: bet.direction,
                    shares,
                    avg_price: bet.execution_price,
                    cost: bet.stake_amount,
                    opened_at: bet.timestamp,
                }
            }
            Some((old_shares, old_avg, opened_at)) => {
                let new_shares = old_shares + shares;
                let new_avg =
                    (old_shares * old_avg + shares * bet.execution_price) / new_shares;
                let new_cost = new_shares * new_avg;
                tx.execute(
                    "UPDATE positions SET shares = ?1, avg_price = ?2, cost = ?3 WHERE market_id = ?4",
                    params![new_shares, new_avg, new_cost, bet.market_id],
                )?;
                Position {
                    market_id: bet.market_id.clone(),
                    direction: bet.direction,
                    shares: new_shares,
                    avg_price: new_avg,
                    cost: new_cost,
                    opened_at: parse_datetime(&opened_at)?,
                }
            }
        };

        tx.commit()?;
        Ok(position)
    }

    /// Settle an open position against a resolution: credit the payout, mark
    /// the market's open bets resolved with per-bet P&L, record the
    /// resolution, drop the position row. Returns realized P&L.
    pub fn settle_market(&mut self, resolution: &Resolution) -> Result<f64> {
        let position = self
            .get_position(&resolution.market_id)?
            .ok_or_else(|| anyhow!("no open position in market {}", resolution.market_id))?;

        let won = position.direction == resolution.outcome;
        let payout = if won { position.shares } else { 0.0 };
        let pnl = payout - position.cost;
        let resolved_at = resolution.resolved_at.to_rfc3339();

        let tx = self.conn.transaction()?;

        tx.execute(
            "UPDATE bankroll SET amount = amount + ?1, updated_at = ?2 WHERE id = 1",
            params![payout, resolved_at],
        )?;

        {
            let mut stmt = tx.prepare(
                "SELECT id, stake, shares FROM bets WHERE market_id = ?1 AND status = 'open'",
            )?;
            let open_bets: Vec<(i64, f64, f64)> = stmt
                .query_map(params![resolution.market_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<std::result::Result<_, _>>()?;

            for (bet_id, stake, bet_shares) in open_bets {
                let bet_pnl = if won { bet_shares - stake } else { -stake };
                let bet_outcome = if won { "win" } else { "lose" };
                tx.execute(
                    "UPDATE bets SET status = 'resolved', outcome = ?1, pnl = ?2, resolved_at = ?3
                     WHERE id = ?4",
                    params![bet_outcome, bet_pnl, resolved_at, bet_id],
                )?;
            }
        }

        tx.execute(
            "INSERT INTO resolutions (market_id, outcome, resolved_at) VALUES (?1, ?2, ?3)",
            params![
                resolution.market_id,
                resolution.outcome.as_str(),
                resolved_at,
            ],
        )?;

        tx.execute(
            "DELETE FROM positions WHERE market_id = ?1",
            params![resolution.market_id],
        )?;

        tx.commit()?;
        Ok(pnl)
    }

    pub fn get_position(&self, market_id: &str) -> Result<Option<Position>> {
        let row: Option<(String, f64, f64, f64, String)> = self
            .conn
            .query_row(
                "SELECT direction, shares, avg_price, cost, opened_at
                 FROM positions WHERE market_id = ?1",
                params![market_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(direction, shares, avg_price, cost, opened_at)| {
            Ok(Position {
                market_id: market_id.to_string(),
                direction: parse_direction(&direction)?,
                shares,
                avg_price,
                cost,
                opened_at: parse_datetime(&opened_at)?,
            })
        })
        .transpose()
    }

    pub fn open_positions(&self) -> Result<Vec<Position>> {
        let mut stmt = self.conn.prepare(
            "SELECT market_id, direction, shares, avg_price, cost, opened_at
             FROM positions ORDER BY market_id",
        )?;
        let rows: Vec<(String, String, f64, f64, f64, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(market_id, direction, shares, avg_price, cost, opened_at)| {
                Ok(Position {
                    market_id,
                    direction: parse_direction(&direction)?,
                    shares,
                    avg_price,
                    cost,
                    opened_at: parse_datetime(&opened_at)?,
                })
            })
            .collect()
    }

    pub fn open_position_count(&self) -> Result<usize> {
        let count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM positions", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn is_resolved(&self, market_id: &str) -> Result<bool> {
        let row: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM resolutions WHERE market_id = ?1",
                params![market_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    /// Realized P&L of bets resolved on the given day.
    pub fn daily_pnl(&self, day: NaiveDate) -> Result<f64> {
        let pnl: Option<f64> = self.conn.query_row(
            "SELECT SUM(pnl) FROM bets
             WHERE status = 'resolved' AND substr(resolved_at, 1, 10) = ?1",
            params![day.to_string()],
            |row| row.get(0),
        )?;
        Ok(pnl.unwrap_or(0.0))
    }

    /// Keyed by date; re-sampling the same day overwrites, so the series
    /// stays one-per-day no matter how often a tick samples.
    pub fn record_equity_sample(&self, sample: &EquitySample) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO equity_samples (date, bankroll) VALUES (?1, ?2)",
            params![sample.date.to_string(), sample.bankroll],
        )?;
        Ok(())
    }

    pub fn equity_series(&self) -> Result<Vec<EquitySample>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, bankroll FROM equity_samples ORDER BY date ASC")?;
        let rows: Vec<(String, f64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(date, bankroll)| {
                Ok(EquitySample {
                    date: date
                        .parse::<NaiveDate>()
                        .with_context(|| format!("bad equity sample date {}", date))?,
                    bankroll,
                })
            })
            .collect()
    }

    /// Bankroll as of the last equity sample strictly before `day`; the
    /// start-of-day reference for the daily loss limit.
    pub fn equity_before(&self, day: NaiveDate) -> Result<Option<f64>> {
        let amount: Option<f64> = self
            .conn
            .query_row(
                "SELECT bankroll FROM equity_samples WHERE date < ?1 ORDER BY date DESC LIMIT 1",
                params![day.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(amount)
    }

    pub fn resolved_bets(&self) -> Result<Vec<ResolvedBet>> {
        let mut stmt = self.conn.prepare(
            "SELECT market_id, direction, stake, pnl, edge_at_entry, outcome, resolved_at
             FROM bets WHERE status = 'resolved' ORDER BY resolved_at ASC, id ASC",
        )?;
        let rows: Vec<(String, String, f64, f64, f64, String, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(
                |(market_id, direction, stake, pnl, edge_at_entry, outcome, resolved_at)| {
                    Ok(ResolvedBet {
                        market_id,
                        direction: parse_direction(&direction)?,
                        stake_amount: stake,
                        pnl,
                        edge_at_entry,
                        won: outcome == "win",
                        resolved_at: parse_datetime(&resolved_at)?,
                    })
                },
            )
            .collect()
    }

    /// Append-only signal log; rejected signals carry their reason.
    pub fn log_signal(&self, signal: &Signal, rejected: Option<&str>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO signal_log (ts, market_id, direction, quoted_price, estimated_prob,
                                     edge, confidence, reasoning, rejected)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                signal.timestamp.to_rfc3339(),
                signal.market_id,
                signal.direction.as_str(),
                signal.quoted_price,
                signal.estimated_prob,
                signal.edge,
                signal.confidence,
                signal.reasoning,
                rejected,
            ],
        )?;
        Ok(())
    }
}

fn parse_direction(s: &str) -> Result<Direction> {
    Direction::parse(s).ok_or_else(|| anyhow!("bad direction in ledger: {}", s))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp in ledger: {}", s))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::types::TradingMode;
    use chrono::TimeZone;

    fn bet(market_id: &str, stake: f64, price: f64) -> Bet {
        Bet {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            market_id: market_id.to_string(),
            direction: Direction::Yes,
            stake_amount: stake,
            execution_price: price,
            estimated_prob: 0.6,
            edge_at_entry: 0.1,
            kelly_fraction_applied: 0.5,
            mode: TradingMode::Paper,
        }
    }

    #[test]
    fn test_bankroll_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap();

        {
            let mut store = TradeStore::open(path, 100.0).unwrap();
            store.execute_bet(&bet("m1", 10.0, 0.5)).unwrap();
        }

        // Reopen: the initial bankroll must not reset the debited one.
        let store = TradeStore::open(path, 100.0).unwrap();
        assert!((store.bankroll().unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(store.open_position_count().unwrap(), 1);
    }

    #[test]
    fn test_execute_bet_merges_position() {
        let mut store = TradeStore::open(":memory:", 100.0).unwrap();

        store.execute_bet(&bet("m1", 10.0, 0.5)).unwrap(); // 20 shares
        let merged = store.execute_bet(&bet("m1", 6.0, 0.6)).unwrap(); // 10 shares

        assert!((merged.shares - 30.0).abs() < 1e-9);
        // (20*0.5 + 10*0.6) / 30
        assert!((merged.avg_price - 16.0 / 30.0).abs() < 1e-9);
        assert!((merged.cost - 16.0).abs() < 1e-9);
        assert!((store.bankroll().unwrap() - 84.0).abs() < 1e-9);
    }

    #[test]
    fn test_settle_credits_winner_and_records_results() {
        let mut store = TradeStore::open(":memory:", 100.0).unwrap();
        store.execute_bet(&bet("m1", 10.0, 0.5)).unwrap();

        let resolution = Resolution {
            market_id: "m1".to_string(),
            outcome: Direction::Yes,
            resolved_at: Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
        };
        let pnl = store.settle_market(&resolution).unwrap();

        assert!((pnl - 10.0).abs() < 1e-9);
        assert!((store.bankroll().unwrap() - 110.0).abs() < 1e-9);
        assert!(store.get_position("m1").unwrap().is_none());
        assert!(store.is_resolved("m1").unwrap());

        let resolved = store.resolved_bets().unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].won);
        assert!((resolved[0].pnl - 10.0).abs() < 1e-9);

        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!((store.daily_pnl(day).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_settle_forfeits_loser() {
        let mut store = TradeStore::open(":memory:", 100.0).unwrap();
        store.execute_bet(&bet("m1", 10.0, 0.5)).unwrap();

        let resolution = Resolution {
            market_id: "m1".to_string(),
            outcome: Direction::No,
            resolved_at: Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
        };
        let pnl = store.settle_market(&resolution).unwrap();

        assert!((pnl + 10.0).abs() < 1e-9);
        assert!((store.bankroll().unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_equity_samples_upsert_by_date() {
        let store = TradeStore::open(":memory:", 100.0).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        store
            .record_equity_sample(&EquitySample { date: day, bankroll: 100.0 })
            .unwrap();
        store
            .record_equity_sample(&EquitySample { date: day, bankroll: 95.0 })
            .unwrap();

        let series = store.equity_series().unwrap();
        assert_eq!(series.len(), 1);
        assert!((series[0].bankroll - 95.0).abs() < 1e-9);

        let next = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(store.equity_before(next).unwrap(), Some(95.0));
        assert_eq!(store.equity_before(day).unwrap(), None);
    }
}
