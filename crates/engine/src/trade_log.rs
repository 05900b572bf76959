//! Append-only CSV log of closed trades.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};

use orb_core::error::{EngineError, Result};
use orb_core::position::ClosedTrade;

const HEADERS: [&str; 12] = [
    "trade_id",
    "symbol",
    "status",
    "direction",
    "qty",
    "entry_price",
    "exit_price",
    "entry_time",
    "exit_time",
    "stop_loss",
    "take_profit",
    "pnl",
];

/// CSV trade log; the header is written once, rows are appended per close.
pub struct TradeLog {
    path: PathBuf,
}

impl TradeLog {
    /// Opens the log, writing the header only if the file is new or empty.
    ///
    /// # Errors
    /// Returns a persistence error if the file cannot be created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let needs_header = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if needs_header {
            let mut writer = Writer::from_writer(File::create(&path)?);
            writer
                .write_record(HEADERS)
                .map_err(|e| EngineError::persistence(e.to_string()))?;
            writer
                .flush()
                .map_err(|e| EngineError::persistence(e.to_string()))?;
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one closed trade.
    ///
    /// # Errors
    /// Returns a persistence error if the row cannot be written.
    pub fn append(&self, trade: &ClosedTrade) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        writer
            .write_record(&[
                trade.trade_id.to_string(),
                trade.symbol.clone(),
                trade.status.clone(),
                trade.direction.clone(),
                trade.quantity.to_string(),
                trade.entry_price.to_string(),
                trade.exit_price.to_string(),
                trade.entry_time.to_rfc3339(),
                trade.exit_time.to_rfc3339(),
                trade.stop_loss.to_string(),
                trade.take_profit.to_string(),
                trade.pnl.to_string(),
            ])
            .map_err(|e| EngineError::persistence(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| EngineError::persistence(e.to_string()))?;
        Ok(())
    }
}
