//! Packet scripts: recorded decoder output, one JSON record per line.
//!
//! ```text
//! # comments and blank lines are skipped
//! {"delay_ms": 0,   "message": {"AisPacket": {"mmsi": 244660000, "message_type": 1}}}
//! {"delay_ms": 250, "message": {"TpmsPacket": {"id": 48879, "sensor_type": "Ook8k192Schrader"}}}
//! ```

use std::path::Path;

use rxhub_core::{Message, MessageId};
use serde::{Deserialize, Serialize};

use crate::{BasebandError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRecord {
    /// Pause before sending, relative to the previous record.
    #[serde(default)]
    pub delay_ms: u64,
    pub message: Message,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketScript {
    records: Vec<ScriptRecord>,
}

impl PacketScript {
    pub fn new(records: Vec<ScriptRecord>) -> Self {
        PacketScript { records }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record = serde_json::from_str(line).map_err(|e| BasebandError::Script {
                line: i + 1,
                message: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(PacketScript { records })
    }

    pub fn records(&self) -> &[ScriptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all delays.
    pub fn duration_ms(&self) -> u64 {
        self.records.iter().map(|r| r.delay_ms).sum()
    }

    /// Number of messages per id, in tag order. Ids with no messages are
    /// omitted.
    pub fn counts(&self) -> Vec<(MessageId, usize)> {
        MessageId::ALL
            .iter()
            .map(|id| {
                let n = self.records.iter().filter(|r| r.message.id() == *id).count();
                (*id, n)
            })
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// Serialize back to JSON lines.
    pub fn to_json_lines(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            // Message payloads are plain data; serialization cannot fail.
            if let Ok(line) = serde_json::to_string(record) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
