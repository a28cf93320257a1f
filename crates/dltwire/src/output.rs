use std::io::{IsTerminal, Write};

use bytes::BytesMut;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dltwire_daemon::CollectorStats;
use dltwire_frame::{encode_message, Message};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput {
    index: u64,
    time: Option<String>,
    ecu: Option<String>,
    apid: Option<String>,
    ctid: Option<String>,
    message_type: Option<&'static str>,
    level: Option<&'static str>,
    timestamp: Option<u32>,
    counter: u8,
    verbose: bool,
    payload: String,
}

impl MessageOutput {
    fn new(index: u64, message: &Message) -> Self {
        Self {
            index,
            time: message
                .storage
                .map(|storage| format!("{}.{:06}", storage.seconds, storage.microseconds)),
            ecu: message.ecu().map(|id| id.to_string()),
            apid: message.apid().map(|id| id.to_string()),
            ctid: message.ctid().map(|id| id.to_string()),
            message_type: message.message_type().map(|kind| kind.as_str()),
            level: message.log_level().map(|level| level.as_str()),
            timestamp: message.extra.timestamp,
            counter: message.counter,
            verbose: message.is_verbose(),
            payload: message.payload_text(),
        }
    }
}

/// Prints decoded messages. Table output is collected and printed on
/// [`finish`](Self::finish).
pub struct MessagePrinter {
    format: OutputFormat,
    printed: u64,
    table: Option<Table>,
}

impl MessagePrinter {
    pub fn new(format: OutputFormat) -> Self {
        let table = match format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec![
                        "#", "TIME", "ECU", "APID", "CTID", "TYPE", "LEVEL", "PAYLOAD",
                    ]);
                Some(table)
            }
            _ => None,
        };
        Self {
            format,
            printed: 0,
            table,
        }
    }

    pub fn printed(&self) -> u64 {
        self.printed
    }

    pub fn print(&mut self, message: &Message) {
        let out = MessageOutput::new(self.printed, message);
        self.printed += 1;
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(vec![
                        out.index.to_string(),
                        out.time.unwrap_or_default(),
                        out.ecu.unwrap_or_default(),
                        out.apid.unwrap_or_default(),
                        out.ctid.unwrap_or_default(),
                        out.message_type.unwrap_or_default().to_string(),
                        out.level.unwrap_or_default().to_string(),
                        out.payload,
                    ]);
                }
            }
            OutputFormat::Pretty => {
                println!(
                    "{} {} {} {} {} {} {} {}",
                    out.index,
                    out.time.as_deref().unwrap_or("-"),
                    out.ecu.as_deref().unwrap_or("-"),
                    out.apid.as_deref().unwrap_or("-"),
                    out.ctid.as_deref().unwrap_or("-"),
                    out.message_type.unwrap_or("-"),
                    out.level.unwrap_or("-"),
                    out.payload
                );
            }
            OutputFormat::Raw => {
                let mut frame = BytesMut::new();
                match encode_message(message, &mut frame) {
                    Ok(()) => print_raw(&frame),
                    Err(err) => tracing::warn!(error = %err, "message not re-encodable"),
                }
            }
        }
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            println!("{table}");
        }
    }
}

#[derive(Serialize)]
struct StatsOutput {
    received: u64,
    stored: u64,
    forwarded: u64,
    buffered: u64,
    dropped: u64,
    shm_records: u64,
    corrupt: u64,
}

pub fn print_stats(stats: &CollectorStats, format: OutputFormat) {
    let out = StatsOutput {
        received: stats.received,
        stored: stats.stored,
        forwarded: stats.forwarded,
        buffered: stats.buffered,
        dropped: stats.dropped,
        shm_records: stats.shm_records,
        corrupt: stats.corrupt,
    };
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COUNTER", "VALUE"]);
            for (name, value) in [
                ("received", out.received),
                ("stored", out.stored),
                ("forwarded", out.forwarded),
                ("buffered", out.buffered),
                ("dropped", out.dropped),
                ("shm_records", out.shm_records),
                ("corrupt", out.corrupt),
            ] {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "received={} stored={} forwarded={} buffered={} dropped={} shm_records={} corrupt={}",
                out.received,
                out.stored,
                out.forwarded,
                out.buffered,
                out.dropped,
                out.shm_records,
                out.corrupt
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
