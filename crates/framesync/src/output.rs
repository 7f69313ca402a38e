use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framesync_frame::{FieldValue, Frame};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    source: &'a str,
    signature: String,
    header: Map<String, Value>,
    frame_size: usize,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_frame(frame: &Frame, source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                source,
                signature: hex(frame.signature()),
                header: header_json(frame),
                frame_size: frame.len(),
                payload_size: frame.payload().len(),
                payload: payload_preview(frame.payload()),
                timestamp: now_unix_seconds(),
            };
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
                .set_header(vec!["SOURCE", "SIZE", "HEADER", "PAYLOAD"])
                .add_row(vec![
                    source.to_string(),
                    frame.payload().len().to_string(),
                    header_text(frame),
                    payload_preview(frame.payload()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "source={} size={} header=[{}] payload={}",
                source,
                frame.payload().len(),
                header_text(frame),
                payload_preview(frame.payload())
            );
        }
        OutputFormat::Raw => {
            print_raw(frame.payload());
        }
    }
}

/// Print any serializable report (send results, session summaries).
pub fn print_report<T: Serialize>(report: &T, rows: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (name, value) in rows {
                table.add_row(vec![name.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = rows.iter().map(|(k, v)| format!("{k}={v}")).collect();
            println!("{}", line.join(" "));
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn field_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Flag(flag) => Value::Bool(*flag),
        FieldValue::Unsigned(n) => Value::from(*n),
        FieldValue::Raw(bytes) => Value::String(hex(bytes)),
    }
}

fn header_json(frame: &Frame) -> Map<String, Value> {
    frame
        .header()
        .values()
        .map(|(name, value)| (name.to_string(), field_json(&value)))
        .collect()
}

fn header_text(frame: &Frame) -> String {
    frame
        .header()
        .values()
        .map(|(name, value)| match value {
            FieldValue::Flag(flag) => format!("{name}={flag}"),
            FieldValue::Unsigned(n) => format!("{name}={n}"),
            FieldValue::Raw(bytes) => format!("{name}=0x{}", hex(&bytes)),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn field_values_render_as_json() {
        assert_eq!(field_json(&FieldValue::Flag(true)), Value::Bool(true));
        assert_eq!(field_json(&FieldValue::Unsigned(513)), Value::from(513u64));
        assert_eq!(
            field_json(&FieldValue::Raw(Bytes::from_static(&[0xCA, 0xFE]))),
            Value::String("cafe".to_string())
        );
    }

    #[test]
    fn binary_payloads_are_summarized() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xFF, 0xFE]), "<binary 2 bytes>");
    }
}
