use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Two-column key/value table.
pub fn print_fields(fields: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FIELD", "VALUE"]);
    for (name, value) in fields {
        table.add_row(vec![name.to_string(), value.clone()]);
    }
    println!("{table}");
}

/// `key=value` pairs on one line.
pub fn print_pretty(fields: &[(&str, String)]) {
    let line = fields
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{line}");
}

pub fn print_record<T: Serialize>(value: &T, fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => print_fields(fields),
        OutputFormat::Pretty => print_pretty(fields),
    }
}

pub fn seconds_field(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |secs| format!("{secs:.6}"))
}
