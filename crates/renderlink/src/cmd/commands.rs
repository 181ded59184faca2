use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use renderlink_protocol::{ReplyShape, CATALOGUE};
use serde::Serialize;

use crate::cmd::CommandsArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct CommandEntry {
    code: u16,
    name: &'static str,
    reply: &'static str,
    ends_frame: bool,
    summary: &'static str,
}

pub fn run(_args: CommandsArgs, format: OutputFormat) -> CliResult<i32> {
    let entries = catalogue_entries();
    match format {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CODE", "NAME", "REPLY", "ENDS FRAME", "SUMMARY"]);
            for entry in &entries {
                table.add_row(vec![
                    entry.code.to_string(),
                    entry.name.to_string(),
                    entry.reply.to_string(),
                    if entry.ends_frame { "yes" } else { "" }.to_string(),
                    entry.summary.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for entry in &entries {
                println!("{:>3}  {:<14} {}", entry.code, entry.name, entry.summary);
            }
        }
    }
    Ok(SUCCESS)
}

fn catalogue_entries() -> Vec<CommandEntry> {
    CATALOGUE
        .iter()
        .map(|spec| CommandEntry {
            code: spec.code.to_wire(),
            name: spec.name,
            reply: match spec.reply {
                ReplyShape::None => "none",
                ReplyShape::Double => "double",
            },
            ends_frame: spec.ends_frame,
            summary: spec.summary,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_follow_catalogue_order() {
        let entries = catalogue_entries();
        assert_eq!(entries.len(), CATALOGUE.len());
        assert!(entries.windows(2).all(|pair| pair[0].code < pair[1].code));
        let secs = entries
            .iter()
            .find(|entry| entry.name == "getSecs")
            .expect("getSecs should be listed");
        assert_eq!(secs.code, 17);
        assert_eq!(secs.reply, "double");
    }
}
