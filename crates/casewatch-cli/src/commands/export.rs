//! Canonical snapshot export
//!
//! Usage: casewatch export [--output <PATH>]
//!
//! Writes the canonical main snapshot as CSV, one row per record ordered by
//! id. Without `--output` the CSV goes to stdout.

use super::Context;
use casewatch_core::model::Record;
use casewatch_store::snapshot::load_canonical;
use clap::Args;
use std::io::Write;
use std::path::PathBuf;

const HEADER: [&str; 7] = [
    "id",
    "status",
    "category",
    "title",
    "created_at",
    "modified_at",
    "link",
];

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// CSV file to write
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn execute(ctx: &Context, args: ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let conn = ctx.open_store()?;
    let canonical = load_canonical(&conn)?;
    if canonical.version_id.is_none() {
        eprintln!("Warning: no canonical snapshot yet; exporting an empty file");
    }

    let count = match &args.output {
        Some(path) => {
            let count = write_csv(std::fs::File::create(path)?, canonical.main.records())?;
            println!("exported {} record(s) to {}", count, path.display());
            count
        }
        None => write_csv(std::io::stdout().lock(), canonical.main.records())?,
    };
    tracing::debug!(records = count, "Exported canonical snapshot");
    Ok(())
}

fn write_csv<'a, W: Write>(
    out: W,
    records: impl Iterator<Item = &'a Record>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADER)?;

    let mut count = 0;
    for record in records {
        writer.write_record([
            record.id.as_str(),
            record.status.as_str(),
            record.category.as_str(),
            record.title.as_str(),
            record.created_at.as_str(),
            record.modified_at.as_str(),
            record.link.as_str(),
        ])?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let mut record = Record::new("A", "en-cours", "en cours");
        record.title = "Titre, avec virgule".into();

        let mut out = Vec::new();
        assert_eq!(write_csv(&mut out, [&record].into_iter()).unwrap(), 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,status,category,title,created_at,modified_at,link")
        );
        assert_eq!(
            lines.next(),
            Some("A,en cours,en-cours,\"Titre, avec virgule\",,,")
        );
    }
}
