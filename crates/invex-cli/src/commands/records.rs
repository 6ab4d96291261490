//! Records command - read back stored invoice records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;

use invex_core::normalize::year_month;
use invex_core::InvoiceRecord;
use invex_core::storage::{InvoiceStore, SqliteStore, TenantScope};

use super::load_config;

/// Arguments for the records command.
#[derive(Args)]
pub struct RecordsArgs {
    /// Database file (overrides storage.database_path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: RecordsCommand,
}

#[derive(Subcommand)]
enum RecordsCommand {
    /// List stored records
    List(ScopeArgs),

    /// Export records to CSV, grouped by year and month
    Export {
        /// Output CSV file
        output: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,
    },
}

#[derive(Args)]
struct ScopeArgs {
    /// Only records of this tenant (default: the configured tenant)
    #[arg(long, conflicts_with = "all")]
    tenant: Option<String>,

    /// Records of every tenant
    #[arg(long)]
    all: bool,

    /// Print records as JSON
    #[arg(long)]
    json: bool,
}

impl ScopeArgs {
    fn scope(&self, default_tenant: &str) -> TenantScope {
        if self.all {
            TenantScope::All
        } else {
            TenantScope::Tenant(self.tenant.clone().unwrap_or_else(|| default_tenant.to_string()))
        }
    }
}

pub async fn run(args: RecordsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let database = args.database.unwrap_or_else(|| config.storage.database_path.clone());
    if !database.exists() {
        anyhow::bail!("Database not found: {}", database.display());
    }
    let store = SqliteStore::open(&database)?;
    let tenant = &config.pipeline.tenant_id;

    match args.command {
        RecordsCommand::List(scope) => {
            let records = store.read(&scope.scope(tenant)).await?;
            if scope.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_table(&records);
            }
        }
        RecordsCommand::Export { output, scope } => {
            let records = store.read(&scope.scope(tenant)).await?;
            let count = export_csv(&output, &records)?;
            println!("{} Exported {} records to {}", style("✓").green(), count, output.display());
        }
    }

    Ok(())
}

fn print_table(records: &[InvoiceRecord]) {
    if records.is_empty() {
        println!("{} No records stored.", style("ℹ").blue());
        return;
    }

    println!(
        "{:<28} {:<12} {:<14} {:<24} {:>12}  {}",
        "FILE", "DATE", "NUMBER", "VENDOR", "TOTAL", "METHOD"
    );
    for record in records {
        println!(
            "{:<28} {:<12} {:<14} {:<24} {:>12}  {}",
            clip(&record.file_name, 28),
            clip(&record.invoice_date, 12),
            clip(&record.invoice_number, 14),
            clip(&record.vendor_name, 24),
            record.total_amount,
            record.extraction_method
        );
    }
}

fn clip(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut clipped: String = value.chars().take(width.saturating_sub(1)).collect();
        clipped.push('…');
        clipped
    }
}

/// Group key: `(year, month number)`, undated records last.
fn period_key(record: &InvoiceRecord) -> (i32, u32, String) {
    match year_month(&record.invoice_date) {
        Some((year, month)) => (year, month_number(&month), format!("{} {}", month, year)),
        None => (i32::MAX, 0, "Undated".to_string()),
    }
}

fn month_number(month: &str) -> u32 {
    const MONTHS: [&str; 12] = [
        "January", "February", "March", "April", "May", "June", "July", "August", "September", "October",
        "November", "December",
    ];
    MONTHS.iter().position(|m| *m == month).map(|i| i as u32 + 1).unwrap_or(0)
}

fn export_csv(path: &Path, records: &[InvoiceRecord]) -> anyhow::Result<usize> {
    let mut groups: BTreeMap<(i32, u32), (String, Vec<&InvoiceRecord>)> = BTreeMap::new();
    for record in records {
        let (year, month, label) = period_key(record);
        groups.entry((year, month)).or_insert_with(|| (label, Vec::new())).1.push(record);
    }

    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "period",
        "invoice_date",
        "invoice_number",
        "vendor_name",
        "gst_number",
        "description",
        "total_amount",
        "file_name",
        "extraction_method",
        "tenant_id",
    ])?;

    let mut count = 0;
    for (label, group) in groups.values() {
        for record in group {
            let total = record.total_amount.to_string();
            wtr.write_record([
                label.as_str(),
                record.invoice_date.as_str(),
                record.invoice_number.as_str(),
                record.vendor_name.as_str(),
                record.gst_number.as_str(),
                record.description.as_str(),
                total.as_str(),
                record.file_name.as_str(),
                record.extraction_method.as_str(),
                record.tenant_id.as_str(),
            ])?;
            count += 1;
        }
    }

    wtr.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(file: &str, date: &str) -> InvoiceRecord {
        let mut record = InvoiceRecord::new(file, file);
        record.invoice_date = date.to_string();
        record
    }

    #[test]
    fn test_period_key_orders_chronologically() {
        let mut keys: Vec<_> = [dated("a", "05-Mar-2024"), dated("b", ""), dated("c", "20-Dec-2023")]
            .iter()
            .map(period_key)
            .collect();
        keys.sort();

        let labels: Vec<_> = keys.into_iter().map(|k| k.2).collect();
        assert_eq!(labels, vec!["December 2023", "March 2024", "Undated"]);
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("Acme", 10), "Acme");
        assert_eq!(clip("Acme Corporation", 5), "Acme…");
    }
}
