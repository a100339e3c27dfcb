use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use heapstore::execution::{Aggregate, AggregateOp, OpIterator, SeqScan};
use heapstore::stats::IO_COST_PER_PAGE;
use heapstore::{Database, DbConfig, DbResult, TableId, TableStats, TransactionId};

#[derive(Parser)]
#[command(name = "heapstore", version, about = "Inspect and load heap-file tables")]
struct Cli {
    /// Text schema (`name (field type [pk], ...)` per line) or JSON catalog
    #[arg(long, global = true, default_value = "schema.txt")]
    catalog: PathBuf,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Buffer pool capacity in pages
    #[arg(long, global = true)]
    pool_pages: Option<usize>,

    /// Page size in bytes
    #[arg(long, global = true)]
    page_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every tuple of a table
    Scan {
        table: String,
        /// Stop after this many tuples
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Count the tuples of a table
    Count { table: String },
    /// Append the rows of a headerless CSV file to a table
    Load { table: String, csv: PathBuf },
    /// Print histograms and cost estimates for a table
    Stats { table: String },
    /// List the tables of the catalog
    Tables,
    /// Write the catalog as JSON, for later use with `--catalog`
    SaveCatalog { out: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn open_database(cli: &Cli) -> DbResult<Database> {
    let mut config = match &cli.config {
        Some(path) => DbConfig::load(path)?,
        None => DbConfig::default(),
    };
    if let Some(pool_pages) = cli.pool_pages {
        config.pool_pages = pool_pages;
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }

    let db = Database::new(config)?;
    // A JSON catalog keeps table ids and file paths; a text schema derives them
    if cli.catalog.extension().is_some_and(|ext| ext == "json") {
        db.catalog()
            .load_metadata(&cli.catalog, db.config().page_size)?;
    } else {
        db.load_schema(&cli.catalog)?;
    }
    Ok(db)
}

/// Run `body` in a fresh transaction, committing on success
fn in_transaction<T>(db: &Database, body: impl FnOnce(TransactionId) -> DbResult<T>) -> DbResult<T> {
    let txn = db.begin();
    match body(txn) {
        Ok(value) => {
            db.commit(txn)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(abort_err) = db.abort(txn) {
                eprintln!("Warning: abort of {} failed: {}", txn, abort_err);
            }
            Err(e)
        }
    }
}

fn run(cli: Cli) -> DbResult<()> {
    let db = open_database(&cli)?;

    match &cli.command {
        Command::Scan { table, limit } => {
            let id = db.table_id(table)?;
            in_transaction(&db, |txn| scan(&db, txn, id, table, *limit))
        }
        Command::Count { table } => {
            let id = db.table_id(table)?;
            let count = in_transaction(&db, |txn| count(&db, txn, id, table))?;
            println!("{}", count);
            Ok(())
        }
        Command::Load { table, csv } => {
            let id = db.table_id(table)?;
            let loaded = in_transaction(&db, |txn| db.load_csv(txn, id, csv))?;
            println!("Loaded {} rows into {}", loaded, table);
            Ok(())
        }
        Command::Stats { table } => {
            let id = db.table_id(table)?;
            let stats = TableStats::new(id, IO_COST_PER_PAGE, &db)?;
            print!("{}", stats);
            Ok(())
        }
        Command::Tables => list_tables(&db),
        Command::SaveCatalog { out } => {
            db.catalog().save_metadata(out)?;
            println!("Saved {} tables to {}", db.catalog().table_ids().len(), out.display());
            Ok(())
        }
    }
}

fn scan(db: &Database, txn: TransactionId, id: TableId, alias: &str, limit: Option<usize>) -> DbResult<()> {
    let mut scan = SeqScan::new(txn, id, alias, Arc::clone(db.buffer_pool()))?;

    let mut table = Table::new();
    table.set_titles(Row::new(
        scan.tuple_desc()
            .items()
            .iter()
            .map(|item| Cell::new(&item.name))
            .collect(),
    ));

    scan.open()?;
    let mut shown = 0;
    while scan.has_next()? && limit.is_none_or(|l| shown < l) {
        let tuple = scan.next()?;
        table.add_row(Row::new(
            tuple.fields().iter().map(|f| Cell::new(&f.to_string())).collect(),
        ));
        shown += 1;
    }
    scan.close();

    table.printstd();
    println!("{} tuples", shown);
    Ok(())
}

fn count(db: &Database, txn: TransactionId, id: TableId, alias: &str) -> DbResult<i32> {
    let scan = SeqScan::new(txn, id, alias, Arc::clone(db.buffer_pool()))?;
    let mut agg = Aggregate::new(Box::new(scan), 0, None, AggregateOp::Count)?;

    agg.open()?;
    let tuple = agg.next()?;
    agg.close();

    Ok(tuple.field(0)?.as_int().unwrap_or(0))
}

fn list_tables(db: &Database) -> DbResult<()> {
    let catalog = db.catalog();

    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("id"),
        Cell::new("name"),
        Cell::new("schema"),
        Cell::new("primary key"),
        Cell::new("pages"),
    ]));
    for id in catalog.table_ids() {
        let file = catalog.file(id)?;
        table.add_row(Row::new(vec![
            Cell::new(&id.to_string()),
            Cell::new(&catalog.table_name(id)?),
            Cell::new(&file.tuple_desc().to_string()),
            Cell::new(catalog.primary_key(id)?.as_deref().unwrap_or("")),
            Cell::new(&file.num_pages()?.to_string()),
        ]));
    }

    table.printstd();
    Ok(())
}
