use clap::{Parser, Subcommand};
use docledger::config::{LedgerConfig, DEFAULT_LEDGER_FILE};
use docledger::logging::{init_logging, LogFormat};
use docledger::{
    Attachment, Block, ChainLink, CollisionPolicy, DocumentRecord, Integrity, Ledger, PublicId,
    RecordRef, RecordType,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

type CmdResult = Result<bool, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    name = "docledger",
    version,
    about = "Tamper-evident document registration ledger"
)]
struct Cli {
    /// Ledger file
    #[arg(long, env = "DOCLEDGER_PATH", default_value = DEFAULT_LEDGER_FILE)]
    ledger: PathBuf,

    /// Log filter (RUST_LOG takes precedence)
    #[arg(long, env = "DOCLEDGER_LOG", default_value = "warn")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    /// Skip the duplicate check when allocating public ids
    #[arg(long)]
    unchecked_ids: bool,

    /// How long to wait for another writer's lock
    #[arg(long, default_value = "5000")]
    lock_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a document and print its public id
    Register {
        /// Owner's full name
        #[arg(long)]
        owner: String,
        /// Record type, e.g. "Educational Certificate" or government-id
        #[arg(long = "type")]
        record_type: RecordType,
        /// Document to attach (pdf, png, jpg, jpeg, doc, docx)
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "")]
        notes: String,
        /// Type-specific field, e.g. --detail institution="AAU" (repeatable)
        #[arg(long = "detail", value_parser = parse_detail)]
        details: Vec<(String, String)>,
    },
    /// Verify a record by public id (or legacy position)
    Verify {
        #[arg(required_unless_present = "position")]
        id: Option<String>,
        /// Look up by 1-based position instead (records without a public id)
        #[arg(long, conflicts_with = "id")]
        position: Option<u64>,
    },
    /// Print a block as JSON
    Show {
        #[arg(required_unless_present = "position")]
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        position: Option<u64>,
        /// Also write the stored document to this path
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// List all records
    List,
    /// List records of one type
    Filter { record_type: RecordType },
    /// Recompute every block and check chain linkage
    Audit,
    /// Show ledger statistics
    Stats,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, &cli.log_level);

    let policy = if cli.unchecked_ids {
        CollisionPolicy::Unchecked
    } else {
        CollisionPolicy::Check
    };
    let config = LedgerConfig::new(&cli.ledger)
        .with_collision_policy(policy)
        .with_lock_timeout(Duration::from_millis(cli.lock_timeout_ms));

    let result = match cli.command {
        Commands::Register {
            owner,
            record_type,
            file,
            notes,
            details,
        } => cmd_register(&config, record_type, &owner, &file, &notes, details),
        Commands::Verify { id, position } => cmd_verify(&config, id.as_deref(), position),
        Commands::Show {
            id,
            position,
            export,
        } => cmd_show(&config, id.as_deref(), position, export.as_deref()),
        Commands::List => cmd_list(&config),
        Commands::Filter { record_type } => cmd_filter(&config, record_type),
        Commands::Audit => cmd_audit(&config),
        Commands::Stats => cmd_stats(&config),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

fn parse_detail(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

fn record_ref(
    id: Option<&str>,
    position: Option<u64>,
) -> Result<RecordRef, docledger::LedgerError> {
    match (id, position) {
        (_, Some(pos)) => Ok(RecordRef::Position(pos)),
        (Some(id), None) => Ok(RecordRef::Public(PublicId::parse(id)?)),
        (None, None) => Err(docledger::LedgerError::MalformedIdentifier(String::new())),
    }
}

fn cmd_register(
    config: &LedgerConfig,
    record_type: RecordType,
    owner: &str,
    file: &Path,
    notes: &str,
    details: Vec<(String, String)>,
) -> CmdResult {
    let attachment = Attachment::from_path(file)?;
    let mut record = DocumentRecord::new(record_type, owner)
        .attachment(attachment)
        .notes(notes);
    for (k, v) in details {
        record = record.detail(k, v);
    }
    for field in record_type.detail_fields() {
        if !record.details.contains_key(*field) {
            eprintln!("note: no {} given for {}", field, record_type);
        }
    }

    let mut ledger = Ledger::open(config)?;
    let id = ledger.register(&record)?;
    println!("Document registered. Unique ID: {}", id);
    println!("Keep this ID to verify the document later.");
    Ok(true)
}

fn cmd_verify(config: &LedgerConfig, id: Option<&str>, position: Option<u64>) -> CmdResult {
    let key = record_ref(id, position)?;
    let ledger = Ledger::open(config)?;
    let report = ledger.verify_ref(&key)?;
    let block = &report.block;

    println!("Record {}", key);
    print_details(block);
    println!(
        "Attachment:    {}",
        if block.payload_str("file_content").is_some() {
            "present"
        } else {
            "none"
        }
    );
    println!("Block hash:    {}", block.digest);

    match report.integrity {
        Integrity::Intact => {
            println!("Result:        intact, this record has not been tampered with");
        }
        Integrity::Tampered => {
            println!("Result:        TAMPERED, this record may have been altered");
            println!("Recomputed:    {}", report.recomputed_digest);
        }
    }
    match &report.link {
        ChainLink::Genesis => println!("Previous hash: (genesis block)"),
        ChainLink::Linked { previous_position } => println!(
            "Previous hash: {} (block {})",
            block.previous_digest, previous_position
        ),
        ChainLink::Broken { expected, found } => {
            println!("Previous hash: {} BROKEN, block before has {:?}", found, expected)
        }
    }

    let linked = !matches!(report.link, ChainLink::Broken { .. });
    Ok(report.integrity.is_intact() && linked)
}

fn cmd_show(
    config: &LedgerConfig,
    id: Option<&str>,
    position: Option<u64>,
    export: Option<&Path>,
) -> CmdResult {
    let key = record_ref(id, position)?;
    let ledger = Ledger::open(config)?;
    let block = ledger
        .find(&key)
        .ok_or_else(|| docledger::LedgerError::NotFound(key.to_string()))?;
    println!("{}", serde_json::to_string_pretty(block)?);

    if let Some(dest) = export {
        let attachment =
            Attachment::from_block(block).ok_or("record carries no stored document")?;
        let bytes = attachment.decode()?;
        std::fs::write(dest, &bytes)?;
        eprintln!(
            "Wrote {} ({} bytes) to {}",
            attachment.file_name,
            bytes.len(),
            dest.display()
        );
    }
    Ok(true)
}

fn cmd_list(config: &LedgerConfig) -> CmdResult {
    let ledger = Ledger::open(config)?;
    if ledger.is_empty() {
        println!("(ledger is empty)");
        return Ok(true);
    }
    println!("Total blocks: {}", ledger.len());
    for s in ledger.list_all() {
        let id = s
            .public_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| format!("#{}", s.position));
        println!(
            "{:<13} {:<24} {:<24} {}  {}",
            id,
            s.record_type.as_deref().unwrap_or("-"),
            s.owner_name.as_deref().unwrap_or("-"),
            s.created_at,
            s.file_name.as_deref().unwrap_or("-"),
        );
    }
    Ok(true)
}

fn cmd_filter(config: &LedgerConfig, record_type: RecordType) -> CmdResult {
    let ledger = Ledger::open(config)?;
    let matches: Vec<&Block> = ledger.filter_by_type(record_type.as_str()).collect();
    if matches.is_empty() {
        println!("No {} records found", record_type);
        return Ok(true);
    }
    println!("Found {} {} records", matches.len(), record_type);
    for block in matches {
        let id = block
            .public_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| format!("#{}", block.sequence_position));
        println!(
            "{} - {}",
            id,
            block.payload_str("owner_name").unwrap_or("-")
        );
    }
    Ok(true)
}

fn cmd_audit(config: &LedgerConfig) -> CmdResult {
    let ledger = Ledger::open(config)?;
    let audit = ledger.audit();
    print!("{}", audit);
    Ok(audit.is_clean())
}

fn cmd_stats(config: &LedgerConfig) -> CmdResult {
    let ledger = Ledger::open(config)?;
    print!("{}", ledger.stats());
    Ok(true)
}

fn print_details(block: &Block) {
    let field = |key: &str| block.payload_str(key).unwrap_or("N/A").to_string();
    println!("Document type: {}", field("record_type"));
    println!("Owner:         {}", field("owner_name"));
    println!("Registered on: {}", block.created_at);

    let record_type = block
        .payload_str("record_type")
        .and_then(|t| t.parse::<RecordType>().ok());
    if let Some(record_type) = record_type {
        for key in record_type.detail_fields() {
            println!("{:<14} {}", format!("{}:", key), field(*key));
        }
    }
}
