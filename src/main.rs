use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use human_bytes::human_bytes;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use es_bulk_stream::audit_builder::AuditTrail;
use es_bulk_stream::conf::Config;
use es_bulk_stream::debug_if;
use es_bulk_stream::es_client::{build_http_client, EsBulkExecutor, EsClient};
use es_bulk_stream::{BulkExecutor, BulkStream, DryRunExecutor, Operation};

#[derive(Parser, Debug)]
#[command(name = "es-bulk-stream", version)]
struct Args {
    /// Config file (.toml, .json or .yaml)
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,
    /// NDJSON input, one document per line; stdin when omitted
    #[arg(short, long, value_name = "PATH")]
    input: Option<PathBuf>,
    /// Target index, overrides `target.index`
    #[arg(long)]
    index: Option<String>,
    #[arg(long = "doc-type")]
    doc_type: Option<String>,
    /// JSON pointer to the document id, e.g. `/id`
    #[arg(long = "id-pointer", value_name = "POINTER")]
    id_pointer: Option<String>,
    /// Send documents as partial updates instead of index requests
    #[arg(long = "partial-update")]
    partial_update: bool,
    /// Disable dry run only
    #[arg(short = 'n', long = "no-dry-run")]
    no_dry_run: bool,
    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,
    #[arg(long)]
    insecure: bool,
    #[arg(long, default_value_t = 5)]
    connect_retries: usize,
}

/// How input lines become operations.
#[derive(Debug, Clone)]
struct DocumentPlan {
    index: String,
    doc_type: Option<String>,
    id_pointer: Option<String>,
    partial_update: bool,
}

impl DocumentPlan {
    fn to_operation(&self, document: Value) -> Result<Operation, String> {
        let id = match &self.id_pointer {
            Some(pointer) => match document.pointer(pointer) {
                Some(Value::String(id)) => Some(id.clone()),
                Some(Value::Number(id)) => Some(id.to_string()),
                Some(other) => return Err(format!("id at {} is not a scalar: {}", pointer, other)),
                None => return Err(format!("no id at {}", pointer)),
            },
            None => None,
        };

        let operation = if self.partial_update {
            let id = id.ok_or_else(|| "partial update needs --id-pointer".to_string())?;
            Operation::partial_update(self.index.clone(), id, document)
        } else {
            Operation::index(self.index.clone(), id, document)
        };
        Ok(operation.with_doc_type(self.doc_type.clone()))
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_file(true)
        .with_line_number(true)
        .init();

    info!(
        "Args debug={:?}, no-dry-run={:?}, config_path={:?}",
        args.debug, args.no_dry_run, args.config
    );

    if let Err(err) = run(args).await {
        error!("es-bulk-stream failed: {}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = Config::load(&args.config)?;
    debug_if!(args.debug, "Config file loaded correctly ... {:#?}", config);

    let target = config.get_target().clone();
    let index = args
        .index
        .clone()
        .or_else(|| target.as_ref().map(|t| t.get_index().clone()))
        .ok_or("target index must be set with --index or target.index")?;
    let plan = DocumentPlan {
        index,
        doc_type: args
            .doc_type
            .clone()
            .or_else(|| target.as_ref().and_then(|t| t.get_doc_type().clone())),
        id_pointer: args.id_pointer.clone(),
        partial_update: args.partial_update,
    };

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    if !args.no_dry_run {
        info!("Dry run, documents are not sent (use --no-dry-run)");
        let stream = BulkStream::new(DryRunExecutor, config.get_stream())?;
        return stream_documents(&stream, input, &plan).await;
    }

    let endpoint = config.get_endpoint().clone();
    let http_client = build_http_client(&endpoint, args.insecure)?;
    let client = EsClient::new(endpoint, http_client);
    let server_info = client.wait_until_ready(args.connect_retries).await?;
    client.print_server_info("Destination").await;

    let mut executor = EsBulkExecutor::for_server(client, &server_info)?
        .with_refresh(target.as_ref().and_then(|t| t.get_refresh()));
    if let Some(path) = config.get_audit_file() {
        let audit = AuditTrail::open(&path)
            .await
            .map_err(|e| format!("cannot open audit file {:?}: {}", path, e))?;
        info!("Audit trail: {:?}", path);
        executor = executor.with_audit(audit);
    }

    let stream = BulkStream::new(executor, config.get_stream())?;
    stream_documents(&stream, input, &plan).await
}

async fn stream_documents<E: BulkExecutor>(
    stream: &BulkStream<E>,
    input: Box<dyn AsyncBufRead + Unpin + Send>,
    plan: &DocumentPlan,
) -> Result<(), Box<dyn Error>> {
    let mut lines = input.lines();
    let mut line_number = 0u64;
    let mut skipped = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let operation = serde_json::from_str::<Value>(&line)
            .map_err(|e| e.to_string())
            .and_then(|document| plan.to_operation(document));
        match operation {
            Ok(operation) => stream.enqueue(operation).await?,
            Err(reason) => {
                skipped += 1;
                warn!(line = line_number, "skipping document: {}", reason);
            }
        }
    }

    stream.drain().await;
    let report = stream.shutdown().await;
    let stats = report.stats;
    info!(
        "Done: lines={}, enqueued={}, submitted={}, lost={}, discarded={}, skipped={}, flushes={}",
        line_number,
        stats.operations_enqueued,
        stats.operations_submitted,
        stats.operations_lost,
        stats.operations_discarded,
        skipped,
        stats.flushes_submitted
    );
    if let Some(usage) = memory_stats::memory_stats() {
        info!(
            "Memory usage: physical={}, virtual={}",
            human_bytes(usage.physical_mem as f64),
            human_bytes(usage.virtual_mem as f64)
        );
    }
    if report.panicked > 0 || stats.operations_lost > 0 || stats.operations_discarded > 0 {
        return Err(format!(
            "{} operations lost, {} discarded, {} workers panicked",
            stats.operations_lost, stats.operations_discarded, report.panicked
        )
        .into());
    }
    Ok(())
}
