//! ERP REST Bridge CLI
//!
//! Command-line access to the bridge operations against a JSON-RPC server.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use erp_rest_bridge::{
    call_args, load_document, ApiResponse, Bridge, BridgeConfig, BridgeError, Credentials,
    JsonRpcConnector, ListParams, RecordId, Session,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "erp-rest-bridge")]
#[command(about = "Schema-driven document access to a remote ERP object service")]
#[command(version)]
struct Cli {
    /// Server URL (e.g. http://localhost:8069)
    #[arg(long, env = "ERP_BRIDGE_SERVER", global = true)]
    server: Option<String>,

    /// Database name
    #[arg(long, env = "ERP_BRIDGE_DATABASE", global = true)]
    database: Option<String>,

    /// Login
    #[arg(long, env = "ERP_BRIDGE_USER", global = true)]
    user: Option<String>,

    /// Password
    #[arg(long, env = "ERP_BRIDGE_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 10, global = true)]
    timeout: u64,

    /// Strict mode: reject document fields unknown to the model (default: false)
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set, global = true)]
    strict: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List records of a model
    List {
        /// Model name (res.partner or ResPartner)
        model: String,

        /// Filter expression, e.g. [["state", "=", "draft"]]
        #[arg(long)]
        filter: Option<String>,

        /// Comma-separated dotted field paths
        #[arg(long)]
        schema: Option<String>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        offset: Option<u32>,
    },

    /// Fetch one record
    Get {
        model: String,
        id: RecordId,

        /// Comma-separated dotted field paths
        #[arg(long)]
        schema: Option<String>,
    },

    /// Create a record from a JSON document
    Create {
        model: String,

        /// Document file, or - for stdin
        document: PathBuf,
    },

    /// Update a record from a JSON document
    Update {
        model: String,
        id: RecordId,

        /// Document file, or - for stdin
        document: PathBuf,
    },

    /// Delete a record, archived records included
    Delete { model: String, id: RecordId },

    /// Call a model method, or a record method with --id
    Call {
        model: String,
        method: String,

        /// Record to call the method on
        #[arg(long)]
        id: Option<RecordId>,

        /// JSON body with an optional "args" array, or - for stdin
        body: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run(cli: Cli) -> Result<(), u8> {
    let Some(server) = cli.server.clone() else {
        eprintln!("Error: no server given (use --server or ERP_BRIDGE_SERVER)");
        return Err(2);
    };
    let credentials = Credentials {
        server,
        database: cli.database.clone(),
        user: cli.user.clone(),
        password: cli.password.clone(),
    };
    let config = BridgeConfig::new().strict(cli.strict);
    let connector = JsonRpcConnector::new(Duration::from_secs(cli.timeout));
    let bridge = Bridge::new(connector, config);

    let session = bridge.session(&credentials).map_err(|e| fail(cli.pretty, &e))?;
    let response = dispatch(&session, cli.command, cli.pretty)?;
    print_json(&response.body, cli.pretty)?;
    if response.is_success() {
        Ok(())
    } else {
        Err(1)
    }
}

fn dispatch(session: &Session<'_>, command: Commands, pretty: bool) -> Result<ApiResponse, u8> {
    let response = match command {
        Commands::List {
            model,
            filter,
            schema,
            limit,
            offset,
        } => {
            let params = ListParams {
                filter,
                schema,
                limit,
                offset,
            };
            session.list(&model, &params).map(|page| ApiResponse::page(&page))
        }
        Commands::Get { model, id, schema } => session
            .fetch(&model, id, schema.as_deref())
            .map(ApiResponse::record),
        Commands::Create { model, document } => {
            let body = read_body(&document)?;
            session.create(&model, &body).map(ApiResponse::written)
        }
        Commands::Update {
            model,
            id,
            document,
        } => {
            let body = read_body(&document)?;
            session.update(&model, id, &body).map(ApiResponse::written)
        }
        Commands::Delete { model, id } => session.delete(&model, id).map(|()| ApiResponse::deleted()),
        Commands::Call {
            model,
            method,
            id,
            body,
        } => {
            let body = body.as_deref().map(read_body).transpose()?;
            call_args(body.as_ref())
                .and_then(|args| match id {
                    Some(id) => session.invoke_record(&model, id, &method, args),
                    None => session.invoke(&model, &method, args),
                })
                .map(ApiResponse::method_result)
        }
    };

    response.map_err(|e| fail(pretty, &e))
}

fn read_body(path: &Path) -> Result<Value, u8> {
    load_document(path).map_err(|e| {
        eprintln!("Error loading {}: {}", path.display(), e);
        e.exit_code() as u8
    })
}

fn fail(pretty: bool, e: &BridgeError) -> u8 {
    eprintln!("Error: {}", e);
    let _ = print_json(&ApiResponse::error(e).body, pretty);
    e.exit_code() as u8
}

fn print_json(value: &Value, pretty: bool) -> Result<(), u8> {
    let output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", output);
    Ok(())
}
