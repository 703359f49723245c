mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use pomerium_zero_provider::resources::cluster::{find_cluster, list_clusters};
use pomerium_zero_provider::resources::policy::list_policies;
use pomerium_zero_provider::resources::PolicyDataSource;
use pomerium_zero_provider::{
    reconcile, Action, Address, DataSource, Error, Manifest, PlanOptions, Provider, Reconciler,
    Session, StateStore,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{default_config_path, resolve, Config, Overrides};
use crate::output::{
    progress_line, render_attributes, render_plan, render_refresh, render_report,
};

const EXIT_VALIDATION_FAILURE: i32 = 2;
const EXIT_APPLY_FAILURE: i32 = 3;
const EXIT_TRANSPORT_OR_AUTH_FAILURE: i32 = 4;
const EXIT_GENERIC_FAILURE: i32 = 1;

const DEFAULT_STATE_PATH: &str = "pzctl.state.json";

#[derive(Parser, Debug)]
#[command(name = "pzctl")]
#[command(about = "Pomerium Zero declarative configuration CLI", long_about = None)]
struct Args {
    /// Base URL for the Pomerium Zero API
    #[arg(long, env = "POMERIUM_ZERO_BASE_URL")]
    base_url: Option<String>,

    /// Long-lived API token, exchanged for a session token on every run
    #[arg(long, env = "POMERIUM_ZERO_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Load config from this path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save provided auth (api-token/base-url) into config
    #[arg(long, default_value_t = false)]
    save_auth: bool,

    /// HTTP timeout seconds (default 10)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log level: trace|debug|info|warn|error
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(ClapArgs, Debug)]
struct ManifestArgs {
    /// Manifest file (.yaml, .yml or .json)
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// State file
    #[arg(long, default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct StateArgs {
    /// State file
    #[arg(long, default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a manifest offline
    Validate {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Show what apply would change
    Plan {
        #[command(flatten)]
        manifest: ManifestArgs,
        /// Diff against the state file without reading remote objects
        #[arg(long, default_value_t = false)]
        no_refresh: bool,
        /// Print the plan as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Create, update and delete remote objects to match the manifest
    Apply {
        #[command(flatten)]
        manifest: ManifestArgs,
    },
    /// Re-read every managed object into the state file
    Refresh {
        #[command(flatten)]
        manifest: ManifestArgs,
    },
    /// Adopt an existing remote object
    Import {
        #[command(flatten)]
        manifest: ManifestArgs,
        /// Managed address, e.g. pomeriumzero_route.app
        address: String,
        /// Remote id (cluster id for pomeriumzero_cluster_settings)
        id: String,
    },
    /// Delete every object in the state file
    Destroy {
        #[command(flatten)]
        manifest: ManifestArgs,
    },
    State {
        #[command(subcommand)]
        cmd: StateCmd,
    },
    Clusters {
        #[command(subcommand)]
        cmd: ClusterCmd,
    },
    Policies {
        #[command(subcommand)]
        cmd: PolicyCmd,
    },
    /// Print attribute schemas as JSON
    Schema {
        /// Resource or data source type; all when omitted
        type_name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum StateCmd {
    List {
        #[command(flatten)]
        state: StateArgs,
    },
    Show {
        address: String,
        #[command(flatten)]
        state: StateArgs,
    },
    /// Forget an object without deleting it remotely
    Rm {
        address: String,
        #[command(flatten)]
        state: StateArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ClusterCmd {
    List,
    Get { name: String },
}

#[derive(Subcommand, Debug)]
enum PolicyCmd {
    List {
        /// Limit to a namespace and its descendants
        #[arg(long)]
        namespace_id: Option<String>,
    },
    Get {
        #[arg(long)]
        namespace_id: String,
        name: String,
    },
}

impl Command {
    /// Exit code for failures the error itself does not classify.
    fn failure_code(&self) -> i32 {
        match self {
            Command::Validate { .. } => EXIT_VALIDATION_FAILURE,
            Command::Apply { .. } | Command::Destroy { .. } | Command::Import { .. } => {
                EXIT_APPLY_FAILURE
            }
            _ => EXIT_GENERIC_FAILURE,
        }
    }
}

/// Everything a command needs to reach the API.
struct App {
    provider: Provider,
    overrides: Overrides,
    saved: Config,
}

impl App {
    async fn connect(&self, manifest: Option<&Manifest>) -> Result<Session> {
        let cfg = resolve(&self.overrides, manifest.map(|m| &m.provider), &self.saved);
        tracing::debug!(base_url = %cfg.base_url, "connecting");
        Ok(self.provider.configure(&cfg).await?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging
    let lvl = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(lvl)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let fallback = args.cmd.failure_code();
    if let Err(err) = run(args).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code(&err, fallback));
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let cfg_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut saved = Config::load(&cfg_path)?;

    if args.save_auth {
        if let Some(token) = &args.api_token {
            saved.api_token = Some(token.clone());
        }
        if let Some(url) = &args.base_url {
            saved.base_url = Some(url.clone());
        }
        saved.save(&cfg_path)?;
    }

    let ctx = App {
        provider: Provider::new(),
        overrides: Overrides {
            base_url: args.base_url,
            api_token: args.api_token,
            timeout_secs: args.timeout_secs,
        },
        saved,
    };

    match args.cmd {
        Command::Validate { file } => run_validate(&ctx, &file),
        Command::Plan {
            manifest,
            no_refresh,
            json,
        } => run_plan(&ctx, &manifest, !no_refresh, json).await,
        Command::Apply { manifest } => run_apply(&ctx, &manifest).await,
        Command::Refresh { manifest } => run_refresh(&ctx, &manifest).await,
        Command::Import {
            manifest,
            address,
            id,
        } => run_import(&ctx, &manifest, &address, &id).await,
        Command::Destroy { manifest } => run_destroy(&ctx, &manifest).await,
        Command::State { cmd } => run_state(&ctx, cmd),
        Command::Clusters { cmd } => run_clusters(&ctx, cmd).await,
        Command::Policies { cmd } => run_policies(&ctx, cmd).await,
        Command::Schema { type_name } => run_schema(&ctx, type_name.as_deref()),
    }
}

fn run_validate(ctx: &App, file: &Path) -> Result<()> {
    let manifest = Manifest::load(file)?;
    let order = reconcile::validate(&ctx.provider, &manifest)?;
    println!(
        "Success! The manifest is valid ({} objects).",
        order.len()
    );
    Ok(())
}

async fn run_plan(ctx: &App, args: &ManifestArgs, refresh: bool, as_json: bool) -> Result<()> {
    let manifest = Manifest::load(&args.file)?;
    reconcile::validate(&ctx.provider, &manifest)?;
    let state = StateStore::new(&args.state).load()?;
    let session = ctx.connect(Some(&manifest)).await?;

    let plan = Reconciler::new(&ctx.provider, &session)
        .plan(&manifest, &state, PlanOptions { refresh })
        .await?;

    if as_json {
        return print_json_value(&json!({
            "changes": plan.changes,
            "summary": plan.summary(),
        }));
    }
    print!("{}", render_plan(&plan));
    Ok(())
}

async fn run_apply(ctx: &App, args: &ManifestArgs) -> Result<()> {
    let manifest = Manifest::load(&args.file)?;
    reconcile::validate(&ctx.provider, &manifest)?;
    let store = StateStore::new(&args.state);
    let mut state = store.load()?;
    let session = ctx.connect(Some(&manifest)).await?;

    let report = Reconciler::new(&ctx.provider, &session)
        .apply(&manifest, &store, &mut state, &mut print_progress)
        .await?;
    print!("{}", render_report("Apply", &report));
    Ok(())
}

async fn run_refresh(ctx: &App, args: &ManifestArgs) -> Result<()> {
    let manifest = Manifest::load(&args.file)?;
    let store = StateStore::new(&args.state);
    let mut state = store.load()?;
    let session = ctx.connect(Some(&manifest)).await?;

    let report = Reconciler::new(&ctx.provider, &session)
        .refresh(&store, &mut state)
        .await?;
    print!("{}", render_refresh(&report));
    Ok(())
}

async fn run_import(ctx: &App, args: &ManifestArgs, address: &str, id: &str) -> Result<()> {
    let address: Address = address.parse()?;
    let manifest = Manifest::load(&args.file)?;
    let store = StateStore::new(&args.state);
    let mut state = store.load()?;
    let session = ctx.connect(Some(&manifest)).await?;

    Reconciler::new(&ctx.provider, &session)
        .import(&manifest, &store, &mut state, &address, id)
        .await?;
    println!("{}: Import successful!", address);
    Ok(())
}

async fn run_destroy(ctx: &App, args: &ManifestArgs) -> Result<()> {
    let manifest = Manifest::load(&args.file)?;
    let store = StateStore::new(&args.state);
    let mut state = store.load()?;
    let session = ctx.connect(Some(&manifest)).await?;

    let report = Reconciler::new(&ctx.provider, &session)
        .destroy(&store, &mut state, &mut print_progress)
        .await?;
    print!("{}", render_report("Destroy", &report));
    Ok(())
}

fn print_progress(address: &Address, action: Action) {
    println!("{}: {}", address, progress_line(action));
}

fn run_state(ctx: &App, cmd: StateCmd) -> Result<()> {
    match cmd {
        StateCmd::List { state } => {
            let state = StateStore::new(&state.state).load()?;
            for address in state.addresses() {
                println!("{}", address);
            }
            Ok(())
        }
        StateCmd::Show { address, state } => {
            let address: Address = address.parse()?;
            let state = StateStore::new(&state.state).load()?;
            let resource = state
                .get(&address)
                .with_context(|| format!("{} is not in state", address))?;
            let attributes = match ctx.provider.resource(&address.type_name) {
                Some(handler) => handler.schema().mask(&resource.attributes),
                None => resource.attributes.clone(),
            };
            println!("# {}:", address);
            print!("{}", render_attributes(&attributes));
            Ok(())
        }
        StateCmd::Rm { address, state } => {
            let address: Address = address.parse()?;
            let store = StateStore::new(&state.state);
            let mut state = store.load()?;
            if state.remove(&address).is_none() {
                anyhow::bail!("{} is not in state", address);
            }
            store.persist(&mut state)?;
            println!("Removed {}", address);
            Ok(())
        }
    }
}

async fn run_clusters(ctx: &App, cmd: ClusterCmd) -> Result<()> {
    let session = ctx.connect(None).await?;
    match cmd {
        ClusterCmd::List => {
            let clusters = list_clusters(&session).await?;
            print_json_value(&serde_json::to_value(clusters)?)
        }
        ClusterCmd::Get { name } => {
            let cluster = find_cluster(list_clusters(&session).await?, &name)?;
            print_json_value(&serde_json::to_value(cluster)?)
        }
    }
}

async fn run_policies(ctx: &App, cmd: PolicyCmd) -> Result<()> {
    let session = ctx.connect(None).await?;
    match cmd {
        PolicyCmd::List { namespace_id } => {
            let policies = list_policies(&session, namespace_id.as_deref()).await?;
            print_json_value(&serde_json::to_value(policies)?)
        }
        PolicyCmd::Get { namespace_id, name } => {
            let mut lookup = serde_json::Map::new();
            lookup.insert("name".into(), json!(name));
            lookup.insert("namespace_id".into(), json!(namespace_id));
            let found = PolicyDataSource.read(&session, &lookup).await?;
            print_json_value(&serde_json::Value::Object(found))
        }
    }
}

fn run_schema(ctx: &App, type_name: Option<&str>) -> Result<()> {
    let Some(type_name) = type_name else {
        return print_json_value(&ctx.provider.schemas());
    };
    let schema = ctx
        .provider
        .resource(type_name)
        .map(|r| r.schema())
        .or_else(|| ctx.provider.data_source(type_name).map(|d| d.schema()))
        .with_context(|| format!("unknown resource or data source type {:?}", type_name))?;
    print_json_value(&serde_json::to_value(schema)?)
}

fn print_json_value(v: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

fn exit_code(err: &anyhow::Error, fallback: i32) -> i32 {
    let Some(err) = err.chain().find_map(|e| e.downcast_ref::<Error>()) else {
        return fallback;
    };
    if err.is_transport_or_auth() {
        EXIT_TRANSPORT_OR_AUTH_FAILURE
    } else if err.is_validation() {
        EXIT_VALIDATION_FAILURE
    } else {
        fallback
    }
}
