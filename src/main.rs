use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use litmus_k8s::charm::CharmKind;
use litmus_k8s::runtime::{self, leader, Operator, RelationEnd, RunOptions};
use litmus_k8s::{telemetry, Error};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one charm unit
    Run(RunArgs),
    /// Relate two applications
    Integrate(IntegrateArgs),
    /// Show version and build information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Component this unit runs
    #[arg(long, value_enum, env = "LITMUS_CHARM")]
    charm: CharmKind,

    /// Application name; defaults to the component's usual name
    #[arg(long, env = "LITMUS_APP")]
    app: Option<String>,

    /// Model namespace
    #[arg(long, env = "LITMUS_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Unit name; defaults to `<app>/0`
    #[arg(long, env = "LITMUS_UNIT")]
    unit: Option<String>,

    /// Directory holding one subdirectory per workload container
    #[arg(long, env = "LITMUS_WORKLOAD_ROOT", default_value = "/var/lib/litmus")]
    workload_root: PathBuf,

    /// Charm configuration (TOML)
    #[arg(long, env = "LITMUS_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between update-status passes
    #[arg(long, env = "LITMUS_UPDATE_STATUS_INTERVAL", default_value_t = 300)]
    update_status_interval: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "LITMUS_LOG_JSON")]
    log_json: bool,
}

#[derive(Parser, Debug)]
struct IntegrateArgs {
    /// First side, as `<app>:<endpoint>`
    first: String,

    /// Second side, as `<app>:<endpoint>`
    second: String,

    /// Model namespace
    #[arg(long, env = "LITMUS_NAMESPACE", default_value = "default")]
    namespace: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Litmus-K8s Operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            Ok(())
        }
        Commands::Integrate(args) => run_integrate(args).await,
        Commands::Run(args) => run_operator(args).await,
    }
}

async fn run_integrate(args: IntegrateArgs) -> Result<(), Error> {
    telemetry::init_telemetry("litmus-operator", false)?;
    let first = RelationEnd::parse(&args.first)?;
    let second = RelationEnd::parse(&args.second)?;

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    let id = runtime::integrate(&client, &args.namespace, &first, &second).await?;
    println!("relation {id}: {} <-> {}", args.first, args.second);
    Ok(())
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    telemetry::init_telemetry("litmus-operator", args.log_json)?;

    info!(
        "Starting Litmus-K8s Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let app = args
        .app
        .unwrap_or_else(|| args.charm.default_app_name().to_string());
    let unit = args.unit.unwrap_or_else(|| format!("{app}/0"));
    let options = RunOptions {
        charm: args.charm,
        app,
        namespace: args.namespace,
        unit,
        workload_root: args.workload_root,
        config_path: args.config,
        update_status_interval: Duration::from_secs(args.update_status_interval.max(1)),
    };

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let identity = leader::holder_identity();
    info!("Leader election identity: {}", identity);

    let result = Operator::new(client.clone(), &identity, options)
        .run(client)
        .await;

    telemetry::shutdown_telemetry();
    result
}
