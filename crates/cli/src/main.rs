use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fnrt_core::{KubeObject, ObjectRef, ResourceList};
use fnrt_sdk::{Config, ResourceKind, Sdk};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fnrtctl", version, about = "Condition-driven KRM function runtime")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Governed kind, e.g. "req.nephio.org/v1alpha1/Interface"
    #[arg(long = "for", env = "FNRT_FOR", global = true)]
    for_gvk: Option<String>,

    /// Owned kinds as GVK=KIND, e.g. "ipam.nephio.org/v1alpha1/IPAllocation=condition-and-resource"
    #[arg(long = "owns", env = "FNRT_OWNS", value_delimiter = ',', global = true)]
    owns: Vec<String>,

    /// Watched kinds; "*" watches every unclaimed object
    #[arg(long = "watch", env = "FNRT_WATCH", value_delimiter = ',', global = true)]
    watch: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a ResourceList and print the inventory and global readiness
    Inspect {
        /// ResourceList file (stdin when absent)
        file: Option<PathBuf>,
    },
    /// Run a condition-terminal function and write the resulting ResourceList to stdout
    Run {
        /// ResourceList file (stdin when absent)
        file: Option<PathBuf>,
    },
}

/// Kinds a function declares, from flags or the ResourceList's functionConfig.
#[derive(Debug, Clone, PartialEq)]
struct Declared {
    for_gvk: ObjectRef,
    owns: Vec<(ObjectRef, ResourceKind)>,
    watch: Vec<ObjectRef>,
}

impl Declared {
    fn config(&self) -> Config<'static> {
        let mut cfg = Config::new(self.for_gvk.clone());
        for (gvk, kind) in &self.owns {
            cfg = cfg.owns(gvk.clone(), *kind);
        }
        for gvk in &self.watch {
            let key = gvk.to_string();
            cfg = cfg.watch(gvk.clone(), move |obj| {
                debug!(watch = %key, object = %obj.reference(), "observed");
                Ok(())
            });
        }
        cfg
    }
}

fn init_tracing() {
    let env = std::env::var("FNRT_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn parse_owned(spec: &str) -> Result<(ObjectRef, ResourceKind)> {
    let (gvk, kind) = spec.split_once('=').unwrap_or((spec, "condition-and-resource"));
    let kind = ResourceKind::from_str(kind).map_err(anyhow::Error::msg)?;
    Ok((ObjectRef::parse_gvk(gvk)?, kind))
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Flags win; a ConfigMap-style functionConfig (`data.for`, `data.owns`, `data.watch`) fills in
/// what the flags leave out.
fn declared(cli: &Cli, function_config: Option<&KubeObject>) -> Result<Declared> {
    let data = |key: &str| function_config.and_then(|fc| fc.get_string(&["data", key])).map(str::to_string);

    let for_key = cli.for_gvk.clone().or_else(|| data("for")).context("governed kind missing: pass --for or set data.for")?;
    let owns: Vec<String> = if cli.owns.is_empty() {
        data("owns").map(|raw| split_list(&raw).map(str::to_string).collect()).unwrap_or_default()
    } else {
        cli.owns.clone()
    };
    let watch: Vec<String> = if cli.watch.is_empty() {
        data("watch").map(|raw| split_list(&raw).map(str::to_string).collect()).unwrap_or_default()
    } else {
        cli.watch.clone()
    };

    Ok(Declared {
        for_gvk: ObjectRef::parse_gvk(&for_key)?,
        owns: owns.iter().map(|s| parse_owned(s)).collect::<Result<_>>()?,
        watch: watch.iter().map(|s| ObjectRef::parse_gvk(s)).collect::<Result<_, _>>()?,
    })
}

fn read_input(file: Option<&Path>) -> Result<ResourceList> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    ResourceList::from_yaml(&raw).context("parsing ResourceList")
}

fn inspect(cli: &Cli, file: Option<&Path>) -> Result<()> {
    let mut rl = read_input(file)?;
    let decl = declared(cli, rl.function_config.as_ref())?;
    let mut sdk = Sdk::new(&mut rl, decl.config())?;
    sdk.populate_inventory();
    let inv = sdk.inventory();
    let ready = inv.is_ready();
    let lines = inv.list();
    info!(entries = lines.len(), unmatched = inv.unmatched(), ready, "inspect");

    match cli.output {
        Output::Human => {
            println!("{:<8} {:<48} {:<40} {:<22} {:<9} {:<8} DESIRED", "ROLE", "TARGET", "OWNER", "KIND", "CONDITION", "EXISTS");
            for l in &lines {
                println!(
                    "{:<8} {:<48} {:<40} {:<22} {:<9} {:<8} {}",
                    l.role.to_string(),
                    l.target,
                    l.owner.as_deref().unwrap_or("-"),
                    l.kind.as_deref().unwrap_or("-"),
                    l.condition.as_deref().unwrap_or("-"),
                    l.existing,
                    l.desired,
                );
            }
            println!("ready: {}  unmatched: {}", ready, inv.unmatched());
        }
        Output::Json => {
            let out = serde_json::json!({ "ready": ready, "unmatched": inv.unmatched(), "entries": lines });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

/// Condition-terminal function: no children, the governed object is regenerated as is once
/// the watched kinds are ready.
fn run(cli: &Cli, file: Option<&Path>) -> Result<()> {
    let mut rl = read_input(file)?;
    let decl = declared(cli, rl.function_config.as_ref())?;
    if !decl.owns.is_empty() {
        bail!("run drives condition-terminal functions only; drop --owns");
    }
    let cfg = decl.config().populate(|_| Ok(Vec::new())).generate(|for_obj, _| Ok(for_obj.cloned()));
    let report = fnrt_sdk::run(&mut rl, cfg);
    info!(stage = ?report.stage, generated = report.generated, failures = report.instance_failures, "run");

    match cli.output {
        Output::Human => print!("{}", rl.to_yaml()?),
        Output::Json => println!("{}", serde_json::to_string_pretty(&rl)?),
    }
    if report.aborted() {
        bail!("run aborted: {}", rl.results.first().map(|r| r.message.as_str()).unwrap_or("unknown error"));
    }
    if rl.has_errors() {
        warn!(failures = report.instance_failures, "run finished with errors");
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Inspect { file } => inspect(&cli, file.as_deref()),
        Commands::Run { file } => run(&cli, file.as_deref()),
    }
}
