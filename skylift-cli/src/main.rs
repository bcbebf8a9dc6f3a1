use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use similar::{ChangeTag, TextDiff};

use skylift_aws::certificate::Certificates;
use skylift_aws::config::{DEFAULT_PROJECT, ProcessEnv, SiteConfig};
use skylift_aws::lookups::{AcmRegistry, Route53Registry, load_sdk_config};
use skylift_aws::rewriter::{handle_request, render_handler_source, rewrite_uri};
use skylift_aws::{Site, compose_graph, compose_site, verify_bucket_isolation};
use skylift_core::engine::{Action, Engine, PROGRAM_FILE, PulumiEngine, write_program};
use skylift_core::lookup::{AMAZON_ISSUED, CertificateSummary, HostedZone};
use skylift_core::resource::ResourceKind;

#[derive(Parser)]
#[command(name = "skylift")]
#[command(about = "Compose and deploy a static site with an API on AWS", long_about = None)]
struct Cli {
    /// Stack name
    #[arg(long, global = true, default_value = "dev")]
    stack: String,

    /// Project namespace for un-prefixed configuration keys
    #[arg(long, global = true, default_value = DEFAULT_PROJECT)]
    project: String,

    /// Stack configuration file [default: Pulumi.<stack>.yaml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip AWS lookups; requires --certificate-arn and --zone-id
    #[arg(long, global = true)]
    offline: bool,

    /// Viewer certificate ARN used with --offline
    #[arg(long, global = true)]
    certificate_arn: Option<String>,

    /// Load balancer certificate ARN used with --offline [default: --certificate-arn]
    #[arg(long, global = true)]
    api_certificate_arn: Option<String>,

    /// Hosted zone id used with --offline
    #[arg(long, global = true)]
    zone_id: Option<String>,

    /// Engine executable
    #[arg(long, global = true, default_value = "pulumi")]
    engine: String,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the stack and check graph, schemas and bucket isolation
    Validate,
    /// Write the engine program
    Synth {
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Show diff against the existing program
        #[arg(long)]
        diff: bool,
    },
    /// Print resources in dependency order
    Graph,
    /// Show the changes the engine would make
    Preview {
        /// Output directory for the program
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Create or update the stack
    Up {
        /// Output directory for the program
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Skip the engine's confirmation prompt
        #[arg(long)]
        auto_approve: bool,
    },
    /// Destroy every resource in the stack
    Destroy {
        /// Output directory for the program
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Run the edge URI rewriter locally
    Rewrite {
        /// Request URIs to rewrite
        uris: Vec<String>,

        /// CloudFront origin-request event (JSON file) to process instead
        #[arg(long)]
        event: Option<PathBuf>,

        /// Print the deployed handler source
        #[arg(long)]
        source: bool,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Validate => run_validate(&cli).await,
        Commands::Synth { out, diff } => run_synth(&cli, out, *diff).await,
        Commands::Graph => run_graph(&cli).await,
        Commands::Preview { out } => run_engine(&cli, out, Action::Preview, false).await,
        Commands::Up { out, auto_approve } => {
            run_engine(&cli, out, Action::Up, *auto_approve).await
        }
        Commands::Destroy { out, auto_approve } => run_destroy(&cli, out, *auto_approve).await,
        Commands::Rewrite {
            uris,
            event,
            source,
        } => run_rewrite(uris, event.as_deref(), *source),
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "skylift", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("Pulumi.{}.yaml", cli.stack)))
}

fn load_config(cli: &Cli) -> Result<SiteConfig, String> {
    let path = config_path(cli);
    SiteConfig::load(&path, &cli.project, &ProcessEnv)
        .map_err(|e| format!("Failed to load {}: {}", path.display(), e))
}

fn offline_inputs(cli: &Cli, config: &SiteConfig) -> Result<(Certificates, HostedZone), String> {
    let certificate = |arn: &str| CertificateSummary {
        arn: arn.to_string(),
        domain_name: config.domain.clone(),
        certificate_type: AMAZON_ISSUED.to_string(),
        issued_at: None,
    };

    let cdn = cli
        .certificate_arn
        .as_deref()
        .ok_or("--offline requires --certificate-arn")?;
    let api = cli.api_certificate_arn.as_deref().unwrap_or(cdn);
    let zone_id = cli.zone_id.as_deref().ok_or("--offline requires --zone-id")?;

    Ok((
        Certificates {
            cdn: certificate(cdn),
            api: certificate(api),
        },
        HostedZone {
            id: zone_id.to_string(),
            name: format!("{}.", config.domain),
            private: false,
        },
    ))
}

async fn compose(cli: &Cli) -> Result<(SiteConfig, Site), String> {
    let config = load_config(cli)?;

    let composed = if cli.offline {
        let (certificates, zone) = offline_inputs(cli, &config)?;
        compose_graph(&cli.stack, &config, &certificates, &zone)
    } else {
        println!(
            "{}",
            format!("Looking up certificates and zone for {}", config.domain).cyan()
        );
        let sdk = load_sdk_config(&config.region).await;
        let certificates = AcmRegistry::new(sdk.clone());
        let zones = Route53Registry::new(&sdk);
        compose_site(&cli.stack, &config, &certificates, &zones).await
    };
    let site = composed.map_err(|e| e.to_string())?;

    Ok((config, site))
}

async fn run_validate(cli: &Cli) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    let (config, site) = compose(cli).await?;
    verify_bucket_isolation(&site).map_err(|e| e.to_string())?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully for {}.",
            site.stack.len(),
            config.domain_name()
        )
        .green()
        .bold()
    );

    for resource in site.stack.resources() {
        println!("  • {}", resource.id);
    }

    Ok(())
}

async fn synthesize(cli: &Cli, out: &Path, show_diff: bool) -> Result<Site, String> {
    let (_, site) = compose(cli).await?;
    let program = site.program(&cli.project).map_err(|e| e.to_string())?;

    if show_diff {
        let path = out.join(PROGRAM_FILE);
        let existing = fs::read_to_string(&path).unwrap_or_default();
        let rendered = program.to_yaml().map_err(|e| e.to_string())?;
        if existing == rendered {
            println!("{}", "Program is up-to-date.".green());
        } else {
            print_diff(&path, &existing, &rendered);
        }
    }

    let path = write_program(out, &program)
        .await
        .map_err(|e| e.to_string())?;
    println!("{} {}", "Wrote".green(), path.display());
    Ok(site)
}

async fn run_synth(cli: &Cli, out: &Path, show_diff: bool) -> Result<(), String> {
    let site = synthesize(cli, out, show_diff).await?;
    println!(
        "{}",
        format!("{} resources, {} outputs.", site.stack.len(), site.outputs.len())
            .green()
            .bold()
    );
    Ok(())
}

async fn run_graph(cli: &Cli) -> Result<(), String> {
    let (_, site) = compose(cli).await?;
    let graph = site.stack.dependency_graph();
    let ordered = site.stack.ordered().map_err(|e| e.to_string())?;

    println!("{}", "Dependency Order:".cyan().bold());
    println!();
    for resource in ordered {
        let marker = match resource.kind {
            ResourceKind::Provider => "◆".magenta(),
            ResourceKind::DataSource => "?".yellow(),
            ResourceKind::Component => "▣".blue(),
            ResourceKind::Custom => "•".normal(),
        };
        println!(
            "{} {} {}",
            marker,
            resource.binding.bold(),
            format!("({})", resource.id).dimmed()
        );
        for dependency in graph.dependencies_of(&resource.binding) {
            println!("    {} {} [{}]", "←".dimmed(), dependency.target, dependency.kind);
        }
    }
    Ok(())
}

async fn run_engine(cli: &Cli, out: &Path, action: Action, auto_approve: bool) -> Result<(), String> {
    synthesize(cli, out, false).await?;

    println!(
        "{}",
        format!("Running {} {} on stack {}...", cli.engine, action.command(), cli.stack)
            .cyan()
            .bold()
    );
    PulumiEngine::new(&cli.stack)
        .with_binary(&cli.engine)
        .with_auto_approve(auto_approve)
        .run(action, out)
        .await
        .map_err(|e| e.to_string())?;

    println!("{}", format!("✓ {} complete.", action.command()).green().bold());
    Ok(())
}

async fn run_destroy(cli: &Cli, out: &Path, auto_approve: bool) -> Result<(), String> {
    if !auto_approve {
        println!(
            "{}",
            format!("Do you really want to destroy stack '{}'?", cli.stack)
                .yellow()
                .bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        io::Write::flush(&mut io::stdout()).map_err(|e| e.to_string())?;

        let mut input = String::new();
        io::stdin().read_line(&mut input).map_err(|e| e.to_string())?;

        if input.trim() != "yes" {
            println!();
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    // Confirmed here; the engine must not ask again
    run_engine(cli, out, Action::Destroy, true).await
}

fn run_rewrite(uris: &[String], event: Option<&Path>, source: bool) -> Result<(), String> {
    if source {
        print!("{}", render_handler_source());
        return Ok(());
    }

    if let Some(path) = event {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let event: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| format!("Invalid event {}: {}", path.display(), e))?;
        let request = handle_request(&event);
        let rendered = serde_json::to_string_pretty(&request).map_err(|e| e.to_string())?;
        println!("{}", rendered);
        return Ok(());
    }

    if uris.is_empty() {
        return Err("Nothing to rewrite; pass URIs or --event".to_string());
    }

    for uri in uris {
        let rewritten = rewrite_uri(uri);
        if &rewritten == uri {
            println!("  {} {}", "=".normal(), uri);
        } else {
            println!("  {} {} → {}", "~".yellow().bold(), uri, rewritten.green());
        }
    }
    Ok(())
}

fn print_diff(file: &Path, existing: &str, rendered: &str) {
    println!("\n{} {}:", "Diff for".cyan().bold(), file.display());

    let diff = TextDiff::from_lines(existing, rendered);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-".red(),
            ChangeTag::Insert => "+".green(),
            ChangeTag::Equal => " ".normal(),
        };
        print!("{}{}", sign, change);
    }
}
