use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use vidplan::config::{self, PlannerConfig};
use vidplan::{
    Dimension, ProfileRegistry, SpoolEncoder, check_source, job, output, plan_profiles,
    resolve_source,
};

#[derive(Parser)]
#[command(name = "vidplan")]
#[command(about = "Plan video transcodes from profiles and operation chains")]
#[command(long_about = "\
Plan video transcodes from profiles and operation chains

vidplan resolves conversion profiles against a probed source dimension and
composes resize, crop, trim, watermark and format stages into a
deterministic encode plan. It prints the plan; it never runs the encoder.

Job files (TOML, or JSON with a .json extension):

  source = \"1920x1080\"
  profile = \"720p\"               # optional, applied first

  [[operations]]
  kind = \"crop\"                  # convert, resize, resize_to_width,
  x = 0                          # resize_to_height, crop, trim, watermark,
  y = 0                          # fit_within, scale_factor, fixed_width,
  width = 1080                   # fixed_height, exact, profile
  height = 1080

Run 'vidplan profiles' for the built-in presets and
'vidplan gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (stock defaults when absent)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every registered conversion profile
    Profiles,
    /// Resolve one profile against a source dimension
    Resolve {
        /// Source dimension, e.g. 1920x1080
        #[arg(long)]
        source: Dimension,
        /// Profile key, e.g. 720p
        #[arg(long)]
        profile: String,
    },
    /// Build and run the pipeline described by a job file
    Plan {
        /// Job file (.toml or .json)
        job: PathBuf,
        /// Print the committed request as JSON
        #[arg(long, conflicts_with = "ffmpeg")]
        json: bool,
        /// Print ffmpeg arguments for the committed request
        #[arg(long)]
        ffmpeg: bool,
        /// Input file name used in ffmpeg arguments
        #[arg(long, default_value = "input.mp4")]
        input: String,
        /// Output file name used in ffmpeg arguments
        #[arg(long, default_value = "output.mp4")]
        output: String,
        /// Fail when a watermark asset is unreadable instead of skipping it
        #[arg(long)]
        strict: bool,
        /// Hand the committed request to a spool directory
        #[arg(long)]
        spool: Option<PathBuf>,
    },
    /// Plan a source against several profiles in parallel
    PlanAll {
        /// Source dimension, e.g. 1920x1080
        #[arg(long)]
        source: Dimension,
        /// Profile keys (repeatable); all registered profiles when omitted
        #[arg(long = "profile")]
        profiles: Vec<String>,
        /// Print the committed requests as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Profiles => {
            let (_, registry) = load_registry(&cli.config)?;
            output::print_profiles(&registry);
        }
        Command::Resolve { source, profile } => {
            let (_, registry) = load_registry(&cli.config)?;
            let profile = registry.build(&profile)?;
            let resolution = resolve_source(source, &profile)?;
            output::print_resolution(&profile, source, &resolution);
        }
        Command::Plan {
            job,
            json,
            ffmpeg,
            input,
            output: output_file,
            strict,
            spool,
        } => {
            let (planner_config, registry) = load_registry(&cli.config)?;
            let spec = job::load_job(&job)?;
            let pipeline = spec.into_pipeline(&registry, planner_config.defaults.format)?;
            if strict {
                pipeline.validate_assets()?;
            }
            let request = match &spool {
                Some(dir) => pipeline.commit(&SpoolEncoder::new(dir))?,
                None => pipeline.plan(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&request)?);
            } else if ffmpeg {
                let args: Vec<String> = request
                    .to_ffmpeg_args(&input, &output_file)
                    .iter()
                    .map(|a| shell_quote(a))
                    .collect();
                println!("ffmpeg {}", args.join(" "));
            } else {
                output::print_plan(&pipeline.describe(), &request);
            }
        }
        Command::PlanAll {
            source,
            profiles,
            json,
        } => {
            check_source(source)?;
            let (planner_config, registry) = load_registry(&cli.config)?;
            init_thread_pool(&planner_config.processing);
            let keys: Vec<String> = if profiles.is_empty() {
                registry.keys().map(str::to_string).collect()
            } else {
                profiles
            };
            let plans = plan_profiles(source, &keys, &registry);
            if json {
                let map: serde_json::Map<String, serde_json::Value> = plans
                    .iter()
                    .map(|p| -> Result<(String, serde_json::Value), serde_json::Error> {
                        let value = match &p.result {
                            Ok(request) => serde_json::to_value(request)?,
                            Err(e) => serde_json::json!({ "error": e.to_string() }),
                        };
                        Ok((p.key.clone(), value))
                    })
                    .collect::<Result<_, serde_json::Error>>()?;
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                output::print_plan_all(source, &plans);
            }
            if plans.iter().any(|p| p.result.is_err()) {
                std::process::exit(1);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize env_logger. Default level is `warn`; each `-v` raises it.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of CPU cores: config can lower the count, never raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Load `config.toml` and build the registry with its custom profiles.
fn load_registry(
    path: &Path,
) -> Result<(PlannerConfig, ProfileRegistry), config::ConfigError> {
    let planner_config = config::load_config(path)?;
    let registry = planner_config.registry()?;
    Ok((planner_config, registry))
}

/// Single-quote an argument for display if a shell would split or expand it.
fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=+:,./@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
