mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use vidfit::{ConvergenceController, SessionHandle, SourceMedia};
use vidfit_av::{FfmpegEncoder, ToolRegistry};
use vidfit_core::config::Config;
use vidfit_core::events::{CallbackSink, ConversionReport};
use vidfit_core::media::{fmt_mb, fmt_secs, mime_for_extension};
use vidfit_core::ContainerFamily;
use vidfit_probe::{FfprobeProber, Mp4Prober, ProberStack};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidfit=trace,vidfit_av=trace,vidfit_probe=debug,vidfit_core=debug".to_string()
        } else {
            "vidfit=info,vidfit_av=info,vidfit_probe=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Convert {
            input,
            output,
            target_bytes,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_file(
                &input,
                output.as_deref(),
                target_bytes,
                cli.config.as_deref(),
            ))
        }
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::CheckTools => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vidfit {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn build_probers(config: &Config) -> ProberStack {
    let mut probers: Vec<Box<dyn vidfit_probe::MetadataProber>> = vec![Box::new(Mp4Prober::new())];
    if let Some(ffprobe) = FfprobeProber::discover(&config.tools) {
        probers.push(Box::new(ffprobe));
    }
    ProberStack::new(probers)
}

fn declared_mime_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    mime_for_extension(ext).to_string()
}

fn default_output_path(input: &Path, mime: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = ContainerFamily::from_mime(mime).extension();
    input.with_file_name(format!("{stem}.fit.{ext}"))
}

async fn convert_file(
    input: &Path,
    output: Option<&Path>,
    target_override: Option<u64>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load_or_default(config_path);

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let bytes = std::fs::read(input)?;
    let source = SourceMedia::new(bytes, declared_mime_for(input));
    let target = target_override.unwrap_or_else(|| config.conversion.target_bytes());

    let registry = Arc::new(ToolRegistry::discover(&config.tools));
    let encoder = Arc::new(FfmpegEncoder::new(registry));
    let probers = build_probers(&config);

    let sink = Arc::new(CallbackSink::new(
        |u| {
            let eta = match u.eta {
                Some(d) => format!("~{}", fmt_secs(d.as_secs_f64())),
                None => "estimating".to_string(),
            };
            eprintln!(
                "[attempt {}] {:>3.0}% ({} / {}) ETA {eta}",
                u.attempt,
                u.fraction * 100.0,
                fmt_secs(u.elapsed_source_secs),
                fmt_secs(u.total_source_secs),
            );
        },
        |report| match report {
            ConversionReport::Success { final_size_bytes } => {
                eprintln!("Finished: output {}", fmt_mb(final_size_bytes));
            }
            ConversionReport::Failure { last_size_bytes } => match last_size_bytes {
                Some(size) => eprintln!("Failed: best output was {}", fmt_mb(size)),
                None => eprintln!("Failed: no output produced"),
            },
        },
    ));

    let controller =
        ConvergenceController::new(encoder, probers, config.conversion.clone()).with_sink(sink);

    let handle = SessionHandle::new();
    let cancel_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancellation requested...");
            cancel_handle.cancel();
        }
    });

    println!(
        "Converting {} ({}) | target <= {}",
        input.display(),
        fmt_mb(std::fs::metadata(input)?.len()),
        fmt_mb(target)
    );

    let result = controller.convert(source, target, &handle).await?;

    let out_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input, &result.mime));
    std::fs::write(&out_path, &result.bytes)?;

    println!(
        "Done: {} | {} | {} attempt(s){}",
        out_path.display(),
        fmt_mb(result.size()),
        result.attempts,
        if result.passthrough {
            " (pass-through)"
        } else {
            ""
        }
    );

    Ok(())
}

fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = Config::load_or_default(config_path);
    let probers = build_probers(&config);
    let bytes = std::fs::read(file)?;
    let mime = declared_mime_for(file);
    let meta = vidfit_probe::probe_or_default(&probers, &bytes, &mime);

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
    } else {
        println!("File: {}", file.display());
        println!("Size: {} ({} bytes)", fmt_mb(bytes.len() as u64), bytes.len());
        println!("Declared mime: {mime}");
        if meta.is_unknown() {
            println!("Metadata: unavailable (probe failed)");
        } else {
            println!("Duration: {}", fmt_secs(meta.duration_secs));
            println!("Dimensions: {}x{}", meta.width, meta.height);
        }
    }

    Ok(())
}

async fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let registry = ToolRegistry::discover(&config.tools);
    let tools = registry.check_all().await;
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Conversion needs ffmpeg; probing degrades without ffprobe.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)?;
            let config = Config::from_toml(&contents)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("✓ Configuration is valid");
            } else {
                println!("Configuration parsed with {} warning(s):", warnings.len());
                for w in &warnings {
                    println!("  - {w}");
                }
            }
            println!(
                "  Target: {} (ceiling {} - margin {})",
                fmt_mb(config.conversion.target_bytes()),
                fmt_mb(config.conversion.max_bytes),
                fmt_mb(config.conversion.safety_bytes)
            );
            println!("  Max resolution: {}", config.conversion.max_resolution);
            println!("  Quality floor: {}", config.conversion.min_quality);
            println!("  Max attempts: {}", config.conversion.max_attempts);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!(
                "  Target: {} | max resolution {} | floor {}",
                fmt_mb(config.conversion.target_bytes()),
                config.conversion.max_resolution,
                config.conversion.min_quality
            );
        }
    }

    Ok(())
}
