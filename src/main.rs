mod cli;

use segtrim::{config, extract};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "segtrim=trace,st_pipeline=trace,st_engine=trace,st_core=trace".to_string()
        } else {
            "segtrim=info,st_pipeline=info,st_engine=warn,st_core=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e
                .downcast_ref::<st_core::Error>()
                .map_or(1, st_core::Error::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Extract {
            input,
            segments,
            output_dir,
            duration,
            overwrite,
            keep_going,
            json,
        } => {
            let request = extract::ExtractRequest {
                input,
                segments,
                duration,
                output_dir,
                overwrite,
                keep_going,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(extract_segments(&request, cli.config.as_deref(), json))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, cli.config.as_deref(), json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("segtrim {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn extract_segments(
    request: &extract::ExtractRequest,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let total = request.segments.len();
    let report = extract::extract_file(config, request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "\nExtracted {} of {} segment(s)",
            report.emitted.len(),
            total
        );
        for failure in &report.failures {
            println!("  segment {} failed: {}", failure.index + 1, failure.error);
        }
    }

    if let Some(ref cleanup) = report.cleanup_error {
        tracing::warn!("Engine workspace was not fully cleaned up: {cleanup}");
    }

    match report.reason() {
        Some(reason) => anyhow::bail!("Extraction failed: {reason}"),
        None => Ok(()),
    }
}

async fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = st_engine::ToolRegistry::discover(&config.engine);
    let duration = st_engine::probe_duration(&tools, file).await?;

    let summary = st_core::SourceSummary {
        name: file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        byte_len: usize::try_from(std::fs::metadata(file)?.len()).unwrap_or(usize::MAX),
        duration: Some(duration),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("File: {}", file.display());
        println!("Size: {} bytes", summary.byte_len);
        println!(
            "Duration: {} ({:.3} s)",
            st_core::format_time(duration),
            duration
        );
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = st_engine::ToolRegistry::discover(&config.engine).check_all();
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
        println!("Some tools are missing. Install ffmpeg to extract segments.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let path = path.map(Path::to_path_buf).or_else(config::find_config);

    let config = match path {
        Some(ref p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Failure policy: {:?}", config.pipeline.failure_policy);
    println!("  Clear on failure: {}", config.pipeline.clear_on_failure);
    println!("  Placeholder segments: {}", config.pipeline.default_segment_count);
    println!("  Output dir: {}", config.output.dir.display());
    println!("  Exec timeout: {}s", config.engine.exec_timeout_secs);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("  Warnings: {}", warnings.len());
        for warning in &warnings {
            println!("    - {warning}");
        }
    }

    Ok(())
}
