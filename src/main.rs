use iedp::cli::{Cli, Commands, ConfigAction};
use iedp::config::{expand_path, Config};
use iedp::document::{load_document, FragmentSummary};
use iedp::engine::Engine;
use iedp::error::{IedpError, Result};
use iedp::logging::{init_logging, parse_level};
use iedp::orchestrator::{Task, TaskReport};
use iedp::retrieval::Query;
use iedp::server::{self, AppState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| IedpError::Io {
            source: e,
            context: "Failed to start async runtime".to_string(),
        })
        .and_then(|runtime| runtime.block_on(run(cli)));

    if let Err(e) = result {
        print_error(&e);
        std::process::exit(e.exit_code());
    }
}

fn print_error(e: &IedpError) {
    match e {
        IedpError::Task(task) => eprintln!("error [{}]: {}", task.kind, task.message),
        other => match other.kind() {
            Some(kind) => eprintln!("error [{}]: {}", kind, other),
            None => eprintln!("error: {}", other),
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let (config, found) = load_config(&config_path, cli.env.as_deref())?;

    let level = if cli.verbose {
        "DEBUG"
    } else {
        config.app.log_level.as_str()
    };
    init_logging(level, config.log_file()?.as_ref())?;

    if !found {
        tracing::warn!(
            "Config file {} not found, using defaults. Run 'iedp init' to create one.",
            config_path.display()
        );
    }

    match cli.command {
        Commands::Init { log_level, force } => cmd_init(&config_path, config, log_level, force),
        Commands::Analyze {
            document_path,
            query,
            json,
        } => cmd_analyze(&config, &document_path, query, json).await,
        Commands::ProcessBatch { limit, dir, json } => {
            cmd_process_batch(&config, limit, dir, json).await
        }
        Commands::Retrieve { query, limit, json } => {
            cmd_retrieve(&config, query, limit, json).await
        }
        Commands::Serve { host, port } => cmd_serve(&config, host, port).await,
        Commands::Config { action } => cmd_config(&config_path, &config, action),
    }
}

/// Load the config file, or defaults when it does not exist
fn load_config(path: &Path, profile: Option<&str>) -> Result<(Config, bool)> {
    if path.exists() {
        Ok((Config::load_with_profile(path, profile)?, true))
    } else {
        Ok((Config::default().resolve(profile)?, false))
    }
}

fn data_dir(config: &Config) -> PathBuf {
    expand_path(&config.paths.data_dir)
}

fn cmd_init(
    config_path: &Path,
    mut config: Config,
    log_level: Option<String>,
    force: bool,
) -> Result<()> {
    if let Some(level) = log_level {
        if parse_level(&level).is_none() {
            return Err(IedpError::InvalidConfigValue {
                path: "app.log_level".to_string(),
                message: format!("Unknown log level '{}'", level),
            });
        }
        config.app.log_level = level.to_uppercase();
    }

    config.create_directories()?;
    println!("✓ Directories ready");
    println!("  - data:   {}", expand_path(&config.paths.data_dir).display());
    println!("  - models: {}", expand_path(&config.paths.models_dir).display());
    println!("  - cache:  {}", expand_path(&config.paths.cache_dir).display());

    if config_path.exists() && !force {
        println!("Configuration file already exists at: {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    config.save(config_path)?;
    println!("✓ Configuration initialized at: {}", config_path.display());
    Ok(())
}

async fn cmd_analyze(
    config: &Config,
    document_path: &Path,
    query: Option<String>,
    json: bool,
) -> Result<()> {
    let document = load_document(document_path)?;
    let document_id = document.id.clone();
    let engine = Engine::build(config, vec![document]).await?;

    let query = query.unwrap_or_default();
    let description = if query.trim().is_empty() {
        format!("Analyze document {}", document_id)
    } else {
        query.clone()
    };
    let task = Task::new(description)
        .with("document_id", document_id)
        .with("query", query);

    let report = engine.dispatch(task).await;
    if json {
        print_json(&report)?;
    } else if report.is_done() {
        println!("{}", report.result.insight);
        if let Some(extracted) = &report.result.extracted {
            print_json(extracted)?;
        }
        println!(
            "\n(confidence {:.2}, {} fragment(s), {} ms)",
            report.result.confidence,
            report.result.fragments.len(),
            report.metadata.elapsed_ms
        );
    }

    report.into_result()?;
    Ok(())
}

async fn cmd_process_batch(
    config: &Config,
    limit: Option<usize>,
    dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let dir = dir.map(|d| expand_path(&d)).unwrap_or_else(|| data_dir(config));
    let engine = Arc::new(Engine::from_directory(config, &dir, limit).await?);

    let ids: Vec<String> = engine.corpus().documents().map(|d| d.id.clone()).collect();
    if ids.is_empty() {
        println!("No documents found in {}", dir.display());
        return Ok(());
    }

    let mut tasks = JoinSet::new();
    for (position, id) in ids.iter().enumerate() {
        let engine = engine.clone();
        let task = Task::new(format!("Summarize document {}", id))
            .with("document_id", id.clone())
            .with("query", "");
        tasks.spawn(async move { (position, engine.dispatch(task).await) });
    }

    let mut reports: Vec<Option<TaskReport>> = vec![None; ids.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, report)) => reports[position] = Some(report),
            Err(e) => tracing::error!("Batch task aborted: {}", e),
        }
    }

    let reports: Vec<(String, TaskReport)> = ids
        .into_iter()
        .zip(reports)
        .filter_map(|(id, report)| report.map(|r| (id, r)))
        .collect();

    if json {
        let list: Vec<&TaskReport> = reports.iter().map(|(_, r)| r).collect();
        print_json(&list)?;
    } else {
        for (id, report) in &reports {
            match report.error() {
                None => println!("✓ {}: {}", id, report.result.insight),
                Some(e) => println!("✗ {}: error [{}]: {}", id, e.kind, e.message),
            }
        }
    }

    let failed = reports.iter().filter(|(_, r)| !r.is_done()).count();
    if !json {
        println!(
            "\nProcessed {} document(s): {} done, {} failed",
            reports.len(),
            reports.len() - failed,
            failed
        );
    }

    match reports.into_iter().find_map(|(_, r)| r.metadata.error) {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

async fn cmd_retrieve(
    config: &Config,
    query: String,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let engine = Engine::from_directory(config, &data_dir(config), None).await?;
    let limit = limit.unwrap_or(config.retrieval.k);

    let fragments = engine.retrieve(&Query::new(query.clone(), limit)).await?;
    let results: Vec<FragmentSummary> = fragments.iter().map(FragmentSummary::from).collect();

    if json {
        return print_json(&results);
    }

    if results.is_empty() {
        println!("No results for '{}'", query);
        return Ok(());
    }

    println!("Results for '{}':\n", query);
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>2}. [{:.4}] {} ({})",
            rank + 1,
            result.score,
            result.id,
            result.content_type
        );
        println!("    {}", result.preview.replace('\n', " "));
    }
    Ok(())
}

async fn cmd_serve(config: &Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let engine = Engine::from_directory(config, &data_dir(config), None).await?;
    let state = AppState::new(Arc::new(engine), config);

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    server::serve(state, &host, port).await
}

fn cmd_config(config_path: &Path, config: &Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let value = serde_json::to_value(config).map_err(|e| IedpError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            match section {
                Some(section) => {
                    let part = value.get(&section).ok_or_else(|| IedpError::InvalidConfigValue {
                        path: section.clone(),
                        message: "Unknown configuration section".to_string(),
                    })?;
                    print_json(part)?;
                }
                None => print_json(&value)?,
            }
        }
        ConfigAction::Validate { file } => {
            let path = file.unwrap_or_else(|| config_path.to_path_buf());
            if !path.exists() {
                return Err(IedpError::ConfigNotFound { path });
            }
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Environment: {}", config.app.env);
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                println!("Configuration file already exists at: {}", config_path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(config_path)?;
            println!("✓ Configuration initialized at: {}", config_path.display());
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| IedpError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}
