//! DSL Speed Observer - Main CLI Application
//!
//! Discovers speedtest servers, picks the best ones by latency, and measures
//! download and upload throughput against each.

use clap::Parser;
use dsl_speed_observer::{
    cli::Cli,
    config::{display_config_summary, load_config, EnvManager},
    discovery::{HttpDiscovery, ServerDiscovery},
    engine::{evaluate_exit_policy, SessionOrchestrator},
    error::{AppError, Result},
    logging::LoggerFactory,
    output::{stdout_writer, ConsoleObserver, OutputCoordinator, OutputFormatterFactory},
    transport::HttpTransport,
    BUILD_TIME, GIT_COMMIT, PKG_NAME, VERSION,
};
use std::{path::Path, process, sync::Arc};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    let cli = Cli::parse();
    let use_color = cli.use_colors();

    if let Err(e) = run_application(cli).await {
        eprintln!("{}", e.format_for_console(use_color));

        let friendly = e.user_friendly_message();
        if friendly != e.to_string() {
            eprintln!();
            eprintln!("{}", friendly);
        }

        process::exit(e.exit_code());
    }
}

/// Main application logic
async fn run_application(cli: Cli) -> Result<()> {
    if cli.debug {
        eprintln!("{} v{} ({}, built {})", PKG_NAME, VERSION, GIT_COMMIT, BUILD_TIME);
        eprintln!("{}", cli.get_config_summary());
    }

    if cli.env_help {
        print!("{}", EnvManager::env_report(Path::new(".env"))?);
        return Ok(());
    }

    if cli.init_env {
        let path = Path::new(".env.example");
        EnvManager::save_example_env_file(path)?;
        println!("Wrote {}; copy it to .env and edit as needed", path.display());
        return Ok(());
    }

    let config = load_config(cli)?;

    if config.debug {
        eprintln!("Configuration loaded successfully:");
        eprintln!("{}", display_config_summary(&config));
        eprintln!();
    }

    let loggers = LoggerFactory::new(config.clone());
    let logger = loggers.create_logger("MAIN").await;
    logger
        .debug("Run started")
        .field("session_id", loggers.session_id())
        .field("mode", format!("{:?}", config.mode()))
        .log()
        .await;

    let coordinator = OutputCoordinator::from_config(&config);
    let discovery = HttpDiscovery::new(&config, loggers.create_logger("DISCOVERY").await)?;

    let user_info = match discovery.fetch_user_info().await {
        Ok(user) => Some(user),
        Err(e) => {
            logger.warn("Client config unavailable").error_info(&e).log().await;
            let warning = coordinator.render_user_warning(&config.config_url);
            if coordinator.is_json() {
                eprintln!("{}", warning);
            } else {
                println!("{}", warning);
            }
            None
        }
    };

    if let Some(preamble) = coordinator.render_user(user_info.as_ref()) {
        println!("{}", preamble);
    }

    let candidates = discovery.fetch_servers(user_info.as_ref()).await?;

    if config.list_only {
        print!("{}", coordinator.render_candidates(&candidates)?);
        if coordinator.is_json() {
            println!();
        }
        return Ok(());
    }

    if !config.json_output {
        print!("{}", coordinator.render_candidates(&candidates)?);
    }

    let transport = Arc::new(HttpTransport::new(&config)?);
    let mut orchestrator =
        SessionOrchestrator::new(&config, transport, loggers.create_logger("SESSION").await);

    if !config.json_output {
        let observer = ConsoleObserver::new(OutputFormatterFactory::from_config(&config), stdout_writer());
        orchestrator = orchestrator.with_observer(Arc::new(observer));
    }

    let report = orchestrator.run(&candidates, user_info).await?;

    let output = coordinator.render_report(&report)?;
    if !output.is_empty() {
        println!("{}", output);
    }

    let outcome = evaluate_exit_policy(config.exit_policy, &report);
    if let Err(AppError::SessionsFailed { failed, total }) = &outcome {
        logger
            .debug("Exit policy rejected run")
            .field("failed", failed)
            .field("total", total)
            .log()
            .await;
    }
    outcome
}
