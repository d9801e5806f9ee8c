// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.


mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Command, HELP};
use herald::{GeminiClient, GeminiConfig};
use llm_contracts::Role;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vista::{ChartOutcome, Figure, InsightPipeline, Session, VistaConfig, VistaError};

const CHART_DIR: &str = "dattavism-charts";

#[derive(Parser, Debug, Clone)]
#[command(name = "dattavism")]
#[command(about = "Ask an AI analyst about a CSV dataset, get suggested charts and a PDF report.")]
struct Cli {
    #[arg(long, default_value_t = false)]
    debug: bool,
    /// CSV file to load before the prompt opens.
    file: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let filter = if args.debug {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("debug,reqwest=info,hyper=info,h2=info,rustls=info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let gemini = GeminiConfig::from_env().context("Gemini configuration is incomplete")?;
    let client = GeminiClient::from_config(&gemini)?;
    info!(model = %gemini.model, "Starting Dattavism");
    let pipeline = InsightPipeline::new(Arc::new(client), gemini.model.clone(), VistaConfig::default())?;
    let mut session = Session::new();

    if let Some(file) = &args.file {
        load(&pipeline, &mut session, file);
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(e) = run(&pipeline, &mut session, command).await {
            report_error(&e);
        }
    }
    info!("Goodbye");
    Ok(())
}

fn prompt() -> Result<()> {
    print!("dattavism> ");
    std::io::stdout().flush()?;
    Ok(())
}

fn load(pipeline: &InsightPipeline, session: &mut Session, path: &Path) {
    match pipeline.load_csv_path(session, path) {
        Ok(()) => {
            if let Some(dataset) = &session.dataset {
                println!(
                    "Loaded {} ({} rows x {} columns)\n{}",
                    path.display(),
                    dataset.height(),
                    dataset.width(),
                    dataset.preview_text(5)
                );
            }
        }
        Err(e) => report_error(&e),
    }
}

async fn run(pipeline: &InsightPipeline, session: &mut Session, command: Command) -> vista::Result<()> {
    match command {
        Command::Load(path) => load(pipeline, session, &path),
        Command::Report => {
            pipeline.analyse(session).await?;
            println!("## Context\n{}\n", session.context.as_deref().unwrap_or_default());
            println!("{}", session.report.as_deref().unwrap_or_default());
        }
        Command::Charts => {
            let outcomes = pipeline.recommend_charts(session).await?;
            if outcomes.is_empty() {
                println!("The assistant did not suggest any usable charts.");
            }
            for outcome in &outcomes {
                show_outcome(outcome);
            }
        }
        Command::Chart(spec) => {
            let figure = pipeline.custom_chart(session, &spec)?;
            let path = save_svg(&figure, &format!("custom-{}", spec.type_tag().unwrap_or_default()));
            println!("{}", figure.title);
            print_saved(path);
        }
        Command::Ask(question) => {
            let mut stream = pipeline.ask(session, &question).await?;
            let mut answer = String::new();
            while let Some(fragment) = stream.next_fragment().await {
                let fragment = fragment?;
                print!("{fragment}");
                let _ = std::io::stdout().flush();
                answer.push_str(&fragment);
            }
            println!();
            session.record_turn(Role::Assistant, answer);
        }
        Command::Export(path) => {
            let written = pipeline.export(session, path)?;
            println!("Report written to {}", written.display());
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

fn show_outcome(outcome: &ChartOutcome) {
    println!("{}", outcome.caption());
    let reason = outcome.spec().reason.trim();
    if !reason.is_empty() {
        println!("  {reason}");
    }
    match (outcome.figure(), outcome.error()) {
        (Some(figure), _) => {
            print_saved(save_svg(figure, &format!("figure-{}", outcome.figure_number())));
        }
        (None, Some(error)) => println!("  Could not draw this chart: {error}"),
        (None, None) => {}
    }
}

fn save_svg(figure: &Figure, stem: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(CHART_DIR)?;
    let path = Path::new(CHART_DIR).join(format!("{stem}.svg"));
    std::fs::write(&path, &figure.svg)?;
    Ok(path)
}

fn print_saved(path: std::io::Result<PathBuf>) {
    match path {
        Ok(path) => println!("  saved {}", path.display()),
        Err(e) => warn!(error = %e, "Chart could not be saved"),
    }
}

fn report_error(error: &VistaError) {
    if error.is_recoverable() {
        warn!(category = error.category(), error = %error, "Action failed");
    } else {
        tracing::error!(category = error.category(), error = %error, "Action failed");
    }
    println!("{}", error.user_message());
    for suggestion in error.suggestions() {
        println!("  - {suggestion}");
    }
}
