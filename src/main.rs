use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::{Context, Result, anyhow};
use env_logger::Env;
use log::info;
use scene_director::{
    config::Settings,
    llm::{ModelTask, ScriptedModel},
    pipeline::Director,
    protocol::SceneResponse,
    ws,
};

#[derive(Debug, Default, Clone)]
struct Cli {
    prompt: Option<String>,
    max_iterations: Option<u32>,
    config: Option<PathBuf>,
    plan_json: Option<PathBuf>,
    json: bool,
    serve: bool,
    addr: Option<String>,
}

const USAGE: &str = "supported: --prompt <text>, --max-iterations <n>, --config <file.toml>, \
--plan-json <plan.json>, --json, --serve, --addr <host:port>";

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        let next = args.get(i + 1).cloned();
        let value = |name: &str| next.clone().ok_or_else(|| anyhow!("missing value for {name}"));
        match args[i].as_str() {
            "--prompt" => {
                cli.prompt = Some(value("--prompt")?);
                i += 2;
            }
            "--max-iterations" => {
                let v = value("--max-iterations")?;
                cli.max_iterations = Some(
                    v.parse()
                        .with_context(|| format!("--max-iterations must be an integer, got '{v}'"))?,
                );
                i += 2;
            }
            "--config" => {
                cli.config = Some(PathBuf::from(value("--config")?));
                i += 2;
            }
            "--plan-json" => {
                cli.plan_json = Some(PathBuf::from(value("--plan-json")?));
                i += 2;
            }
            "--addr" => {
                cli.addr = Some(value("--addr")?);
                i += 2;
            }
            "--json" => {
                cli.json = true;
                i += 1;
            }
            "--serve" => {
                cli.serve = true;
                i += 1;
            }
            other => return Err(anyhow!("unknown argument: {other} ({USAGE})")),
        }
    }
    if !cli.serve && cli.prompt.is_none() {
        return Err(anyhow!("either --prompt or --serve is required ({USAGE})"));
    }
    Ok(cli)
}

fn run_once(director: &Director, cli: &Cli) -> Result<()> {
    let prompt = cli.prompt.as_deref().unwrap_or_default();
    let max = cli
        .max_iterations
        .unwrap_or(director.settings().pipeline.default_max_iterations);

    let started = Instant::now();
    let record = director.run(prompt, max);
    let response = SceneResponse::from_record(&record, started.elapsed().as_millis() as u64);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if let Some(report) = &response.report {
        println!("{report}");
    } else {
        println!("scene {} ended {:?}", response.scene_id, response.status);
        for e in &response.errors {
            println!("error: {e}");
        }
    }
    info!(
        "[cli] scene {} finished in {} ms",
        response.scene_id, response.elapsed_ms
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(addr) = &cli.addr {
        settings.server.addr = addr.clone();
    }
    let addr = settings.server.addr.clone();
    let mut director = Director::offline(settings)?;

    // A plan file stands in for the language model's decomposition.
    if let Some(path) = &cli.plan_json {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read --plan-json file {}", path.display()))?;
        director = director.with_model(Arc::new(ScriptedModel::new().with_response(ModelTask::Plan, text)));
    }

    if cli.serve {
        let handle = ws::spawn_ws_server(&addr, director)?;
        handle
            .join()
            .map_err(|_| anyhow!("ws server thread panicked"))?;
        return Ok(());
    }

    run_once(&director, &cli)
}
