//! Slash - 命令行对话入口
//!
//! 初始化日志与配置，加载 manifest 目录，组装编排器后进入 REPL。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use crossterm::style::Stylize;
use slash::actions::{ActionDispatcher, EnvSecretStore, HttpActionClient, ProcessCodeRuntime};
use slash::config::load_config;
use slash::core::{parse_input, run_command, AgentSwitcher, Input, Orchestrator, TurnEvent, ONELINE_HELP};
use slash::llm::{create_embedder_from_config, OpenAiChatModel};
use slash::manifest::ManifestRegistry;
use slash::memory::{ContextAugmenter, FileConversationLog, LocalIndexFactory, MemoizedTokenCounter, TokenEstimator};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let registry = ManifestRegistry::load_dir(&cfg.app.manifests_dir, &cfg.app.base_dir)
        .with_context(|| format!("Failed to load manifests from {}", cfg.app.manifests_dir.display()))?;

    let switcher = AgentSwitcher::new(registry, cfg.llm.catalog())
        .with_log(Arc::new(FileConversationLog::new(&cfg.app.log_dir)))
        .with_vector_factory(Arc::new(LocalIndexFactory::new(&cfg.embeddings.index_dir)));

    let dispatcher = ActionDispatcher::new(
        HttpActionClient::new(cfg.actions.http_timeout_secs),
        Arc::new(EnvSecretStore::new(cfg.actions.secret_prefix.clone())),
        cfg.app.base_dir.clone(),
    )
    .with_runtime(Arc::new(ProcessCodeRuntime::new(
        cfg.actions.python.clone(),
        cfg.actions.code_timeout_secs,
    )));

    let model = Arc::new(OpenAiChatModel::new(
        cfg.llm.base_url.as_deref(),
        cfg.llm.request_timeout_secs,
    ));

    let mut orch = Orchestrator::new(switcher, model, dispatcher, &cfg.app.default_agent)
        .with_context(|| format!("Failed to start agent {}", cfg.app.default_agent))?
        .with_manifest_sets(cfg.app.manifest_sets.clone())
        .with_verbose(cfg.app.verbose);

    match create_embedder_from_config(cfg.llm.base_url.as_deref(), &cfg.embeddings.model) {
        Some(embedder) => {
            let counter = Arc::new(MemoizedTokenCounter::new(TokenEstimator, 4096));
            orch = orch.with_augmenter(ContextAugmenter::new(embedder, counter).with_top_k(cfg.embeddings.top_k));
        }
        None => tracing::info!("embeddings disabled (no OPENAI_API_KEY)"),
    }

    print_activation(&orch);
    repl(&mut orch).await
}

async fn repl(orch: &mut Orchestrator) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let you = orch.session().manifest().you.clone();
        stdout.write_all(format!("{} ", format!("{you}:").bold()).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => println!("{}", ONELINE_HELP.cyan()),
            Input::Message(text) => print_events(&orch.handle_input(&text).await),
            Input::Command(command) => {
                let output = run_command(orch, command).await;
                for line in &output.lines {
                    println!("{}", line.as_str().cyan());
                }
                print_events(&output.events);
                if output.quit {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_activation(orch: &Orchestrator) {
    let session = orch.session();
    println!("{}", format!("Activating: {}", session.manifest().title).blue());
    if let Some(intro) = session.intro_message() {
        println!("{}", format!("{}: {}", session.manifest().bot, intro).green());
    }
}

fn print_events(events: &[TurnEvent]) {
    for event in events {
        match event {
            TurnEvent::Assistant { bot, text } => println!("{}", format!("{bot}: {text}").green()),
            TurnEvent::FunctionResult { name, text } | TurnEvent::FoldedResult { name, text } => {
                println!("{}", format!("{name}(): {text}").blue())
            }
            TurnEvent::RuntimeMessage { text } => println!("{}", text.as_str().dark_grey()),
            TurnEvent::Emitted { method, data } => println!("{}", format!("emit {method}: {data}").magenta()),
            TurnEvent::Switched { agent_key } => println!("{}", format!("Switched to {agent_key}").blue()),
            TurnEvent::Reset { agent_key, error } => {
                println!("{}", format!("Error: {error}. Session {agent_key} restarted.").red())
            }
        }
    }
}
