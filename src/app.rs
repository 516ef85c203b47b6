//! Command dispatch: wires config → memory stack → agent pipeline, then runs
//! the requested surface (REPL, gateway, or memory operator commands).

use crate::agent::{ChatMessage, ConversationTurn, IntentDetector};
use crate::cli::{Cli, Command, MemoryCommand};
use crate::config::Config;
use crate::gateway::{self, GatewayState};
use crate::memory::{
    MemoryCandidate, MemoryClassifier, MemoryScope, MemoryStack, MemoryType, create_memory_stack,
};
use crate::prompt::PromptBuilder;
use crate::providers::create_provider;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Exchanges kept when folding REPL history into the next request.
const HISTORY_WINDOW: usize = 20;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Command::Chat { user } => run_chat(&config, &user).await,
        Command::Serve { port } => run_serve(config, port).await,
        Command::Memory { command } => run_memory(&config, command).await,
    }
}

fn build_turn(config: &Config, stack: &MemoryStack) -> Result<Arc<ConversationTurn>> {
    let provider = create_provider(
        &config.default_provider,
        config.resolved_api_key().as_deref(),
    )?;

    let classifier = config.agents.extraction_enabled.then(|| {
        MemoryClassifier::new(
            provider.clone(),
            config.agents.utility_model.clone(),
            config.agents.max_candidates_per_turn,
        )
    });
    let intent_detector = config
        .agents
        .intent_detection
        .then(|| IntentDetector::new(provider.clone(), config.agents.utility_model.clone()));

    let prompt_builder =
        PromptBuilder::new(config.persona.clone()).context("build prompt templates")?;

    Ok(Arc::new(ConversationTurn::new(
        provider,
        stack.retriever.clone(),
        stack.writer.clone(),
        stack.repository.clone(),
        classifier,
        intent_detector,
        prompt_builder,
        config.agents.chat_model.clone(),
        config.agents.chat_temperature,
        config.memory.retrieve_limit,
        config.memory.hive_mind_enabled,
    )))
}

async fn run_chat(config: &Config, user: &str) -> Result<()> {
    let stack = create_memory_stack(config).await?;
    let turn = build_turn(config, &stack)?;

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ChatMessage> = Vec::new();

    stdout
        .write_all(format!("{} is listening. Type 'exit' to leave.\n", config.persona.name).as_bytes())
        .await?;

    loop {
        stdout.write_all(b"you> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "exit" | "quit") {
            break;
        }

        match turn.process(user, message, &history).await {
            Ok(outcome) => {
                stdout
                    .write_all(format!("{}> {}\n", config.persona.name, outcome.response).as_bytes())
                    .await?;

                history.push(ChatMessage {
                    role: "user".into(),
                    content: message.to_string(),
                });
                history.push(ChatMessage {
                    role: "assistant".into(),
                    content: outcome.response,
                });
                if history.len() > HISTORY_WINDOW * 2 {
                    let excess = history.len() - HISTORY_WINDOW * 2;
                    history.drain(..excess);
                }
            }
            Err(e) => {
                stdout
                    .write_all(format!("error: {e}\n").as_bytes())
                    .await?;
            }
        }
    }

    Ok(())
}

async fn run_serve(config: Config, port: Option<u16>) -> Result<()> {
    let stack = create_memory_stack(&config).await?;
    let turn = build_turn(&config, &stack)?;

    let mut gateway_config = config.gateway.clone();
    if let Some(port) = port {
        gateway_config.port = port;
    }

    let state = Arc::new(GatewayState {
        turn,
        repository: stack.repository.clone(),
    });
    gateway::serve(state, &gateway_config).await
}

async fn run_memory(config: &Config, command: MemoryCommand) -> Result<()> {
    let stack = create_memory_stack(config).await?;

    match command {
        MemoryCommand::Status { user } => {
            let (structured, vector) = stack.repository.health_check().await;
            println!("structured store: {}", if structured { "ok" } else { "unavailable" });
            println!(
                "vector index ({}): {}",
                stack.repository.index_name(),
                if vector { "ok" } else { "unavailable" }
            );
            println!(
                "hive-mind memories: {}",
                stack.repository.count(MemoryScope::Hive, None).await?
            );
            if let Some(user) = user {
                println!(
                    "personal memories for {user}: {}",
                    stack
                        .repository
                        .count(MemoryScope::Personal, Some(&user))
                        .await?
                );
            }
        }
        MemoryCommand::Recall {
            user,
            query,
            hive,
            limit,
        } => {
            let (scope, owner) = if hive {
                (MemoryScope::Hive, None)
            } else {
                (MemoryScope::Personal, Some(user.as_str()))
            };
            let memories = stack.retriever.retrieve(&query, scope, owner, limit).await?;
            if memories.is_empty() {
                println!("no memories found");
            }
            for memory in memories {
                let similarity = memory
                    .similarity
                    .map_or_else(|| "  -  ".to_string(), |s| format!("{s:.3}"));
                println!(
                    "{:.3}  {}  [{}] {}",
                    memory.recency, similarity, memory.node.memory_type, memory.node.content
                );
            }
        }
        MemoryCommand::Remember {
            user,
            content,
            memory_type,
            tag,
        } => {
            let memory_type = parse_memory_type(&memory_type)?;
            let ids = stack
                .writer
                .remember(
                    Some(&user),
                    vec![MemoryCandidate {
                        content,
                        memory_type,
                        tags: tag,
                    }],
                    false,
                    "manual",
                )
                .await;
            match ids.first() {
                Some(id) => println!("remembered: {id}"),
                None => anyhow::bail!("memory was not stored (embedding unavailable?)"),
            }
        }
        MemoryCommand::Share {
            user,
            content,
            memory_type,
        } => {
            let memory_type = parse_memory_type(&memory_type)?;
            match stack
                .writer
                .share(Some(&user), &content, memory_type, Vec::new())
                .await
            {
                Some(id) => println!("shared with the hive mind: {id}"),
                None => anyhow::bail!("memory was not stored (embedding unavailable?)"),
            }
        }
    }

    Ok(())
}

fn parse_memory_type(value: &str) -> Result<MemoryType> {
    value.parse::<MemoryType>().map_err(|_| {
        anyhow::anyhow!(
            "invalid memory type \"{value}\" (expected one of: personal_identity, preference, \
             factual, emotional_state)"
        )
    })
}
