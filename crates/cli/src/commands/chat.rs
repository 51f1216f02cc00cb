//! `llmcraft chat`: Interactive or single-message chat mode.

use llmcraft_agent::{AgentStreamEvent, Orchestrator};
use llmcraft_core::message::SessionId;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
    session: Option<String>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let orchestrator = llmcraft_gateway::build_orchestrator(&config, true).await?;
    let session_id = session.map(SessionId::from).unwrap_or_default();

    if let Some(msg) = message {
        // Single message mode
        return send(&orchestrator, &msg, &session_id, stream).await;
    }

    // Interactive mode
    println!();
    println!("  llmcraft chat: interactive mode");
    println!();
    println!("  Model:     {}", orchestrator.model());
    println!("  Session:   {session_id}");
    println!(
        "  Grounding: {}",
        if orchestrator.retrieval_ready() { "on" } else { "off" }
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt()?;
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        if let Err(e) = send(&orchestrator, line, &session_id, stream).await {
            eprintln!("  [Error] {e}");
        }
        println!();
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

async fn send(
    orchestrator: &Orchestrator,
    message: &str,
    session_id: &SessionId,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !stream {
        let reply = orchestrator.chat(message, session_id).await?;
        if !reply.tools_used.is_empty() {
            println!("  [tools: {}]", reply.tools_used.join(", "));
        }
        println!("{}", reply.reply);
        return Ok(());
    }

    let mut rx = orchestrator.chat_stream(message, session_id).await?;
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            AgentStreamEvent::Chunk { content } => {
                print!("{content}");
                stdout.flush()?;
            }
            AgentStreamEvent::ToolCall { name, input, .. } => {
                println!("  [tool] {name} {input}");
            }
            AgentStreamEvent::ToolResult { output, success, .. } => {
                let mark = if success { "ok" } else { "failed" };
                println!("  [tool {mark}] {output}");
            }
            AgentStreamEvent::Done { .. } => println!(),
            AgentStreamEvent::Error { message } => {
                println!();
                return Err(message.into());
            }
        }
    }
    Ok(())
}
