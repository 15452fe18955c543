mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use log::{debug, info, warn};
use page_pilot::{
    BrowserClient, ChatSession, Directive, Effect, HttpTransport, PilotOptions, StreamAssembler,
};
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Open {
            url,
            api,
            webdriver,
            headless,
        } => {
            let mut options = PilotOptions::from_env().headless(headless);
            if let Some(api) = api {
                options = options.api_url(&api);
            }
            if let Some(webdriver) = webdriver {
                options = options.webdriver_url(&webdriver);
            }
            options.validate()?;
            open(&url, options).await
        }
        Commands::Replay { file, chunk_size } => replay(&file, chunk_size),
    }
}

async fn open(url: &str, options: PilotOptions) -> Result<()> {
    let mut client = BrowserClient::connect(options.clone()).await?;
    client.navigate(url).await?;
    client.inject_widget().await?;

    let page = Arc::new(client.page());
    let transport = HttpTransport::new(&options.api_url);
    let mut session = ChatSession::new(transport, page, &options);

    println!("🌐 Browser opened at {url}. Chat in the widget. Ctrl+C to exit.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sleep(Duration::from_millis(500)) => {}
        }

        let Some(prompt) = client.poll_prompt().await? else {
            continue;
        };
        info!("Prompt received: {prompt}");

        let (tx, mut rx) = watch::channel(String::new());
        let renderer = client.clone();
        let render = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let display = rx.borrow_and_update().clone();
                if let Err(e) = renderer.render_reply(&display, &[]).await {
                    warn!("{}", e);
                }
            }
        });

        let reply = session
            .send_message(&prompt, |display| {
                if tx.send(display.to_string()).is_err() {
                    debug!("Reply renderer gone, dropping display update");
                }
            })
            .await
            .map(|message| message.content.clone());
        drop(tx);
        if let Err(e) = render.await {
            warn!("Reply renderer stopped: {}", e);
        }

        if let Some(reply) = reply {
            client.render_reply(&reply, session.suggestions()).await?;
        }
    }

    info!("Waiting for queued actions");
    session.wait_for_actions().await;
    client.shutdown().await?;
    Ok(())
}

fn replay(file: &Path, chunk_size: usize) -> Result<()> {
    let body = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let mut assembler = StreamAssembler::new();
    let mut directives: Vec<Directive> = Vec::new();
    let mut suggestions: Vec<String> = Vec::new();
    let mut collect = |effects: Vec<Effect>| {
        for effect in effects {
            match effect {
                Effect::Action(directive) => directives.push(directive),
                Effect::Suggestions(items) => suggestions = items,
            }
        }
    };

    for chunk in body.chunks(chunk_size.max(1)) {
        collect(assembler.append_chunk(chunk).effects);
    }
    collect(assembler.finish().effects);

    println!("{}", assembler.display_text());
    println!();
    for directive in &directives {
        println!("action: {}", serde_json::to_string(directive)?);
    }
    for suggestion in &suggestions {
        println!("suggestion: {suggestion}");
    }
    info!(
        "{} directives, {} rejected blocks",
        assembler.extractor().extracted(),
        assembler.extractor().rejected()
    );
    Ok(())
}
