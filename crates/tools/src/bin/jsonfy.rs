//! jsonfy - extract interactive elements and page structure from a URL

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jsonfy_browser::BrowserSession;
use jsonfy_tools::{AgentTools, JsonfyConfig, Persistence};

/// Extracts interactive elements and HTML structure from web pages
#[derive(Parser, Debug)]
#[command(name = "jsonfy")]
#[command(version)]
struct Cli {
    /// URL of the page to process
    url: String,

    /// Interactive elements JSON output
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// HTML structure JSON output
    #[arg(long, value_name = "PATH")]
    structure: Option<PathBuf>,

    /// Consolidated HTML output (implies --composite)
    #[arg(long, value_name = "PATH")]
    consolidated: Option<PathBuf>,

    /// Markdown output (implies --markdown)
    #[arg(long, value_name = "PATH")]
    markdown_path: Option<PathBuf>,

    /// Also save a screenshot (full page)
    #[arg(long, value_name = "PATH")]
    screenshot: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Attach to a running browser instead of launching one
    #[arg(long, value_name = "URL")]
    cdp_url: Option<String>,

    /// Do not draw the numbered overlay
    #[arg(long)]
    no_highlight: bool,

    /// Write the HTML with iframe content spliced in
    #[arg(long)]
    composite: bool,

    /// Write the consolidated HTML converted to Markdown
    #[arg(long)]
    markdown: bool,

    /// Leave the browser open until Ctrl+C
    #[arg(long)]
    keep_open: bool,
}

impl Cli {
    fn apply(&self, config: &mut JsonfyConfig) {
        if let Some(path) = &self.output {
            config.output_json_path = path.clone();
        }
        if let Some(path) = &self.structure {
            config.structure_json_path = path.clone();
        }
        if let Some(path) = &self.consolidated {
            config.consolidated_html_path = path.clone();
        }
        if let Some(path) = &self.markdown_path {
            config.markdown_path = path.clone();
        }
        if let Some(path) = &self.screenshot {
            config.screenshot_path = path.clone();
        }
        if let Some(url) = &self.cdp_url {
            config.cdp_url = Some(url.clone());
        }
        if self.headless {
            config.headless = true;
        }
        if self.no_highlight {
            config.highlight = false;
        }
    }
}

fn init_tracing(config: &JsonfyConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = JsonfyConfig::from_env().context("invalid environment configuration")?;
    cli.apply(&mut config);
    init_tracing(&config);

    let session = Arc::new(BrowserSession::new(config.session_config()));
    session.start().await.context("failed to start browser")?;

    let result = run(&cli, &config, &session).await;
    if let Err(e) = &result {
        error!("Failed to process {}: {:#}", cli.url, e);
    }

    if cli.keep_open {
        let token = CancellationToken::new();
        let signal = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.cancel();
            }
        });
        info!("Browser left open; press Ctrl+C to exit");
        session.run_until_cancelled(token).await?;
    } else {
        session.stop().await?;
    }

    result
}

async fn run(cli: &Cli, config: &JsonfyConfig, session: &Arc<BrowserSession>) -> Result<()> {
    let tools = AgentTools::new(session.clone(), config.screenshot_path.clone());
    let state = tools.navigate(&cli.url).await?;

    let persistence = Persistence::from_config(config);
    let saved = persistence.save(
        &state,
        cli.composite || cli.consolidated.is_some(),
        cli.markdown || cli.markdown_path.is_some(),
    )?;
    for path in &saved.paths {
        info!("Wrote {}", path.display());
    }

    if cli.screenshot.is_some() {
        tools.screenshot(None, true).await?;
    }

    info!(
        "Process completed successfully with {} interactive elements found",
        state.scan.interactive_elements.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "jsonfy",
            "https://example.com",
            "--headless",
            "--no-highlight",
            "-o",
            "out/elements.json",
            "--cdp-url",
            "ws://127.0.0.1:9222/devtools/browser/x",
        ]);
        let mut config = JsonfyConfig::default();
        cli.apply(&mut config);

        assert!(config.headless);
        assert!(!config.highlight);
        assert_eq!(config.output_json_path, PathBuf::from("out/elements.json"));
        assert_eq!(config.cdp_url.as_deref(), Some("ws://127.0.0.1:9222/devtools/browser/x"));
        assert_eq!(config.structure_json_path, PathBuf::from("html_structure.json"));
    }

    #[test]
    fn test_url_required() {
        assert!(Cli::try_parse_from(["jsonfy"]).is_err());
    }
}
