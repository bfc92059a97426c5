//! Live playground CLI
//!
//!   live-playground compile [--html F] [--css F] [--js F]
//!   live-playground render  [--html F] [--css F] [--js F] [--click SELECTOR]... [--text]
//!   live-playground export  [--html F] [--css F] [--js F] [--out DIR]
//!   live-playground defaults
//!
//! A missing fragment flag means the built-in sample. Documents go to stdout;
//! logs (including relayed preview console output) go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use live_playground::{compile, export, Fragment, PlaygroundConfig, PreviewHost, SourceSet};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "live-playground")]
#[command(about = "Compile HTML/CSS/JS fragments and preview them in a sandbox", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FragmentArgs {
    /// HTML fragment file
    #[arg(long)]
    html: Option<PathBuf>,

    /// CSS fragment file
    #[arg(long)]
    css: Option<PathBuf>,

    /// JavaScript fragment file
    #[arg(long)]
    js: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the compiled preview document
    Compile {
        #[command(flatten)]
        fragments: FragmentArgs,
    },

    /// Render the document in the sandbox and print the resulting page
    Render {
        #[command(flatten)]
        fragments: FragmentArgs,

        /// Click the first element matching this selector after loading
        /// (repeatable, applied in order)
        #[arg(long)]
        click: Vec<String>,

        /// Print the visible text instead of the serialized document
        #[arg(long)]
        text: bool,
    },

    /// Write the fragments as a standalone project archive
    Export {
        #[command(flatten)]
        fragments: FragmentArgs,

        /// Destination directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Print the built-in sample fragments as JSON
    Defaults,
}

fn read_fragment(path: Option<&Path>, fallback: &str) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => Ok(fallback.to_string()),
    }
}

impl FragmentArgs {
    fn load(&self) -> Result<SourceSet> {
        let defaults = SourceSet::defaults();
        let mut sources = SourceSet::default();
        let paths = [
            (Fragment::Markup, self.html.as_deref()),
            (Fragment::Style, self.css.as_deref()),
            (Fragment::Script, self.js.as_deref()),
        ];
        for (fragment, path) in paths {
            sources.set(fragment, read_fragment(path, defaults.get(fragment))?);
        }
        Ok(sources)
    }
}

async fn render(config: &PlaygroundConfig, sources: &SourceSet, clicks: &[String], text: bool) -> Result<()> {
    let document = compile(sources);
    let mut host = PreviewHost::new(config.sandbox.clone());
    let session = host.render(&document).await?;

    for selector in clicks {
        if !session.click(selector).await? {
            tracing::warn!(%selector, "nothing to click");
        }
    }
    for diagnostic in session.diagnostics() {
        tracing::warn!(session = %session.id(), "{}", diagnostic);
    }

    let output = if text {
        session.visible_text()?
    } else {
        session.outer_html()?
    };
    println!("{}", output);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PlaygroundConfig::load(path)?,
        None => PlaygroundConfig::default(),
    };

    match cli.command {
        Commands::Compile { fragments } => {
            print!("{}", compile(&fragments.load()?));
        }
        Commands::Render {
            fragments,
            click,
            text,
        } => {
            render(&config, &fragments.load()?, &click, text).await?;
        }
        Commands::Export { fragments, out } => {
            let path = out.join(export::ARCHIVE_NAME);
            export::write_archive(&fragments.load()?, &path)?;
            println!("{}", path.display());
        }
        Commands::Defaults => {
            println!("{}", serde_json::to_string_pretty(&SourceSet::defaults())?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
