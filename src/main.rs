use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use multidiff_view::client::DiffClient;
use multidiff_view::commands::{ClickTarget, Command};
use multidiff_view::config::ViewerSettings;
use multidiff_view::document::{Document, RowId};
use multidiff_view::render::render_view;
use multidiff_view::studio::events::DocumentSource;
use multidiff_view::studio::session::ReviewSession;
use multidiff_view::studio::{load_document, run_studio};
use multidiff_view::telemetry::NoopSink;
use multidiff_view::view::Viewport;

const LOG_FILE_PREFIX: &str = "multidiff_view.log";

#[derive(Debug, Parser)]
#[command(name = "multidiff_view", about = "Dependency-aware diff viewer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open a diff in the desktop viewer.
    Open(SourceArgs),
    /// Load a diff, apply one command and print the resulting view.
    Slice {
        #[command(flatten)]
        source: SourceArgs,
        /// Command id, e.g. `find-variable-uses`. Without one, a `--span` is clicked.
        #[arg(long)]
        command: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the context menu offered for a diff.
    Commands {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        target: TargetArgs,
        /// Print the menu as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Subject id served by the diff server.
    #[arg(long)]
    subject: Option<String>,
    /// Local annotated diff markup file.
    #[arg(long)]
    file: Option<PathBuf>,
}

impl SourceArgs {
    fn into_source(self) -> Result<DocumentSource> {
        match (self.subject, self.file) {
            (Some(subject), None) => Ok(DocumentSource::Subject(subject)),
            (None, Some(path)) => Ok(DocumentSource::File(path)),
            _ => bail!("exactly one of --subject or --file is required"),
        }
    }
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Clicked span as `<row>:<index>`, both zero-based.
    #[arg(long)]
    span: Option<SpanRef>,
    /// Hold Alt while clicking.
    #[arg(long)]
    alt: bool,
}

impl TargetArgs {
    fn resolve(&self, document: &Document) -> Result<Option<ClickTarget>> {
        let Some(span_ref) = self.span else {
            return Ok(None);
        };
        let span = document
            .spans()
            .iter()
            .filter(|span| span.row == RowId(span_ref.row))
            .nth(span_ref.index)
            .ok_or_else(|| anyhow!("no span {}:{} in document", span_ref.row, span_ref.index))?;
        let target = ClickTarget::span(document, span.id)
            .ok_or_else(|| anyhow!("span {} is not part of the document", span.id.0))?;
        Ok(Some(target.with_alt(self.alt)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpanRef {
    row: usize,
    index: usize,
}

impl FromStr for SpanRef {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let (row, index) = value
            .split_once(':')
            .ok_or_else(|| anyhow!("expected `<row>:<index>`, got `{value}`"))?;
        Ok(Self {
            row: row.trim().parse().context("invalid span row")?,
            index: index.trim().parse().context("invalid span index")?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_tracing()?;

    let cli = Cli::parse();
    let settings = ViewerSettings::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Open(source) => {
            let source = source.into_source()?;
            tokio::task::block_in_place(|| run_studio(&settings, source))?;
        }
        Commands::Slice {
            source,
            command,
            target,
        } => {
            let source = source.into_source()?;
            let mut session = open_session(&settings, &source).await?;
            let target = target.resolve(session.document())?;
            let outcome = match (command, target) {
                (Some(name), target) => {
                    let command = name.parse::<Command>()?;
                    session.run(command, target, &NoopSink, Instant::now())
                }
                (None, Some(target)) => session.click(target, &NoopSink),
                (None, None) => {
                    info!("no command given; showing the line diff");
                    print!("{}", render_view(session.document(), session.view()));
                    return Ok(());
                }
            };
            info!(outcome = ?outcome, status = %session.status_line(), "slice applied");
            print!("{}", render_view(session.document(), session.view()));
        }
        Commands::Commands {
            source,
            target,
            json,
        } => {
            let source = source.into_source()?;
            let session = open_session(&settings, &source).await?;
            let target = target.resolve(session.document())?;
            let menu = session.menu(target.as_ref());
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&menu).context("failed to encode menu")?
                );
                return Ok(());
            }
            for section in menu {
                println!("{}", section.title);
                for command in section.commands {
                    println!("  {:<26} {}", command.id(), command.label());
                }
            }
        }
    }

    Ok(())
}

async fn open_session(settings: &ViewerSettings, source: &DocumentSource) -> Result<ReviewSession> {
    let client = DiffClient::new(settings.clone());
    let document = load_document(&client, source).await?;
    Ok(ReviewSession::open(
        source.subject(),
        document,
        Viewport::default(),
    ))
}

fn init_tracing() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,multidiff_view=debug"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(env_filter);

    let (file_layer, guard) = match env::var_os("MULTIDIFF_LOG_DIR") {
        Some(log_dir) => {
            let file_filter = env::var("MULTIDIFF_FILE_LOG").unwrap_or_else(|_| "debug".to_owned());
            let file_filter =
                EnvFilter::try_new(&file_filter).context("failed to parse MULTIDIFF_FILE_LOG")?;
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(file_filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize tracing subscriber: {error}"))?;
    Ok(guard)
}
