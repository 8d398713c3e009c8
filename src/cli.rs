//! # Repack CLI
//!
//! - [`Args`] holds the global options and the optional [`Command`].
//! - [`execute`] parses the command line, sets up logging and runs the command.
#![deny(clippy::dbg_macro)]

use std::{env, net::SocketAddr, path::PathBuf};

use clap::builder::styling::{AnsiColor, Color, Style};
use clap::Parser;
use miette::{Context, IntoDiagnostic};
use repack_config::{Config, ServeMode};
use repack_consts::consts;
use repack_fetch::ArchiveFetcher;
use tracing::level_filters::LevelFilter;

use crate::{produce::produce_archive, server};

#[derive(Parser, Debug)]
#[command(
    name = "repack",
    version(consts::REPACK_VERSION),
    about = "Download a repository archive from a Git forge, rename its top-level directory and serve it for download."
)]
#[clap(styles = get_styles())]
pub struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[clap(flatten)]
    global_options: GlobalOptions,
}

#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// The configuration file to read.
    #[clap(
        long,
        global = true,
        env = consts::CONFIG_PATH_ENV,
        default_value = consts::DEFAULT_CONFIG_PATH,
        help_heading = consts::CLAP_GLOBAL_OPTIONS
    )]
    config: PathBuf,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[clap(short, long, action = clap::ArgAction::Count, global = true, help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    verbose: u8,

    /// Decrease logging verbosity (-q for warnings only, -qq for errors, -qqq for silence).
    #[clap(short, long, action = clap::ArgAction::Count, global = true, help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    quiet: u8,

    #[clap(long, default_value = "auto", global = true, env = "REPACK_COLOR", help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    color: ColorOutput,
}

impl Args {
    fn log_level_filter(&self) -> LevelFilter {
        match (self.global_options.quiet, self.global_options.verbose) {
            (0, 0) => LevelFilter::INFO,
            (0, 1) => LevelFilter::DEBUG,
            (0, _) => LevelFilter::TRACE,
            (1, _) => LevelFilter::WARN,
            (2, _) => LevelFilter::ERROR,
            (_, _) => LevelFilter::OFF,
        }
    }
}

#[derive(Parser, Debug)]
pub enum Command {
    /// Produce the archive and serve it over HTTP (the default).
    Serve(ServeArgs),
    /// Produce the archive once, print its path and exit.
    Produce,
}

#[derive(Parser, Debug, Default)]
pub struct ServeArgs {
    /// The address to listen on, overrides `listen` from the configuration.
    #[clap(long)]
    listen: Option<SocketAddr>,

    /// Rebuild the archive on every download instead of once at startup.
    #[clap(long)]
    lazy: bool,
}

pub async fn execute() -> miette::Result<()> {
    let args = Args::parse();

    set_console_colors(&args);
    let use_colors = console::colors_enabled_stderr();
    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::default()
                .color(use_colors)
                .build(),
        )
    }))?;

    setup_logging(&args, use_colors)?;

    let config_path = &args.global_options.config;
    let config = Config::from_path(config_path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to load the configuration from {}", config_path.display()))?;

    match args.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(serve_args) => execute_serve(config, serve_args).await,
        Command::Produce => execute_produce(config).await,
    }
}

async fn execute_serve(mut config: Config, args: ServeArgs) -> miette::Result<()> {
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if args.lazy {
        config.serve_mode = ServeMode::Lazy;
    }

    let addr = config.listen;
    let fetcher = ArchiveFetcher::new(config.fetch_timeout()).into_diagnostic()?;
    let state = server::AppState::new(config, fetcher).into_diagnostic()?;

    server::prepare(&state).await;
    server::serve(state, addr).await
}

async fn execute_produce(config: Config) -> miette::Result<()> {
    let fetcher = ArchiveFetcher::new(config.fetch_timeout()).into_diagnostic()?;
    let produced = produce_archive(&config, &fetcher).await?;
    println!("{}", produced.path.display());
    Ok(())
}

#[derive(Debug, Clone, clap::ValueEnum, Default)]
pub enum ColorOutput {
    Always,
    Never,

    #[default]
    Auto,
}

fn set_console_colors(args: &Args) {
    // FORCE_COLOR and NO_COLOR take precedence over the CLI flag.
    let color = match env::var("FORCE_COLOR") {
        Ok(_) => &ColorOutput::Always,
        Err(_) => match env::var("NO_COLOR") {
            Ok(_) => &ColorOutput::Never,
            Err(_) => &args.global_options.color,
        },
    };

    match color {
        ColorOutput::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        ColorOutput::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        ColorOutput::Auto => {}
    };
}

/// The directives applied to our own crates and the noisy HTTP stack for a
/// given verbosity.
fn default_directives(level: LevelFilter) -> String {
    let low_level = match level {
        LevelFilter::TRACE => LevelFilter::DEBUG,
        LevelFilter::OFF | LevelFilter::ERROR => level,
        _ => LevelFilter::WARN,
    };
    format!(
        "repack={level},repack_archive={level},repack_config={level},repack_fetch={level},hyper={low_level},reqwest={low_level}"
    )
    .to_lowercase()
}

fn setup_logging(args: &Args, use_colors: bool) -> miette::Result<()> {
    use tracing_subscriber::{
        EnvFilter, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    };

    let level_filter = args.log_level_filter();
    let cli_verbosity_set = args.global_options.verbose > 0 || args.global_options.quiet > 0;

    // CLI flags win over RUST_LOG, otherwise RUST_LOG is appended so it can
    // override the defaults.
    let directives = if cli_verbosity_set {
        default_directives(level_filter)
    } else {
        let env_directives = env::var("RUST_LOG").unwrap_or_default();
        let original_directives = default_directives(level_filter);
        if env_directives.is_empty() {
            original_directives
        } else {
            format!("{original_directives},{env_directives}")
        }
    };

    let default_directive = match level_filter {
        LevelFilter::OFF => LevelFilter::OFF,
        LevelFilter::ERROR => LevelFilter::ERROR,
        _ => LevelFilter::WARN,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_directive.into())
        .parse(&directives)
        .into_diagnostic()?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(use_colors)
        .with_target(level_filter >= LevelFilter::DEBUG)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
    Ok(())
}

pub fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::BrightGreen))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::BrightGreen))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightCyan))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
}
