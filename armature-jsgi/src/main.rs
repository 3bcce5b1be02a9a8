//! `armature-jsgi` - serve a Rhai JSGI application over HTTP.
//!
//! # Commands
//!
//! - `armature-jsgi serve` - boot the servlet and serve HTTP/1.1
//! - `armature-jsgi check` - boot the servlet and exit, reporting init errors

use armature_jsgi::config::{ENV_PREFIX, InitParams, ServletConfig, ServletContext};
use armature_jsgi::logging::{LogConfig, LogFormat, LogLevel};
use armature_jsgi::server::DEFAULT_MAX_BODY_SIZE;
use armature_jsgi::{JsgiServer, JsgiServlet};
use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Armature JSGI - one Rhai handler behind an HTTP server
#[derive(Parser)]
#[command(name = "armature-jsgi")]
#[command(author = "Pegasus Heavy Industries LLC")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "ARMATURE_JSGI_LOG_LEVEL")]
    log_level: LogLevel,

    /// Log format (json, plain, pretty, compact)
    #[arg(long, global = true, default_value = "json", env = "ARMATURE_JSGI_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the servlet and serve HTTP
    #[command(alias = "s")]
    Serve(ServeArgs),

    /// Boot the servlet and exit
    Check(ServletArgs),
}

#[derive(Args)]
struct ServletArgs {
    /// Init parameter file (.toml, .json or .env)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// `.env` file to load before reading ARMATURE_JSGI_* variables
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Deployment directory of the web application
    #[arg(short, long, default_value = ".")]
    webapp: PathBuf,

    /// Mount path of the application
    #[arg(long, default_value = "")]
    context_path: String,

    /// Servlet name used in logs
    #[arg(long, default_value = "jsgi")]
    name: String,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    servlet: ServletArgs,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080", env = "ARMATURE_JSGI_BIND")]
    bind: SocketAddr,

    /// Skip requests that waited longer than this many milliseconds
    #[arg(long)]
    continuation_timeout: Option<u64>,

    /// Reject request bodies larger than this many bytes with 413
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_SIZE, env = "ARMATURE_JSGI_MAX_BODY_SIZE")]
    max_body_size: usize,
}

impl ServletArgs {
    /// Init parameters: config file first, then prefixed environment
    /// variables on top.
    fn servlet_config(&self) -> armature_jsgi::Result<ServletConfig> {
        let mut params = match &self.config {
            Some(path) => InitParams::from_file(path)?,
            None => InitParams::new(),
        };
        params.merge(InitParams::from_dotenv(ENV_PREFIX, self.env_file.as_deref())?);

        let context = ServletContext::new(self.context_path.clone(), self.webapp.clone());
        Ok(ServletConfig::new(self.name.clone(), params, context))
    }

    fn init(&self) -> Result<JsgiServlet, Box<dyn Error>> {
        let config = self.servlet_config()?;
        Ok(JsgiServlet::builder().init(&config)?)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let _guard = LogConfig::new()
        .level(cli.log_level)
        .format(cli.log_format)
        .init()?;

    match cli.command {
        Commands::Serve(args) => {
            let servlet = args.servlet.init()?;
            let server = JsgiServer::new(servlet)
                .with_continuation_timeout(args.continuation_timeout.map(Duration::from_millis))
                .with_max_body_size(args.max_body_size);
            let listener = tokio::net::TcpListener::bind(args.bind).await?;
            server
                .serve(listener, async {
                    tokio::signal::ctrl_c().await.ok();
                })
                .await?;
        }
        Commands::Check(args) => {
            let servlet = args.init()?;
            info!(servlet = servlet.name(), handler = ?servlet.handler(), "Servlet initialised");
        }
    }

    Ok(())
}
