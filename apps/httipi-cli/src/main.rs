//! httipi - send one HTTP request and print the response body
//!
//! ```bash
//! httipi get https://api.example.com/users/7 -H "x-tenant: acme" --pretty
//! httipi post https://api.example.com/users --data '{"name":"Ada"}'
//! httipi -c client.yaml --print-config
//! ```
//!
//! Configuration is layered: built-in defaults, then the YAML file given
//! with `-c`, then `HTTIPI_*` environment variables (`__` separates nested
//! keys, e.g. `HTTIPI_JSON__EMPTY_BODY_AS_NULL=false`).

// CLI tools are expected to print to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use http::{HeaderMap, Method, StatusCode, Version};
use httipi::{ClientBuilder, ClientConfig, HttpError, Request, ResponseMeta, TransportSecurity};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Send a single HTTP request and print the (decompressed) response body
#[derive(Parser, Debug)]
#[command(name = "httipi")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML client configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Allow plain http:// URLs
    #[arg(long, global = true)]
    allow_http: bool,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a GET request
    Get(Target),
    /// Send a DELETE request
    Delete(Target),
    /// Send a POST request
    Post(WithBody),
    /// Send a PUT request
    Put(WithBody),
    /// Send a PATCH request
    Patch(WithBody),
}

#[derive(Args, Debug)]
struct Target {
    /// Absolute request URL
    url: String,

    /// Extra request header, `name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Pretty-print JSON response bodies
    #[arg(long)]
    pretty: bool,

    /// Print the status line and response headers before the body
    #[arg(short, long)]
    include: bool,
}

#[derive(Args, Debug)]
struct WithBody {
    #[command(flatten)]
    target: Target,

    /// JSON request body
    #[arg(short, long)]
    data: Option<String>,
}

impl Command {
    fn into_parts(self) -> (Method, Target, Option<String>) {
        match self {
            Command::Get(target) => (Method::GET, target, None),
            Command::Delete(target) => (Method::DELETE, target, None),
            Command::Post(body) => (Method::POST, body.target, body.data),
            Command::Put(body) => (Method::PUT, body.target, body.data),
            Command::Patch(body) => (Method::PATCH, body.target, body.data),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if cli.allow_http {
        config.transport = TransportSecurity::AllowInsecureHttp;
    }
    tracing::debug!(
        timeout = ?config.request_timeout,
        transport = ?config.transport,
        max_redirects = config.max_redirects,
        "effective client configuration loaded"
    );

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        anyhow::bail!("no request given; try `httipi get <URL>`");
    };
    let (method, target, data) = command.into_parts();

    let mut builder = Request::builder()
        .url(&target.url)?
        .method(method)
        .headers(target.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    if let Some(json) = data {
        builder = builder.json_str(json);
    }
    let request = builder.build()?;

    let client = ClientBuilder::with_config(config)
        .build()
        .context("failed to initialise HTTP client")?;

    let include = target.include;
    let mut print_head = |meta: &ResponseMeta| {
        if include {
            println!("{}", format_head(meta.version(), meta.status(), meta.headers()));
        }
    };

    match client.execute_text(request, Some(&mut print_head)).await {
        Ok(body) => {
            println!("{}", render_body(&body, target.pretty));
            Ok(ExitCode::SUCCESS)
        }
        Err(HttpError::Status(err)) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
        Err(other) => Err(other.into()),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,httipi={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// defaults -> YAML (if provided) -> env (`HTTIPI_*`)
fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let mut figment = Figment::new().merge(Serialized::defaults(ClientConfig::default()));
    if let Some(path) = path {
        if !path.is_file() {
            anyhow::bail!("config file does not exist: {}", path.display());
        }
        figment = figment.merge(Yaml::file(path));
    }
    figment
        .merge(Env::prefixed("HTTIPI_").split("__"))
        .extract()
        .context("invalid client configuration")
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `name: value`, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in `{raw}`"));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

fn format_head(version: Version, status: StatusCode, headers: &HeaderMap) -> String {
    let version = match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    };
    let mut head = format!("{version} {status}");
    for (name, value) in headers {
        head.push('\n');
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(&String::from_utf8_lossy(value.as_bytes()));
    }
    head.push('\n');
    head
}

/// Pretty-print JSON when asked to; anything that is not JSON is shown as-is.
fn render_body(body: &str, pretty: bool) -> String {
    if !pretty {
        return body.to_owned();
    }
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_owned())
}
