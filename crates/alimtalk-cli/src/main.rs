use std::net::SocketAddr;
use std::sync::Arc;

use alimtalk_agent::{DEFAULT_DEBUG_CHARS, Resources, debug_summary};
use alimtalk_core::{Template, TemplateRequest, TemplateResponse, ValidateRequest, ValidateResponse};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "alimtalk", version, about = "Policy-compliant AlimTalk template service")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },
    /// Manage the policy passage index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Print the passages retrieved for a query.
    Retrieve {
        query: String,
        #[arg(long)]
        k: Option<usize>,
        /// Characters of passage text to show per chunk.
        #[arg(long, default_value_t = DEFAULT_DEBUG_CHARS)]
        max_chars: usize,
        /// Search the index as it is, without building it first.
        #[arg(long)]
        no_build: bool,
    },
    /// Draft or revise a template.
    Generate {
        /// The edit or creation request.
        user_input: String,
        #[command(flatten)]
        original: TemplateArgs,
    },
    /// Predict whether a template would be approved.
    Validate {
        #[command(flatten)]
        template: TemplateArgs,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Build the index if it is empty.
    Ensure,
    /// Delete every passage and rebuild.
    Reset {
        /// Also drop and recreate the collection.
        #[arg(long)]
        hard: bool,
    },
}

#[derive(clap::Args)]
struct TemplateArgs {
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long, default_value = "")]
    text: String,
    #[arg(long)]
    button_name: Option<String>,
}

impl From<TemplateArgs> for Template {
    fn from(args: TemplateArgs) -> Self {
        Template {
            title: args.title,
            text: args.text,
            button_name: args.button_name,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    tracing::info!("alimtalk v{}", env!("CARGO_PKG_VERSION"));

    let resources = cli
        .config
        .resources()
        .await
        .context("initializing resources")?;

    match cli.command {
        Command::Serve { bind } => {
            alimtalk_server::serve(bind, Arc::new(resources))
                .await
                .context("HTTP server failed")?;
        }
        Command::Index { action } => run_index(&resources, action).await?,
        Command::Retrieve {
            query,
            k,
            max_chars,
            no_build,
        } => {
            let k = k.unwrap_or(resources.top_k());
            let retriever = resources.retriever();
            let result = if no_build {
                retriever.retrieve_without_build(&query, k).await
            } else {
                retriever.retrieve(&query, k).await
            }
            .context("retrieving passages")?;
            print!("{}", debug_summary(&result, max_chars));
        }
        Command::Generate {
            user_input,
            original,
        } => {
            let request = TemplateRequest {
                original_template: original.into(),
                user_input,
            };
            let output = resources
                .orchestrator()
                .run(&request)
                .await
                .context("generating template")?;
            let response = TemplateResponse {
                template: output.template,
                chat_response: output.chat_message,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Validate { template } => {
            let request = ValidateRequest {
                template: template.into(),
            };
            request.validate().context("invalid template")?;
            let result = resources
                .classifier()
                .classify(&request.template)
                .await
                .context("classifying template")?;
            println!("{}", serde_json::to_string_pretty(&ValidateResponse::from(&result))?);
        }
    }
    Ok(())
}

async fn run_index(resources: &Resources, action: IndexAction) -> anyhow::Result<()> {
    let indexer = resources.indexer();
    match action {
        IndexAction::Ensure => {
            let inserted = indexer.ensure_index().await.context("building index")?;
            let total = indexer.count().await.context("counting passages")?;
            eprintln!("  Inserted {inserted} passages ({total} indexed)");
        }
        IndexAction::Reset { hard } => {
            let inserted = indexer.reset(hard).await.context("resetting index")?;
            eprintln!("  Re-indexed {inserted} passages");
        }
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_index_reset_hard() {
        let cli = Cli::try_parse_from(["alimtalk", "index", "reset", "--hard"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Index {
                action: IndexAction::Reset { hard: true }
            }
        ));
    }

    #[test]
    fn parses_generate_with_original_template() {
        let cli = Cli::try_parse_from([
            "alimtalk",
            "generate",
            "change the title to C",
            "--title",
            "A",
            "--text",
            "B",
        ])
        .unwrap();
        let Command::Generate {
            user_input,
            original,
        } = cli.command
        else {
            panic!("expected generate");
        };
        assert_eq!(user_input, "change the title to C");
        assert_eq!(Template::from(original), Template::new("A", "B"));
    }
}
