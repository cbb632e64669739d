mod headless;

use std::path::PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use relay_core::config::BackendKind;
use relay_core::logging::LoggingConfig;
use relay_llm::responses::{McpApproval, ReasoningEffort, SearchContextSize};

use headless::app::{consent_rules, AppError, AppHeadless};

#[derive(Parser)]
#[command(name = "relay", author, version, about = "Tool invocation round trips against OpenAI compatible APIs", long_about = None)]
struct Cli {
    /// Model to use, defaults to the configured one
    #[arg(long, global = true)]
    model: Option<String>,

    /// API the round trip talks to (responses or chat)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Log level (overrides RELAY_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a single prompt
    Ask {
        prompt: String,
        #[arg(long)]
        instructions: Option<String>,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
        /// Continue from an earlier response id
        #[arg(long)]
        previous: Option<String>,
        #[arg(long)]
        max_output_tokens: Option<u32>,
        #[arg(long, value_enum)]
        effort: Option<Effort>,
        /// Print the whole conversation as JSON
        #[arg(long)]
        trace: bool,
    },
    /// Interactive multi turn conversation on stdin
    Chat {
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long)]
        stream: bool,
    },
    /// Function calling round trip with the weather tool
    Weather {
        #[arg(default_value = "What's the weather like in Paris today?")]
        prompt: String,
    },
    /// Let the model call a remote MCP server
    Mcp {
        #[arg(default_value = "What transport protocols are supported in the 2025-03-26 version of the MCP spec?")]
        prompt: String,
        #[arg(long, default_value = "deepwiki")]
        label: String,
        #[arg(long, default_value = "https://mcp.deepwiki.com/mcp")]
        url: String,
        /// Restrict the server to these tools
        #[arg(long)]
        allow: Vec<String>,
        #[arg(long, value_enum, default_value = "always")]
        require_approval: Approval,
        /// Extra header sent to the server, as KEY=VALUE
        #[arg(long)]
        header: Vec<String>,
        /// Approve calls of this server tool without asking (`*` for all of them)
        #[arg(long)]
        trust: Vec<String>,
        /// Deny calls of this server tool without asking, wins over --trust
        #[arg(long)]
        deny: Vec<String>,
        /// Approve every call without asking
        #[arg(long)]
        yes: bool,
    },
    /// Answer with the web search tool
    Search {
        prompt: String,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long, value_enum)]
        context_size: Option<ContextSize>,
        /// Force the model to search
        #[arg(long)]
        force: bool,
    },
    /// Vector store indexing and file search
    #[command(subcommand)]
    Files(FilesCommand),
    /// Generate an image into a PNG file
    Image {
        prompt: String,
        #[arg(short, long, default_value = "image.png")]
        output: PathBuf,
        #[arg(long)]
        size: Option<String>,
        #[arg(long)]
        quality: Option<String>,
    },
    /// Extract a calendar event as structured output
    Extract {
        #[arg(default_value = "I have a meeting with Alice and Bob on Friday 2025-06-06 around 10:00 AM.")]
        text: String,
    },
    /// Solve a math problem step by step as structured output
    Solve {
        #[arg(default_value = "how can I solve 8x + 7 = -23?")]
        problem: String,
    },
}

#[derive(Subcommand)]
enum FilesCommand {
    /// Upload files (paths or URLs) into a new vector store
    Index {
        #[arg(required = true)]
        sources: Vec<String>,
        #[arg(long, default_value = "knowledge_base")]
        name: String,
    },
    /// Ask a question answered from a vector store
    Ask {
        #[arg(long)]
        store: String,
        prompt: String,
        #[arg(long)]
        max_results: Option<u32>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Effort {
    Low,
    Medium,
    High,
}

impl From<Effort> for ReasoningEffort {
    fn from(effort: Effort) -> Self {
        match effort {
            Effort::Low => ReasoningEffort::Low,
            Effort::Medium => ReasoningEffort::Medium,
            Effort::High => ReasoningEffort::High,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Approval {
    Always,
    Never,
}

impl From<Approval> for McpApproval {
    fn from(approval: Approval) -> Self {
        match approval {
            Approval::Always => McpApproval::Always,
            Approval::Never => McpApproval::Never,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ContextSize {
    Low,
    Medium,
    High,
}

impl From<ContextSize> for SearchContextSize {
    fn from(size: ContextSize) -> Self {
        match size {
            ContextSize::Low => SearchContextSize::Low,
            ContextSize::Medium => SearchContextSize::Medium,
            ContextSize::High => SearchContextSize::High,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut logging = LoggingConfig::from_env();
    if let Some(level) = cli.log_level {
        logging = logging.level(level);
    }
    if let Err(e) = logging.init() {
        eprintln!("{}", style(format!("logging disabled: {}", e)).dim());
    }

    let app = AppHeadless::new(cli.model, cli.backend).await?;

    match cli.command {
        Command::Ask { prompt, instructions, stream, previous, max_output_tokens, effort, trace } => {
            app.ask(&prompt, instructions, stream, previous, max_output_tokens, effort.map(Into::into), trace)
                .await
        }
        Command::Chat { instructions, stream } => app.chat(instructions, stream).await,
        Command::Weather { prompt } => app.weather(&prompt).await,
        Command::Mcp { prompt, label, url, allow, require_approval, header, trust, deny, yes } => {
            let consent = consent_rules(&label, &trust, &deny, yes);
            app.mcp(&prompt, &label, &url, allow, require_approval.into(), header, consent).await
        }
        Command::Search { prompt, country, city, region, context_size, force } => {
            app.search(&prompt, country, city, region, context_size.map(Into::into), force).await
        }
        Command::Files(FilesCommand::Index { sources, name }) => app.index_files(&sources, &name).await,
        Command::Files(FilesCommand::Ask { store, prompt, max_results }) => {
            app.file_search(&store, &prompt, max_results).await
        }
        Command::Image { prompt, output, size, quality } => app.image(&prompt, &output, size, quality).await,
        Command::Extract { text } => app.extract(&text).await,
        Command::Solve { problem } => app.solve(&problem).await,
    }
}
