use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use base64::Engine;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use relay_core::config::{BackendKind, RelayConfig};
use relay_core::roundtrip::{
    ConsentRule, ConsentRules, McpServer, Outcome, PrettyFormatter, RoundTrip, RoundTripBuilder, RoundTripResult, StdoutEventManager,
};
use relay_core::tools::WeatherTool;
use relay_core::Conversation;
use relay_llm::responses::{
    HostedTool, McpApproval, ReasoningEffort, ResponsesClient, SearchContextSize, ToolChoice, UserLocation,
};
use relay_llm::{LlmClient, StructuredReply};

use super::approval::ConsoleApprover;
use super::schemas::{CalendarEvent, MathReasoning};

pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// Runs one subcommand against the configured provider
pub struct AppHeadless {
    config: RelayConfig,
    llm: Arc<LlmClient>,
    model: String,
    backend: BackendKind,
}

impl AppHeadless {
    pub async fn new(model: Option<String>, backend: Option<BackendKind>) -> Result<Self, AppError> {
        if let Some(model) = &model {
            std::env::set_var("RELAY_MODEL", model);
        }

        let config = RelayConfig::load().unwrap_or_default();
        let (llm, default_model) = config.get_llm().await.map_err(|e| e.to_string())?;
        let model = model.unwrap_or(default_model);
        let backend = backend.unwrap_or(config.backend);
        eprintln!("{}", style(format!("{} on {} ({:?})", model, llm.provider_name(), backend)).dim());

        Ok(Self {
            config,
            llm: Arc::new(llm),
            model,
            backend,
        })
    }

    fn builder(&self) -> Result<RoundTripBuilder, AppError> {
        self.builder_with(false)
    }

    fn builder_with(&self, stream: bool) -> Result<RoundTripBuilder, AppError> {
        let backend = self
            .config
            .backend_of(self.backend, self.llm.clone())
            .map_err(|e| e.to_string())?;
        let formatter = PrettyFormatter::new().with_deltas(stream);

        Ok(self
            .config
            .configure(RoundTripBuilder::new(backend, &self.model))
            .streaming(stream)
            .event_handler(StdoutEventManager::with_formatter(formatter)))
    }

    /// Hosted tools, file search and image generation only exist on the Responses API
    fn responses_client(&self) -> Result<ResponsesClient, AppError> {
        if self.backend != BackendKind::Responses {
            return Err("this command requires --backend responses".into());
        }
        self.llm
            .responses()
            .ok_or_else(|| format!("provider {} has no responses API", self.llm.provider_name()).into())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn ask(
        &self,
        prompt: &str,
        instructions: Option<String>,
        stream: bool,
        previous: Option<String>,
        max_output_tokens: Option<u32>,
        effort: Option<ReasoningEffort>,
        trace: bool,
    ) -> Result<(), AppError> {
        let mut builder = self.builder_with(stream)?;
        if let Some(instructions) = &instructions {
            builder = builder.instructions(instructions);
        }
        if let Some(previous) = &previous {
            builder = builder.previous_response_id(previous);
        }
        if let Some(max) = max_output_tokens {
            builder = builder.max_output_tokens(max);
        }
        if let Some(effort) = effort {
            builder = builder.reasoning(effort);
        }

        let (result, conversation) = builder.build().ask(prompt).await?;
        if trace {
            println!("{}", serde_json::to_string_pretty(&conversation)?);
        } else {
            print_result(&result, stream);
        }
        Ok(())
    }

    pub async fn chat(&self, instructions: Option<String>, stream: bool) -> Result<(), AppError> {
        let mut builder = self.builder_with(stream)?;
        if let Some(instructions) = &instructions {
            builder = builder.instructions(instructions);
        }
        if chat_declares_tools(self.backend, stream) {
            builder = builder.local_tool(WeatherTool::new());
        } else {
            eprintln!("{}", style("chat completions stream text only, the weather tool is off").dim());
        }
        let trip = builder.build();

        eprintln!("{}", style("type \"exit\" to end the session").dim());
        let mut conversation = Conversation::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            eprint!("{} ", style(">").cyan().bold());
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                break;
            }

            conversation.user(line);
            match trip.run(&mut conversation).await {
                Ok(result) => print_result(&result, stream),
                Err(e) => eprintln!("{} {}", style("error:").red().bold(), e),
            }
        }
        Ok(())
    }

    pub async fn weather(&self, prompt: &str) -> Result<(), AppError> {
        let trip = self.builder()?.local_tool(WeatherTool::new()).build();
        self.run(trip, prompt).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn mcp(
        &self,
        prompt: &str,
        label: &str,
        url: &str,
        allow: Vec<String>,
        require_approval: McpApproval,
        headers: Vec<String>,
        consent: ConsentRules,
    ) -> Result<(), AppError> {
        self.responses_client()?;

        let mut server = McpServer::new(label, url).require_approval(require_approval);
        if !allow.is_empty() {
            server = server.allow(allow);
        }
        for header in headers {
            let (key, value) = parse_header(&header)?;
            server = server.header(key, value);
        }

        // requests no rule covers are asked on the console
        let builder = self
            .builder()?
            .tool(server)
            .consent(consent)
            .approval_handler(ConsoleApprover::new());
        self.run(builder.build(), prompt).await
    }

    pub async fn search(
        &self,
        prompt: &str,
        country: Option<String>,
        city: Option<String>,
        region: Option<String>,
        context_size: Option<SearchContextSize>,
        force: bool,
    ) -> Result<(), AppError> {
        self.responses_client()?;

        let user_location = if country.is_some() || city.is_some() || region.is_some() {
            Some(UserLocation {
                country,
                city,
                region,
                ..UserLocation::approximate()
            })
        } else {
            None
        };
        let tool = HostedTool::WebSearch {
            user_location,
            search_context_size: context_size,
        };

        let mut builder = self.builder()?;
        if force {
            builder = builder.tool_choice(ToolChoice::Hosted(tool.type_name().to_string()));
        }
        self.run(builder.tool(tool).build(), prompt).await
    }

    pub async fn index_files(&self, sources: &[String], name: &str) -> Result<(), AppError> {
        let client = self.responses_client()?;
        let store = client.create_vector_store(name).await?;
        eprintln!("{}", style(format!("vector store {} created", store.id)).dim());

        for source in sources {
            let file = if source.starts_with("http://") || source.starts_with("https://") {
                client.upload_url(source).await?
            } else {
                client.upload_path(source).await?
            };
            client.attach_file(&store.id, &file.id).await?;
            let indexed = client
                .wait_for_file(&store.id, &file.id, Duration::from_secs(2), 60)
                .await?;
            eprintln!("{} {} ({:?})", style("indexed").green(), file.filename, indexed.status);
        }

        println!("{}", store.id);
        Ok(())
    }

    pub async fn file_search(&self, store: &str, prompt: &str, max_results: Option<u32>) -> Result<(), AppError> {
        self.responses_client()?;

        let tool = HostedTool::FileSearch {
            vector_store_ids: vec![store.to_string()],
            max_num_results: max_results,
            filters: None,
        };
        let trip = self
            .builder()?
            .tool(tool)
            .include("file_search_call.results")
            .build();
        self.run(trip, prompt).await
    }

    pub async fn image(
        &self,
        prompt: &str,
        output: &Path,
        size: Option<String>,
        quality: Option<String>,
    ) -> Result<(), AppError> {
        self.responses_client()?;

        let tool = HostedTool::ImageGeneration { size, quality, background: None };
        let (result, _) = self.builder()?.tool(tool).build().ask(prompt).await?;

        let Some(image) = result.images.first() else {
            print_result(&result, false);
            return Err("the model did not generate an image".into());
        };
        let bytes = base64::engine::general_purpose::STANDARD.decode(image)?;
        std::fs::write(output, bytes)?;
        println!("{}", output.display());
        Ok(())
    }

    pub async fn extract(&self, text: &str) -> Result<(), AppError> {
        let (result, _) = self
            .builder()?
            .instructions("Extract the calendar event details from the user's message.")
            .structured::<CalendarEvent>("calendar_event")
            .build()
            .ask(text)
            .await?;

        match result.structured::<CalendarEvent>() {
            Some(Ok(StructuredReply::Parsed(event))) => {
                println!("{}", style(&event.name).bold());
                println!("  date: {}", event.date);
                println!("  participants: {}", event.participants.join(", "));
            }
            Some(Ok(StructuredReply::Refusal(reason))) => println!("refused: {}", reason),
            Some(Err(e)) => return Err(e.into()),
            None => print_result(&result, false),
        }
        Ok(())
    }

    pub async fn solve(&self, problem: &str) -> Result<(), AppError> {
        let (result, _) = self
            .builder()?
            .instructions(
                "You are a helpful math tutor. Solve the math problem step by step. \
                 If the input is not a math problem, set refusal to true and explain why in refusal_reason.",
            )
            .structured::<MathReasoning>("math_reasoning")
            .build()
            .ask(problem)
            .await?;

        match result.structured::<MathReasoning>() {
            Some(Ok(StructuredReply::Parsed(reasoning))) => {
                for (i, step) in reasoning.steps.iter().enumerate() {
                    println!("{}. {}", i + 1, step.explanation);
                    println!("   {}", style(&step.output).cyan());
                }
                println!("{} {}", style("answer:").green().bold(), reasoning.final_answer);
            }
            Some(Ok(StructuredReply::Refusal(reason))) => {
                println!("The model refused to answer the question.");
                println!("Reason: {}", reason);
            }
            Some(Err(e)) => return Err(e.into()),
            None => print_result(&result, false),
        }
        Ok(())
    }

    async fn run(&self, trip: RoundTrip, prompt: &str) -> Result<(), AppError> {
        let (result, _) = trip.ask(prompt).await?;
        print_result(&result, false);
        Ok(())
    }
}

/// Answer on stdout, everything else on stderr
fn print_result(result: &RoundTripResult, streamed: bool) {
    match &result.outcome {
        Outcome::Done { text } | Outcome::Incomplete { partial: text, .. } => {
            if streamed {
                println!();
            } else {
                println!("{}", text);
            }
        }
        Outcome::Structured { value, .. } => {
            println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()));
        }
        Outcome::Refusal { .. } | Outcome::Denied { .. } => {}
    }
    if let Some(id) = &result.response_id {
        eprintln!("{}", style(format!("response {} ({} submission(s))", id, result.submissions)).dim());
    }
}

/// Split a `KEY=VALUE` header argument
pub fn parse_header(header: &str) -> Result<(String, String), AppError> {
    match header.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.trim().to_string())),
        _ => Err(format!("invalid header '{}', expected KEY=VALUE", header).into()),
    }
}

/// Whether `relay chat` can offer its weather tool on this backend
pub fn chat_declares_tools(backend: BackendKind, stream: bool) -> bool {
    !(stream && backend == BackendKind::Chat)
}

/// Standing decisions of `relay mcp`, deny rules are checked first
pub fn consent_rules(label: &str, trust: &[String], deny: &[String], yes: bool) -> ConsentRules {
    let rules = deny
        .iter()
        .map(|tool| ConsentRule::deny(label, tool.as_str()).with_description(format!("{} is denied by --deny", tool)))
        .chain(trust.iter().map(|tool| ConsentRule::allow(label, tool.as_str())))
        .fold(ConsentRules::new(), ConsentRules::rule);

    if yes {
        rules.approve_all()
    } else {
        rules
    }
}
