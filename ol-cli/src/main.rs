use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use colored::Colorize;
use ol_core::config::{Config, ModelKind};
use ol_core::input::{self, ClassifiedFiles};
use ol_core::provider::{CompletionRequest, OllamaClient};
use ol_core::{host, resolve_base_url};
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const EXAMPLES: &str = "\
Examples:
  ol \"Explain this code\" main.rs
  ol -m codellama \"Review for security issues\" src/lib.rs
  ol \"What's in this image?\" image.jpg

  # With a remote Ollama instance:
  OLLAMA_HOST=http://server:11434 ol \"Your prompt\" file.txt
  ol -h server -p 11434 -m llama3.2 \"Your prompt\" file.txt
  ol -h localhost -p 11435 \"Hello\"";

// `-h` is the host flag, so clap's short help is disabled and `--help`
// re-added by hand.
#[derive(Parser)]
#[command(name = "ol")]
#[command(about = "Command-line wrapper around the Ollama HTTP API")]
#[command(version, disable_help_flag = true, after_help = EXAMPLES)]
struct Cli {
    #[arg(long, action = ArgAction::HelpLong, help = "Show this help message and exit")]
    help: Option<bool>,

    #[arg(short, long, help = "List models available on the Ollama host")]
    list: bool,

    #[arg(short, long, help = "Model to use (default: from config)")]
    model: Option<String>,

    #[arg(short, long, help = "Show debug information")]
    debug: bool,

    #[arg(short = 'h', long, help = "Ollama host (default: localhost)")]
    host: Option<String>,

    #[arg(short, long, help = "Ollama port (default: 11434)")]
    port: Option<u16>,

    #[arg(
        long,
        value_names = ["TYPE", "MODEL"],
        num_args = 2,
        help = "Set default model for type (text or vision)"
    )]
    set_default_model: Option<Vec<String>>,

    #[arg(
        long,
        value_names = ["TYPE", "TEMP"],
        num_args = 2,
        help = "Set default temperature for type (text or vision)"
    )]
    set_default_temperature: Option<Vec<String>>,

    #[arg(long, help = "Temperature for this invocation (0.0-2.0, overrides default)")]
    temperature: Option<f64>,

    #[arg(help = "Prompt to send to Ollama (optional if files are provided)")]
    prompt: Option<String>,

    #[arg(help = "Files to inject into the prompt")]
    files: Vec<String>,
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "warn,ol_core=debug,ol_cli=debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let env_host = std::env::var(host::OLLAMA_HOST_VAR).ok();
    let base_url = resolve_base_url(cli.host.as_deref(), cli.port, env_host.as_deref());
    let mut config = Config::load_default();

    if let Some(args) = &cli.set_default_model {
        let kind: ModelKind = args[0].parse()?;
        config.set_model_for(kind, &args[1]);
        config.save();
        println!("Default {} model set to: {}", kind.as_str(), args[1].cyan());
        return Ok(());
    }

    if let Some(args) = &cli.set_default_temperature {
        let kind: ModelKind = args[0].parse()?;
        let temperature: f64 = args[1]
            .parse()
            .with_context(|| format!("temperature must be a number, got '{}'", args[1]))?;
        config.set_temperature_for(kind, temperature)?;
        config.save();
        println!("Default {} temperature set to: {}", kind.as_str(), temperature);
        return Ok(());
    }

    let client = OllamaClient::new(&base_url);

    if cli.list {
        return list_models(&client).await;
    }

    let files: Vec<PathBuf> = cli
        .files
        .iter()
        .map(|f| input::expand_user(Path::new(f)))
        .collect();

    let (prompt, files) = promote_file_arg(cli.prompt.clone(), files);
    let mut prompt = combine_prompt(prompt, read_stdin());

    let mut model = cli.model.clone();
    if prompt.is_none() && !files.is_empty() {
        let (kind, default_prompt) = prompt_for_file(&files[0], &config)?;
        prompt = Some(default_prompt);
        if model.is_none() {
            model = Some(config.model_for(kind));
        }
    }

    let Some(prompt) = prompt else {
        display_defaults(&config, &base_url);
        return Ok(());
    };

    let inputs = input::classify_files(&files)?;
    run(&client, &mut config, cli.temperature, model, prompt, inputs).await
}

/// Resolve the remaining request parameters, stream the response to stdout,
/// and record the last-used model on success.
async fn run(
    client: &OllamaClient,
    config: &mut Config,
    temperature_flag: Option<f64>,
    model: Option<String>,
    prompt: String,
    inputs: ClassifiedFiles,
) -> Result<()> {
    // Vision defaults apply only when every attached file is an image.
    let kind = if !inputs.images.is_empty() && inputs.texts.is_empty() {
        ModelKind::Vision
    } else {
        ModelKind::Text
    };

    let model = model.unwrap_or_else(|| config.model_for(kind));
    let temperature = match temperature_flag {
        Some(t) => {
            if !(0.0..=2.0).contains(&t) {
                bail!("temperature must be between 0.0 and 2.0, got {t}");
            }
            t
        }
        None => config.temperature_for(kind),
    };

    let full_prompt = input::assemble_prompt(&prompt, &inputs.texts)?;
    let images = inputs
        .images
        .iter()
        .map(|p| input::encode_image(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    debug!(
        model = %model,
        kind = kind.as_str(),
        temperature,
        prompt_len = full_prompt.len(),
        image_count = images.len(),
        base_url = client.base_url(),
        "resolved request"
    );

    let request = CompletionRequest::new(model.clone(), full_prompt)
        .with_temperature(temperature)
        .with_images(images);

    let mut stdout = std::io::stdout();
    client
        .stream(
            &request,
            Box::new(move |fragment| {
                write!(stdout, "{fragment}")?;
                stdout.flush()
            }),
        )
        .await?;
    println!();

    // Persisted once, and only after a successful stream.
    config.set_last_used_model(Some(&model));
    config.save();
    Ok(())
}

/// Read piped stdin verbatim. None when stdin is a TTY.
fn read_stdin() -> Option<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return None;
    }
    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer).ok()?;
    Some(buffer)
}

/// A first positional that names an existing file was meant as a file, not a
/// prompt: move it to the front of the file list.
fn promote_file_arg(
    prompt: Option<String>,
    mut files: Vec<PathBuf>,
) -> (Option<String>, Vec<PathBuf>) {
    if let Some(candidate) = &prompt {
        if candidate.len() < 255 && !candidate.contains('\n') {
            let expanded = input::expand_user(Path::new(candidate));
            if expanded.exists() {
                files.insert(0, expanded);
                return (None, files);
            }
        }
    }
    (prompt, files)
}

/// Combine the prompt argument with piped stdin. Trailing newlines are
/// trimmed from stdin; empty stdin leaves the prompt untouched.
fn combine_prompt(prompt: Option<String>, stdin_input: Option<String>) -> Option<String> {
    let stdin_input = stdin_input
        .map(|s| s.trim_end_matches('\n').to_string())
        .filter(|s| !s.is_empty());
    match (prompt, stdin_input) {
        (Some(p), Some(s)) => Some(format!("{p}\n\n{s}")),
        (None, Some(s)) => Some(s),
        (p, None) => p,
    }
}

/// Model kind and default prompt implied by a file when no prompt was given.
fn prompt_for_file(path: &Path, config: &Config) -> Result<(ModelKind, String)> {
    if input::is_image_file(path)? {
        let prompt = config
            .default_prompt_for(path)
            .unwrap_or_else(|| "What do you see in this image?".to_string());
        Ok((ModelKind::Vision, prompt))
    } else {
        let prompt = config
            .default_prompt_for(path)
            .unwrap_or_else(|| format!("Please analyze this file: {}", path.display()));
        Ok((ModelKind::Text, prompt))
    }
}

async fn list_models(client: &OllamaClient) -> Result<()> {
    println!("{} Fetching models from {}...", "→".blue(), client.base_url());
    println!();

    let models = client
        .list_models()
        .await
        .context("Failed to list models from Ollama. Is it running?")?;

    if models.is_empty() {
        println!(
            "{}",
            "No models found. Pull a model with 'ollama pull <model>'".yellow()
        );
        return Ok(());
    }

    println!("{}", "Available models:".bold().green());
    println!();
    for model in models {
        let size_gb = model.size as f64 / (1024.0 * 1024.0 * 1024.0);
        println!("  {} {} ({:.2} GB)", "•".cyan(), model.name.bold(), size_gb);
    }
    Ok(())
}

fn display_defaults(config: &Config, base_url: &str) {
    println!("{}", "Current Configuration:".bold().green());
    println!("  Host:                       {base_url}");
    println!(
        "  Default Text Model:         {}",
        config.model_for(ModelKind::Text).cyan()
    );
    println!(
        "  Default Vision Model:       {}",
        config.model_for(ModelKind::Vision).cyan()
    );
    println!(
        "  Default Text Temperature:   {}",
        config.temperature_for(ModelKind::Text)
    );
    println!(
        "  Default Vision Temperature: {}",
        config.temperature_for(ModelKind::Vision)
    );
    match config.last_used_model() {
        Some(model) => println!("  Last Used Model:            {}", model.cyan()),
        None => println!("  Last Used Model:            None"),
    }
}
