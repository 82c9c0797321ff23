//! 命令行入口

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, Subcommand};

use chatlingo::config::{load_runtime_config, ConfigManager, RuntimeConfig};
use chatlingo::content::dom;
use chatlingo::env::{gemini::ApiKey, generate_env_docs, EnvVar};
use chatlingo::error::ChatlingoResult;
use chatlingo::pipeline::{classify, is_translatable, should_translate, Criteria};
use chatlingo::secret::MemoryVault;
use chatlingo::settings::{
    ExtensionState, MemorySettingsStore, TranslationMode, TranslationSettings,
};
use chatlingo::translator::{DryRunTranslator, RemoteTranslator};
use chatlingo::{logging, ChatRuntime};

#[derive(Parser, Debug)]
#[command(name = "chatlingo", version, about = "Live-chat translation core", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the language class and eligibility of a message
    Classify {
        text: String,

        /// Translation mode: all, non_japanese, selected_languages, custom
        #[arg(short, long, default_value = "non_japanese")]
        mode: String,
    },

    /// Replay a saved chat page through the full pipeline and print the annotated HTML
    Replay {
        file: PathBuf,

        /// Use a translator that does not touch the network
        #[arg(long)]
        dry_run: bool,

        /// Page URL attached to error reports
        #[arg(long)]
        url: Option<String>,

        /// Initial grace period in milliseconds
        #[arg(long, default_value_t = 0)]
        grace_ms: u64,

        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the annotated HTML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Character encoding of the input file
        #[arg(short, long, default_value = "utf-8")]
        encoding: String,
    },

    /// Print the environment variable reference
    EnvDocs,

    /// Write an example configuration file
    InitConfig { path: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Command::Classify { text, mode } => run_classify(&text, &mode),
        Command::Replay {
            file,
            dry_run,
            url,
            grace_ms,
            config,
            output,
            encoding,
        } => run_replay(ReplayArgs {
            file,
            dry_run,
            url,
            grace_ms,
            config,
            output,
            encoding,
        }),
        Command::EnvDocs => {
            print!("{}", generate_env_docs());
            Ok(())
        }
        Command::InitConfig { path } => ConfigManager::generate_example_config(&path).map(|()| {
            println!("Wrote example configuration to {}", path.display());
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_classify(text: &str, mode: &str) -> ChatlingoResult<()> {
    let mode: TranslationMode =
        serde_json::from_value(serde_json::Value::String(mode.to_string()))?;
    let criteria = Criteria::new(mode);
    let translatable = is_translatable(text);
    let wanted = should_translate(text, &criteria);

    println!("language: {}", classify(text));
    println!("translatable: {}", translatable);
    println!("should_translate: {}", wanted);
    println!("eligible: {}", translatable && wanted);
    Ok(())
}

struct ReplayArgs {
    file: PathBuf,
    dry_run: bool,
    url: Option<String>,
    grace_ms: u64,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    encoding: String,
}

fn run_replay(args: ReplayArgs) -> ChatlingoResult<()> {
    let mut config: RuntimeConfig = match &args.config {
        Some(path) => ConfigManager::from_path(path)?.into_config(),
        None => load_runtime_config(),
    };
    config.grace.initial_ms = args.grace_ms;

    let (translator, secret) = build_translator(&config, args.dry_run)?;
    let settings = TranslationSettings {
        extension_state: ExtensionState::Enabled,
        api_key_set: true,
        ..config.defaults.clone()
    };

    let bytes = fs::read(&args.file)?;
    let page = dom::html_to_dom(&bytes, &args.encoding);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();

    let report = local.block_on(&runtime, async {
        let chat = ChatRuntime::new(
            config,
            Rc::new(MemorySettingsStore::new(settings)),
            Rc::new(MemoryVault::with_secret(secret)),
            translator,
            args.url,
        )
        .await?;
        chat.replay(&page).await
    })?;

    let summary = &report.summary;
    eprintln!(
        "batches: {}, translated: {} ({} from cache), suppressed: {}, skipped: {}, failed: {}",
        summary.batches,
        summary.translated,
        summary.from_cache,
        summary.suppressed,
        summary.skipped,
        summary.failed
    );

    match args.output {
        Some(path) => fs::write(path, report.html)?,
        None => println!("{}", report.html),
    }
    Ok(())
}

fn build_translator(
    config: &RuntimeConfig,
    dry_run: bool,
) -> ChatlingoResult<(Rc<dyn RemoteTranslator>, String)> {
    if dry_run {
        return Ok((Rc::new(DryRunTranslator::default()), "dry-run".to_string()));
    }

    let api_key = ApiKey::get()?;

    #[cfg(feature = "gemini")]
    {
        let translator = chatlingo::translator::GeminiTranslator::new(config.gemini.clone())?;
        Ok((Rc::new(translator), api_key))
    }

    #[cfg(not(feature = "gemini"))]
    {
        let _ = (config, api_key);
        Err(chatlingo::ChatlingoError::Config(
            "built without the gemini feature; use --dry-run".to_string(),
        ))
    }
}
