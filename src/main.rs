use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use skill_activator::{
    cli::{describe_rule, print_error, print_formatted_block, print_success},
    config::{Config, PROJECT_CONFIG_FILE},
    Activation, ActivationOutcome, ActivationPipeline, ContextGatherer, HookInput, HookResponse,
    Rule, RuleStore, SkillDirectory, BLOCK_EXIT_CODE,
};

#[derive(Parser, Debug)]
#[command(name = "skill-activator")]
#[command(about = "プロンプトに応じてスキルを自動注入するフック")]
#[command(version)]
struct Args {
    /// 設定ファイルパス
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// プロジェクトルートディレクトリ
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// ルールファイル（設定ファイルより優先）
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// スキルディレクトリ（設定ファイルより優先）
    #[arg(long, global = true)]
    skills_dir: Option<PathBuf>,

    /// 詳細ログを表示 (INFO level)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// プロンプトを評価し、拡張したプロンプトを標準出力に書き出す
    Activate {
        /// プロンプト（省略時は標準入力から読む）
        prompt: Option<String>,

        /// 参照中のファイル（複数指定可）
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// 結果をJSONで出力
        #[arg(long)]
        json: bool,
    },
    /// フックとして実行（標準入力のJSONを読み、応答JSONを書き出す）
    Hook,
    /// ルールファイルを検証して要約を表示
    Check,
    /// ルール一覧を表示
    List,
    /// デフォルト設定ファイルを書き出す
    InitConfig {
        /// 出力先（省略時はプロジェクト内の既定位置）
        path: Option<PathBuf>,
    },
}

/// 読み込み済みのルールと各ステージ
struct App {
    store: Arc<RuleStore>,
    skills: Arc<SkillDirectory>,
    pipeline: ActivationPipeline,
    gatherer: ContextGatherer,
}

impl App {
    /// ルールの説明。なければスキルファイルのfrontmatterから
    async fn describe(&self, rule: &Rule) -> Option<String> {
        match &rule.description {
            Some(description) => Some(description.clone()),
            None => self.skills.description(&rule.name).await,
        }
    }

    fn load(args: &Args, project_root: &Path) -> Result<Self> {
        let config = load_config(args, project_root);
        let store = Arc::new(config.load_rules(project_root, args.rules.as_deref())?);

        let skills_dir = args
            .skills_dir
            .clone()
            .unwrap_or_else(|| config.skills_dir(project_root));
        tracing::info!("Skill directory: {}", skills_dir.display());

        let skills = Arc::new(SkillDirectory::new(skills_dir));
        let pipeline = ActivationPipeline::new(Arc::clone(&store), skills.clone())
            .with_max_content_bytes(config.matcher.max_content_bytes);
        let gatherer = ContextGatherer::from_config(project_root, &config.context);

        Ok(Self {
            store,
            skills,
            pipeline,
            gatherer,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // トレーシング初期化（デフォルトはWARN、--verboseでINFO）。標準出力は結果専用
    let args = Args::parse();
    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let project_root = args
        .project
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    tracing::info!("skill-activator v{} starting...", skill_activator::VERSION);
    tracing::info!("Project root: {}", project_root.display());

    match &args.command {
        Commands::InitConfig { path } => {
            let path = path
                .clone()
                .unwrap_or_else(|| project_root.join(PROJECT_CONFIG_FILE));
            if path.exists() {
                bail!("Config file already exists: {}", path.display());
            }
            Config::write_default(&path)?;
            print_success(&format!("Created default config at {}", path.display()));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Hook => {
            let raw = read_stdin().await?;
            let input = HookInput::parse(&raw)?;
            let root = input.cwd.clone().unwrap_or(project_root);
            if let Some(session) = &input.session_id {
                tracing::debug!("Hook invoked for session {}", session);
            }

            let app = App::load(&args, &root)?;
            let context = app.gatherer.gather(&input.prompt, &input.files).await;
            let activation = app.pipeline.run(&context).await;
            log_warnings(&activation);

            println!("{}", HookResponse::from_outcome(&activation.outcome).to_json()?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Activate { prompt, files, json } => {
            let prompt = match prompt {
                Some(p) => p.clone(),
                None => read_stdin().await?,
            };

            let app = App::load(&args, &project_root)?;
            let context = app.gatherer.gather(&prompt, files).await;
            let activation = app.pipeline.run(&context).await;

            if *json {
                let output = serde_json::to_string_pretty(&activation)
                    .context("Failed to serialize activation result")?;
                println!("{}", output);
            } else {
                log_warnings(&activation);
                report(&activation);
            }
            Ok(exit_code(&activation))
        }
        Commands::Check => {
            let app = App::load(&args, &project_root)?;
            println!("{} rules loaded", app.store.len());
            for rule in app.store.iter() {
                println!("  {}", describe_rule(rule));
                if let Some(description) = app.describe(rule).await {
                    println!("      {}", description);
                }
                if rule.is_inert() {
                    print_formatted_block("WARN", &format!("rule '{}' can never match", rule.name));
                }
            }

            let errors = app.store.pattern_errors();
            for err in &errors {
                print_formatted_block("WARN", &err.to_string());
            }
            if errors.is_empty() {
                print_success("Rules OK");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            let app = App::load(&args, &project_root)?;
            for rule in app.store.iter() {
                match app.describe(rule).await {
                    Some(description) => println!("{} - {}", rule.name, description),
                    None => println!("{}", rule.name),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// 設定ファイルを読み込み（失敗時はデフォルト）
fn load_config(args: &Args, project_root: &Path) -> Config {
    let loaded = match &args.config {
        Some(path) => Config::load_from_file(path),
        None => Config::load_default(project_root),
    };
    loaded.unwrap_or_else(|e| {
        tracing::warn!("Failed to load config file: {:#}, using defaults", e);
        Config::default()
    })
}

async fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("Failed to read from stdin")?;
    Ok(buf)
}

fn log_warnings(activation: &Activation) {
    for warning in &activation.warnings {
        tracing::warn!("{}", warning);
    }
}

/// 結果を表示。プロンプトは標準出力、それ以外は標準エラー
fn report(activation: &Activation) {
    match &activation.outcome {
        ActivationOutcome::PassThrough { prompt } => {
            println!("{}", prompt);
        }
        ActivationOutcome::Suggest { prompt, skills, .. } => {
            print_formatted_block("SKILL", &format!("Activated: {}", skills.join(", ")));
            println!("{}", prompt);
        }
        ActivationOutcome::Warn {
            prompt,
            skills,
            warning,
            ..
        } => {
            print_formatted_block("WARN", warning);
            if !skills.is_empty() {
                print_formatted_block("SKILL", &format!("Activated: {}", skills.join(", ")));
            }
            println!("{}", prompt);
        }
        ActivationOutcome::Block { message, .. } => {
            print_formatted_block("BLOCK", message);
        }
    }
}

fn exit_code(activation: &Activation) -> ExitCode {
    match activation.outcome {
        ActivationOutcome::Block { .. } => ExitCode::from(BLOCK_EXIT_CODE),
        _ => ExitCode::SUCCESS,
    }
}
