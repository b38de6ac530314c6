use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use frameqa::ask::{FrameQuestion, SamplingParams};
use frameqa::batch::BatchDispatcher;
use frameqa::collect::{CollectOptions, collect_answers, write_answers_csv};
use frameqa::config::{Config, MediaMode, ProviderKind};
use frameqa::dispatch::registry::build_provider;
use frameqa::extract::{LetterExtraction, load_answer_items};
use frameqa::frames::{FrameDirStore, MediaSource, VideoUriSource};
use frameqa::gate::ConcurrencyGate;
use frameqa::prompt::PromptTemplate;
use frameqa::sink::JsonDirSink;
use frameqa::work::{IdRange, LoadOptions, load_work_items};

#[derive(Parser)]
#[command(
    name = "frameqa",
    version,
    about = "Ask multimodal models multiple-choice questions about dashcam clips"
)]
struct Cli {
    /// TOML config file (default: ./frameqa.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer every question in the CSV and write one JSON file per id
    Infer {
        /// CSV with `id` and `question` columns
        #[arg(long)]
        questions: Option<PathBuf>,
        /// Directory holding one frame folder per id
        #[arg(long)]
        frames: Option<PathBuf>,
        #[arg(long, value_enum)]
        media: Option<MediaMode>,
        /// Remote video URI with an `{id}` placeholder (video mode)
        #[arg(long)]
        video_uri: Option<String>,
        /// Output directory for `<id>_result.json`
        #[arg(long)]
        out: Option<PathBuf>,
        /// Maximum calls in flight
        #[arg(long)]
        concurrency: Option<usize>,
        /// Only ids in this inclusive range, e.g. 51-251
        #[arg(long)]
        range: Option<IdRange>,
        #[arg(long, value_enum)]
        provider: Option<ProviderKind>,
        #[arg(long)]
        model: Option<String>,
        /// Model is a reasoning model (no sampling parameters)
        #[arg(long)]
        reasoning: bool,
    },
    /// Distill free-form answers into `<answer>X</answer>` with a small model
    Extract {
        /// Directory of answer artifacts
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Collect answer letters from artifacts into an `id,answer` CSV
    Collect {
        /// Directory of answer artifacts
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "all_answers.csv")]
        out: PathBuf,
        /// Ids read from artifacts, e.g. 51-251
        #[arg(long)]
        range: Option<IdRange>,
        /// Ids filled with the sentinel instead, e.g. 1-50
        #[arg(long)]
        sentinel_range: Option<IdRange>,
        #[arg(long)]
        sentinel: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Infer {
            questions,
            frames,
            media,
            video_uri,
            out,
            concurrency,
            range,
            provider,
            model,
            reasoning,
        } => {
            let run = &mut config.run;
            if let Some(v) = questions {
                run.questions = v;
            }
            if let Some(v) = frames {
                run.frames_dir = v;
            }
            if let Some(v) = media {
                run.media = v;
            }
            if let Some(v) = video_uri {
                run.video_uri_template = Some(v);
            }
            if let Some(v) = out {
                run.output_dir = v;
            }
            if let Some(v) = concurrency {
                run.max_concurrent = v;
            }
            if range.is_some() {
                run.id_range = range;
            }
            if let Some(v) = provider {
                config.provider.kind = v;
            }
            if model.is_some() {
                config.provider.model = model;
            }
            if reasoning {
                config.provider.reasoning = true;
            }
            infer(&config).await
        }
        Command::Extract {
            input,
            out,
            concurrency,
            model,
        } => {
            if let Some(v) = concurrency {
                config.extract.max_concurrent = v;
            }
            if model.is_some() {
                config.extract.provider.model = model;
            }
            extract(&config, input, out).await
        }
        Command::Collect {
            input,
            out,
            range,
            sentinel_range,
            sentinel,
        } => {
            if range.is_some() {
                config.collect.range = range;
            }
            if sentinel_range.is_some() {
                config.collect.sentinel_range = sentinel_range;
            }
            if let Some(v) = sentinel {
                config.collect.sentinel = v;
            }
            collect(&config, input, out)
        }
    }
}

async fn infer(config: &Config) -> anyhow::Result<()> {
    let run = &config.run;
    let items = load_work_items(
        &run.questions,
        &LoadOptions {
            id_width: run.id_width,
            id_range: run.id_range,
        },
    )
    .with_context(|| format!("failed to read questions from {}", run.questions.display()))?;

    if items.is_empty() {
        tracing::warn!("no questions to process");
        return Ok(());
    }

    let media: Arc<dyn MediaSource> = match run.media {
        MediaMode::Frames => {
            Arc::new(FrameDirStore::new(&run.frames_dir).with_prefix(run.frame_prefix.as_str()))
        }
        MediaMode::Video => {
            let Some(template) = &run.video_uri_template else {
                bail!("video mode needs video_uri_template (or --video-uri)");
            };
            Arc::new(VideoUriSource::new(template.as_str())?)
        }
    };

    let prompt = match &run.prompt_template {
        Some(t) => PromptTemplate::new(t.as_str()),
        None => PromptTemplate::for_media(run.media),
    };
    if !prompt.has_question_slot() {
        bail!("prompt_template must contain {{question}}");
    }

    let provider = build_provider(&config.provider)?;
    let call = FrameQuestion::new(
        provider,
        media,
        prompt,
        SamplingParams::from(&config.provider),
    );

    let sink = JsonDirSink::create(&run.output_dir).await?;
    let report = BatchDispatcher::new(Arc::new(call), Arc::new(gate_for(run.max_concurrent, config)))
        .run_into(items, &sink)
        .await;

    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        output = %sink.dir().display(),
        "inference finished"
    );
    if report.persist_errors > 0 {
        bail!("{} results could not be written", report.persist_errors);
    }
    Ok(())
}

async fn extract(config: &Config, input: PathBuf, out: PathBuf) -> anyhow::Result<()> {
    let items = load_answer_items(&input)
        .with_context(|| format!("failed to read answers from {}", input.display()))?;

    if items.is_empty() {
        tracing::warn!("no answers to extract");
        return Ok(());
    }

    let provider_cfg = &config.extract.provider;
    let call = LetterExtraction::new(
        build_provider(provider_cfg)?,
        SamplingParams::from(provider_cfg),
    );
    let gate = ConcurrencyGate::new(config.extract.max_concurrent);

    let sink = JsonDirSink::create(&out).await?;
    let report = BatchDispatcher::new(Arc::new(call), Arc::new(gate))
        .run_into(items, &sink)
        .await;

    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        output = %sink.dir().display(),
        "extraction finished"
    );
    if report.persist_errors > 0 {
        bail!("{} results could not be written", report.persist_errors);
    }
    Ok(())
}

fn collect(config: &Config, input: PathBuf, out: PathBuf) -> anyhow::Result<()> {
    let opts = CollectOptions::from_config(&config.collect, config.run.id_width);
    let report = collect_answers(&input, &opts)
        .with_context(|| format!("failed to collect answers from {}", input.display()))?;
    write_answers_csv(&out, &report.rows)?;

    tracing::info!(
        rows = report.rows.len(),
        missing = report.missing.len(),
        unparsed = report.unparsed.len(),
        output = %out.display(),
        "answers written"
    );
    Ok(())
}

fn gate_for(max_concurrent: usize, config: &Config) -> ConcurrencyGate {
    let gate = ConcurrencyGate::new(max_concurrent);
    match config.run.cooldown.policy() {
        Some((every, pause)) => gate.with_cooldown(every, pause),
        None => gate,
    }
}
