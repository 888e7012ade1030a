mod args;

use args::{Args, Mode};
use hand_recognizer::recognition::{
    DirectoryReferenceProvider, FrameSequenceSource, RecognitionEvent, RecognitionResult,
    Recognizer, RecognizerConfig, ScannerState, create_recognition_channels, persistence,
};
use std::path::Path;
use std::sync::Arc;

fn main() {
    let Some(args) = Args::parse() else {
        return;
    };

    let level = if args.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(args)) {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> RecognitionResult<()> {
    let mut config = match &args.config {
        Some(path) => RecognizerConfig::load(path)?,
        None => RecognizerConfig::default(),
    };
    config.debug_enabled |= args.debug_mode;

    match args.mode {
        Mode::Calibrate { references } => {
            let labels = args.labels.unwrap_or_default();
            calibrate(config, labels, &references, &args.templates).await
        }
        Mode::Scan {
            frames,
            loop_playback,
        } => scan(config, args.labels, &frames, loop_playback, &args.templates).await,
        Mode::Inspect => inspect(config, &args.templates).await,
    }
}

async fn calibrate(
    config: RecognizerConfig,
    labels: Vec<String>,
    references: &Path,
    templates: &Path,
) -> RecognitionResult<()> {
    let recognizer = Recognizer::new(config)?;
    recognizer.set_labels(labels).await?;

    println!("📥 Calibrating from reference images in {:?}", references);
    let provider = Arc::new(DirectoryReferenceProvider::new(references));
    let report = recognizer.calibrate_from_references(provider).await?;

    for label in &report.calibrated {
        println!("   ✅ {}", label);
    }
    for (label, reason) in &report.failed {
        println!("   ❌ {}: {}", label, reason);
    }

    let written = recognizer.save_templates(templates).await?;
    println!("💾 {} templates written to {:?}", written, templates);
    if !recognizer.is_calibrated().await {
        println!(
            "⚠️ Only {} labels calibrated; scanning needs {}",
            report.success_count(),
            recognizer.config().min_calibrated_labels
        );
    }
    Ok(())
}

/// Recognizer loaded from `templates`. Without explicit labels the set is
/// taken from the stored records, which then must cover every label.
async fn load_recognizer(
    config: RecognizerConfig,
    labels: Option<Vec<String>>,
    templates: &Path,
) -> RecognitionResult<Recognizer> {
    let labels = match labels {
        Some(labels) => labels,
        None => persistence::load_templates(templates)
            .await?
            .templates
            .into_iter()
            .map(|t| t.label)
            .collect(),
    };

    let recognizer = Recognizer::new(config)?;
    recognizer.set_labels(labels).await?;
    let report = recognizer.load_templates(templates).await?;
    for (path, reason) in &report.skipped {
        println!("   ⚠️ Skipped {:?}: {}", path, reason);
    }
    println!("📂 {} templates loaded from {:?}", report.templates.len(), templates);
    Ok(recognizer)
}

async fn inspect(config: RecognizerConfig, templates: &Path) -> RecognitionResult<()> {
    let report = persistence::load_templates(templates).await?;
    println!("📂 {} templates in {:?}", report.templates.len(), templates);
    for template in &report.templates {
        println!(
            "   {:<24} fingerprint={} histograms={}",
            template.label,
            template.normal_fingerprint.len(),
            if template.has_histograms() { "yes" } else { "no (legacy)" }
        );
    }
    for (path, reason) in &report.skipped {
        println!("   ⚠️ {:?}: {}", path, reason);
    }
    if config.debug_enabled {
        println!("{:#?}", config);
    }
    Ok(())
}

async fn scan(
    config: RecognizerConfig,
    labels: Option<Vec<String>>,
    frames: &Path,
    loop_playback: bool,
    templates: &Path,
) -> RecognitionResult<()> {
    let interval = config.scan_interval();
    let (tx, mut rx) = create_recognition_channels();
    let recognizer = load_recognizer(config, labels, templates).await?.with_event_sender(tx);

    let source = Arc::new(FrameSequenceSource::from_directory(frames, loop_playback)?);
    if source.is_empty() {
        println!("❌ No frames found in {:?}", frames);
        return Ok(());
    }

    recognizer.start(Arc::clone(&source)).await?;
    println!("🔍 Scanning {} frames (Ctrl+C to stop)", source.len());

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = rx.recv() => match event {
                RecognitionEvent::StateChanged(state) => println!("🃏 {}", state),
                RecognitionEvent::FramesMissing(count) => println!("⚠️ {} scans without a frame", count),
                RecognitionEvent::Error(e) => println!("❌ {}", e),
                RecognitionEvent::ScannerStateChanged(ScannerState::Idle) => break,
                _ => {}
            },
            _ = ticker.tick() => {
                if source.is_exhausted() {
                    // Let the last frame's scan land before stopping
                    tokio::time::sleep(interval * 2).await;
                    while let Ok(RecognitionEvent::StateChanged(state)) = rx.try_recv() {
                        println!("🃏 {}", state);
                    }
                    break;
                }
            }
        }
    }

    recognizer.stop();
    println!("⏹️ Final state: {}", recognizer.current_state());
    Ok(())
}
