//! Build command implementation

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::bundler::{BundleInfo, CommandBundler, FsWatcher};
use crate::config::{
    load_manifest, BuildOptions, EffectiveConfig, ExportsMode, OutputFormat, SourceMap,
};
use crate::driver::{Driver, Execution, WatchSession};
use crate::plugins::{assemble, BuildSession};
use crate::reporter::Reporter;
use crate::utils::{format_duration, format_size};

/// Caller-supplied build options, the highest-precedence layer
#[derive(Args, Debug, Clone, Default)]
pub struct OptionArgs {
    /// Entry module
    #[arg(short, long)]
    pub entry: Option<String>,

    /// Output file
    #[arg(short = 'o', long)]
    pub dest: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Global name for iife/umd bundles
    #[arg(short = 'n', long = "name")]
    pub module_name: Option<String>,

    /// How entry exports are exposed
    #[arg(long, value_enum)]
    pub exports: Option<ExportsMode>,

    /// Emit "use strict"
    #[arg(long)]
    pub strict: Option<bool>,

    /// Source maps: true, false, inline, or a file path
    #[arg(short = 'm', long, num_args = 0..=1, default_missing_value = "true", value_parser = SourceMap::parse)]
    pub sourcemap: Option<SourceMap>,

    /// Rebuild when files change
    #[arg(short, long)]
    pub watch: bool,
}

impl From<&OptionArgs> for BuildOptions {
    fn from(args: &OptionArgs) -> Self {
        Self {
            entry: args.entry.clone(),
            dest: args.dest.clone(),
            format: args.format,
            module_name: args.module_name.clone(),
            exports: args.exports,
            strict: args.strict,
            source_map: args.sourcemap.clone(),
            source_map_file: None,
            plugins: Vec::new(),
            // Unset rather than false, so the manifest can turn watching on
            watch: args.watch.then_some(true),
        }
    }
}

/// Build the project once, or keep rebuilding with --watch
#[derive(Args, Debug)]
pub struct BuildCommand {
    #[command(flatten)]
    pub options: OptionArgs,

    /// Bridge program that runs the bundler; it reads the request as JSON on stdin
    #[arg(long, env = "ROLLKIT_BUNDLER", default_value = "rollkit-bridge")]
    pub bundler: String,

    /// Extra argument for the bridge program (repeatable)
    #[arg(long = "bundler-arg", allow_hyphen_values = true)]
    pub bundler_args: Vec<String>,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &Path) -> Result<()> {
        let session = BuildSession::from_env();
        let config = resolve_config(config_path, &self.options, &session)?;
        let root = project_root(config_path);

        let bundler = CommandBundler::new(&self.bundler)
            .args(self.bundler_args.iter().cloned())
            .current_dir(&root);
        let driver = Driver::new(
            Arc::new(bundler),
            Arc::new(FsWatcher::new(&root)),
            Reporter::console(),
        );

        let verb = if config.watch { "Watching" } else { "Building" };
        eprintln!("{} {} {}...", "→".blue(), verb, config.entry.cyan());

        let start = Instant::now();
        let spinner = (!config.watch).then(|| spinner(session.mode().as_str()));
        let result = driver.run(config).await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        match result? {
            Execution::Built(info) => print_summary(&info, start.elapsed()),
            Execution::Watching(watch) => wait_for_interrupt(watch).await?,
        }

        Ok(())
    }
}

/// Merge defaults, the manifest at `config_path`, and `options`
pub fn resolve_config(
    config_path: &Path,
    options: &OptionArgs,
    session: &BuildSession,
) -> Result<EffectiveConfig> {
    info!("Loading manifest from {}", config_path.display());
    let manifest = load_manifest(config_path)?;

    Ok(EffectiveConfig::merge(
        assemble(session),
        manifest,
        options.into(),
    ))
}

/// Directory containing the manifest
fn project_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn wait_for_interrupt(watch: WatchSession) -> Result<()> {
    supervise(watch, tokio::signal::ctrl_c()).await
}

/// Keep `watch` running until `interrupt` fires. Errs if the watcher ends on
/// its own, before or after the first build.
async fn supervise<F>(mut watch: WatchSession, interrupt: F) -> Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let mut ready = watch.ready();

    // A session that started and then ended still counts as started
    tokio::select! {
        biased;
        _ = ready.wait() => {
            eprintln!("  {} Press {} to stop\n", "•".dimmed(), "Ctrl+C".yellow());
        }
        _ = watch.join() => {
            anyhow::bail!("watcher stopped before the first build started");
        }
    }

    let interrupted = tokio::select! {
        signal = interrupt => Some(signal),
        _ = watch.join() => None,
    };

    match interrupted {
        Some(signal) => {
            info!("Interrupted, stopping watch session");
            watch.stop().await;
            signal.context("Failed to listen for Ctrl+C")
        }
        None => anyhow::bail!("watcher stopped unexpectedly"),
    }
}

fn spinner(mode: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("bundling ({})", mode));
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn print_summary(info: &BundleInfo, elapsed: Duration) {
    eprintln!(
        "\n{} Built in {}\n",
        "✓".green().bold(),
        format_duration(elapsed)
    );

    if let Some(path) = &info.output_path {
        let size = info.size.map(|s| format_size(s as usize)).unwrap_or_default();
        eprintln!(
            "  {} {} {}\n",
            "•".dimmed(),
            path.display().to_string().cyan(),
            size.dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::WatchEvent;
    use crate::plugins::Mode;
    use crate::reporter::MemorySink;
    use clap::Parser;
    use tokio::sync::mpsc;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        options: OptionArgs,
    }

    fn parse(args: &[&str]) -> OptionArgs {
        Harness::parse_from(std::iter::once("rollkit").chain(args.iter().copied())).options
    }

    #[test]
    fn test_unset_flags_leave_layer_empty() {
        let options = BuildOptions::from(&parse(&[]));
        assert_eq!(options, BuildOptions::default());
    }

    #[test]
    fn test_flags_map_to_layer() {
        let options = BuildOptions::from(&parse(&[
            "-f", "esm", "-o", "dist/app.js", "--name", "App", "--strict", "false", "-m", "-w",
        ]));

        assert_eq!(options.format, Some(OutputFormat::Es));
        assert_eq!(options.dest.as_deref(), Some("dist/app.js"));
        assert_eq!(options.module_name.as_deref(), Some("App"));
        assert_eq!(options.strict, Some(false));
        assert_eq!(options.source_map, Some(SourceMap::Enabled(true)));
        assert_eq!(options.watch, Some(true));
    }

    #[test]
    fn test_inline_sourcemap() {
        let options = BuildOptions::from(&parse(&["--sourcemap", "inline"]));
        assert_eq!(options.source_map, Some(SourceMap::Target("inline".into())));
    }

    #[test]
    fn test_resolve_config_reads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        std::fs::write(
            &manifest,
            r#"{"rollup": {"format": "umd", "moduleName": "Lib", "watch": true}}"#,
        )
        .unwrap();

        let session = BuildSession::new(Mode::Development);
        let config = resolve_config(&manifest, &parse(&["--name", "Override"]), &session).unwrap();

        assert_eq!(config.format, OutputFormat::Umd);
        assert_eq!(config.module_name.as_deref(), Some("Override"));
        assert!(config.watch);
        assert_eq!(config.plugins[0].name(), "postcss");
    }

    #[test]
    fn test_project_root() {
        assert_eq!(project_root(Path::new("package.json")), PathBuf::from("."));
        assert_eq!(
            project_root(Path::new("app/package.json")),
            PathBuf::from("app")
        );
    }

    fn session(events: crate::bundler::EventStream) -> WatchSession {
        WatchSession::spawn(events, "iife".into(), Reporter::new(Arc::new(MemorySink::new())))
    }

    #[tokio::test]
    async fn test_supervise_reports_watcher_ending_after_start() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(WatchEvent::Starting).await.unwrap();
        tx.send(WatchEvent::BuildStart).await.unwrap();
        drop(tx);

        let err = supervise(session(rx), std::future::pending())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "watcher stopped unexpectedly");
    }

    #[tokio::test]
    async fn test_supervise_reports_watcher_ending_before_start() {
        let (tx, rx) = mpsc::channel(8);
        drop(tx);

        let err = supervise(session(rx), std::future::pending())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("before the first build"));
    }

    #[tokio::test]
    async fn test_supervise_stops_on_interrupt() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(WatchEvent::Starting).await.unwrap();

        supervise(session(rx), async { Ok(()) }).await.unwrap();
        assert!(tx.is_closed());
    }
}
