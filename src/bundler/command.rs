//! Bundler backed by an external bridge program
//!
//! The bridge receives `{"input": <request>, "output": <request>}` as JSON on
//! stdin, runs the real bundler, and reports failure through its exit status.
//! The first stderr line becomes the error message and the rest the snippet.
//!
//! Scoped class names found by the css-modules transform come back as stdout
//! lines of the form `{"styleExports": {"<module id>": {"<local>": "<scoped>"}}}`.
//! Any other stdout line is logged.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{Bundle, BundleError, BundleInfo, Bundler};
use crate::config::BundleRequest;
use crate::plugins::{ExportTokens, StyleStage};

/// Runs a bridge program for every write
#[derive(Debug, Clone)]
pub struct CommandBundler {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl CommandBundler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: PathBuf::from("."),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Directory the bridge runs in and output paths are resolved against
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = dir.into();
        self
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    fn name(&self) -> &str {
        &self.program
    }

    async fn rollup(&self, request: &BundleRequest) -> Result<Box<dyn Bundle>> {
        let input = serde_json::to_value(request).map_err(BundleError::from)?;

        Ok(Box::new(CommandBundle {
            bundler: self.clone(),
            input,
        }))
    }
}

/// Input options captured by [`CommandBundler::rollup`]
struct CommandBundle {
    bundler: CommandBundler,
    input: serde_json::Value,
}

#[async_trait]
impl Bundle for CommandBundle {
    async fn write(&self, request: &BundleRequest) -> Result<BundleInfo> {
        let CommandBundler { program, args, cwd } = &self.bundler;

        let payload = serde_json::to_vec(&json!({
            "input": self.input,
            "output": request,
        }))
        .map_err(BundleError::from)?;

        debug!("Running bundler: {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BundleError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // The bridge may exit without reading its input
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("Bundler did not read its request: {}", e);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| BundleError::Spawn {
                program: program.clone(),
                source,
            })?;

        let style = request.style_stage();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            match serde_json::from_str::<BridgeMessage>(line) {
                Ok(message) => record_exports(style, message.style_exports),
                Err(_) => debug!("{}: {}", program, line),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let (message, snippet) = match stderr.split_once('\n') {
                Some((first, rest)) if !rest.trim().is_empty() => {
                    (first.trim().to_string(), Some(rest.trim().to_string()))
                }
                _ if stderr.is_empty() => ("no output".to_string(), None),
                _ => (stderr.to_string(), None),
            };

            return Err(BundleError::Failed {
                program: program.clone(),
                status: output.status.to_string(),
                message,
                snippet,
            }
            .into());
        }

        let output_path = request.dest.as_ref().map(|dest| cwd.join(dest));
        let size = match &output_path {
            Some(path) => tokio::fs::metadata(path).await.ok().map(|m| m.len()),
            None => None,
        };

        Ok(BundleInfo { output_path, size })
    }
}

/// Structured stdout line from the bridge
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeMessage {
    style_exports: BTreeMap<String, ExportTokens>,
}

fn record_exports(style: Option<&StyleStage>, exports: BTreeMap<String, ExportTokens>) {
    let Some(style) = style else {
        debug!("Bridge reported style exports without a style stage");
        return;
    };

    for (id, tokens) in exports {
        if style.handles(&id) {
            style.capture(&id, tokens);
        } else {
            debug!("Ignoring style exports for non-style module {}", id);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{BuildOptions, EffectiveConfig, OutputFormat};
    use crate::plugins::{assemble, BuildSession, Mode};
    use pretty_assertions::assert_eq;

    fn request(dest: Option<&str>) -> BundleRequest {
        let caller = BuildOptions {
            dest: dest.map(String::from),
            format: Some(OutputFormat::Es),
            watch: Some(true),
            ..BuildOptions::default()
        };
        EffectiveConfig::merge(Vec::new(), BuildOptions::default(), caller)
            .into_request()
            .0
    }

    #[tokio::test]
    async fn test_bridge_receives_request_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = CommandBundler::new("sh")
            .args(["-c", "cat > request.json && echo 'bundle' > out.js"])
            .current_dir(dir.path());

        let request = request(Some("out.js"));
        let bundle = bundler.rollup(&request).await.unwrap();
        let info = bundle.write(&request).await.unwrap();

        assert_eq!(info.output_path, Some(dir.path().join("out.js")));
        assert_eq!(info.size, Some(7));

        let sent: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("request.json")).unwrap())
                .unwrap();
        assert_eq!(sent["input"]["format"], "es");
        assert_eq!(sent["output"]["dest"], "out.js");
        assert!(sent["input"].get("watch").is_none());
        assert!(sent["output"].get("watch").is_none());
    }

    #[tokio::test]
    async fn test_bridge_reports_style_exports() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"cat > /dev/null
echo 'bundling'
echo '{"styleExports":{"src/card.css":{"title":"card__title___3f"}}}'
echo '{"styleExports":{"src/main.js":{"x":"main_x"}}}'"#;
        let bundler = CommandBundler::new("sh")
            .args(["-c", script])
            .current_dir(dir.path());

        let session = BuildSession::new(Mode::Development);
        let (request, _) =
            EffectiveConfig::merge(assemble(&session), BuildOptions::default(), BuildOptions::default())
                .into_request();
        let bundle = bundler.rollup(&request).await.unwrap();
        bundle.write(&request).await.unwrap();

        let style = request.style_stage().unwrap();
        assert_eq!(
            style.export_for("src/card.css").unwrap()["title"],
            "card__title___3f"
        );
        assert_eq!(style.export_for("src/main.js"), None);
        assert_eq!(session.exports().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_carries_snippet() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = CommandBundler::new("sh")
            .args([
                "-c",
                "echo \"Could not resolve './missing'\" >&2; echo \"2: import './missing';\" >&2; exit 2",
            ])
            .current_dir(dir.path());

        let request = request(None);
        let bundle = bundler.rollup(&request).await.unwrap();
        let err = bundle.write(&request).await.unwrap_err();

        let bundle_err = err.downcast_ref::<BundleError>().unwrap();
        assert_eq!(bundle_err.snippet(), Some("2: import './missing';"));
        assert!(err.to_string().contains("Could not resolve './missing'"));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let bundler = CommandBundler::new("rollkit-bridge-that-does-not-exist");
        let request = request(None);
        let bundle = bundler.rollup(&request).await.unwrap();
        let err = bundle.write(&request).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BundleError>(),
            Some(BundleError::Spawn { .. })
        ));
    }
}
