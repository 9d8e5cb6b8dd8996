use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::GatewayConfig;
use crate::models::ClassificationResult;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to launch classifier: {0}")]
    Launch(#[source] std::io::Error),
    #[error("classifier exited with {status}")]
    Exit { status: ExitStatus, stderr: String },
    #[error("classifier did not finish within {0:?}")]
    Timeout(Duration),
    #[error("classifier output is not a classification: {source}")]
    InvalidOutput {
        stdout: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClassifyError {
    /// Diagnostic text handed back to the caller on execution failures.
    pub fn details(&self) -> String {
        match self {
            ClassifyError::Exit { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &Path) -> Result<ClassificationResult, ClassifyError>;
}

/// Runs an external program once per image, passing the path as the last
/// argument and reading one JSON object from its stdout.
#[derive(Debug)]
pub struct ProcessClassifier {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ProcessClassifier {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.classifier_program.clone(),
            config.classifier_args.clone(),
            config.classifier_timeout,
        )
    }
}

#[async_trait]
impl Classifier for ProcessClassifier {
    async fn classify(&self, image: &Path) -> Result<ClassificationResult, ClassifyError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ClassifyError::Launch)?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ClassifyError::Timeout(limit))?,
            None => child.wait_with_output().await,
        }
        .map_err(ClassifyError::Launch)?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ClassifyError::Exit {
                status: output.status,
                stderr,
            });
        }
        if !stderr.is_empty() {
            tracing::debug!(program = %self.program, %stderr, "classifier stderr");
        }

        serde_json::from_str(stdout.trim())
            .map_err(|source| ClassifyError::InvalidOutput { stdout, source })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("classify.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn classifier(script: &Path, timeout: Option<Duration>) -> ProcessClassifier {
        ProcessClassifier::new("sh", vec![script.display().to_string()], timeout)
    }

    #[actix_web::test]
    async fn parses_successful_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = script(
            dir.path(),
            r#"echo 'Loading model' >&2
printf '{"class_number":3,"class_name":"Tomato_Healthy","confidence":0.97}'"#,
        );

        let result = classifier(&script, None)
            .classify(Path::new("/tmp/leaf.jpg"))
            .await
            .unwrap();
        assert_eq!(result.class_number, 3);
        assert_eq!(result.class_name, "Tomato_Healthy");
        assert_eq!(result.confidence, 0.97);
        assert!(result.extra.is_empty());
    }

    #[actix_web::test]
    async fn image_path_is_passed_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let script = script(
            dir.path(),
            r#"printf '{"class_number":0,"class_name":"%s","confidence":1.0}' "$1""#,
        );

        let odd = "/tmp/it's $(not) a;shell.jpg";
        let result = classifier(&script, None)
            .classify(Path::new(odd))
            .await
            .unwrap();
        assert_eq!(result.class_name, odd);
    }

    #[actix_web::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = script(
            dir.path(),
            r#"echo '{"error": "Inference failed: bad image"}' >&2
exit 1"#,
        );

        let err = classifier(&script, None)
            .classify(Path::new("/tmp/leaf.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Exit { .. }));
        assert_eq!(err.details(), "{\"error\": \"Inference failed: bad image\"}\n");
    }

    #[actix_web::test]
    async fn garbage_output_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let script = script(dir.path(), "echo 'not json'");

        let err = classifier(&script, None)
            .classify(Path::new("/tmp/leaf.jpg"))
            .await
            .unwrap_err();
        match err {
            ClassifyError::InvalidOutput { stdout, .. } => assert_eq!(stdout, "not json\n"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[actix_web::test]
    async fn missing_program_is_launch_failure() {
        let classifier = ProcessClassifier::new("/nonexistent/classifier-bin", vec![], None);
        let err = classifier.classify(Path::new("/tmp/leaf.jpg")).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Launch(_)));
        assert!(err.details().contains("failed to launch"));
    }

    #[actix_web::test]
    async fn hung_classifier_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = script(dir.path(), "sleep 5");

        let err = classifier(&script, Some(Duration::from_millis(200)))
            .classify(Path::new("/tmp/leaf.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Timeout(_)));
    }
}
