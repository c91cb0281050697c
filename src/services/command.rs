// Command compiler - runs the `contextforge` CLI as a child process
//
// Stdout and stderr lines are streamed into the run's sink as they arrive.
// Cancellation and the optional timeout both kill the child.

use crate::models::TaskRequest;
use crate::services::compiler::{CompileContext, CompileError, ProjectCompiler};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Compiler backed by the `contextforge` command line tool
///
/// Runs one child process per request and streams its stdout and stderr, line by
/// line, into the run's diagnostic sink. The process is raced against the run's
/// cancellation token and the optional timeout; either one kills the child.
///
/// `compile` blocks the calling thread on the given runtime handle, so it must be
/// called from a blocking worker thread (`spawn_blocking` or a plain thread), not
/// from inside an async task.
pub struct CommandCompiler {
    program: String,
    base_args: Vec<String>,
    timeout: Option<Duration>,
    runtime: tokio::runtime::Handle,
}

impl CommandCompiler {
    pub fn new(
        program: impl Into<String>,
        base_args: Vec<String>,
        timeout: Option<Duration>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            program: program.into(),
            base_args,
            timeout,
            runtime,
        }
    }

    /// Build the argument list for one request
    ///
    /// `<base args..> <project> --output <path> --format <fmt> --max-size <bytes>`;
    /// `--output` is left out when the request has no destination.
    pub fn build_args(&self, request: &TaskRequest) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push(request.project_path().to_string());

        if let Some(output) = request.resolved_output() {
            args.push("--output".to_string());
            args.push(output.to_string());
        }

        args.push("--format".to_string());
        args.push(request.output_format().to_string());
        args.push("--max-size".to_string());
        args.push(request.max_size_bytes().to_string());
        args
    }

    async fn run_process(
        &self,
        request: &TaskRequest,
        ctx: &CompileContext,
    ) -> Result<(), CompileError> {
        let args = self.build_args(request);
        tracing::info!("Executing: {} {}", self.program, args.join(" "));

        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CompileError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompileError::Failed("compiler stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CompileError::Failed("compiler stderr was not captured".into()))?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut last_error_line: Option<String> = None;

        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let status = loop {
            tokio::select! {
                line = stdout_lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => ctx.emit(&line),
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        tracing::warn!("Failed to read compiler stdout: {}", e);
                        stdout_open = false;
                    }
                },
                line = stderr_lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => {
                        ctx.emit(&line);
                        if !line.trim().is_empty() {
                            last_error_line = Some(line);
                        }
                    }
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        tracing::warn!("Failed to read compiler stderr: {}", e);
                        stderr_open = false;
                    }
                },
                status = child.wait(), if !stdout_open && !stderr_open => break status?,
                _ = ctx.cancellation().cancelled() => {
                    tracing::warn!("Compilation cancelled, killing compiler process");
                    Self::kill(&mut child).await;
                    return Err(CompileError::Cancelled);
                }
                _ = &mut deadline => {
                    let limit = self.timeout.unwrap_or_default();
                    tracing::warn!("Compiler process timed out after {:?}", limit);
                    Self::kill(&mut child).await;
                    return Err(CompileError::Timeout(limit));
                }
            }
        };

        tracing::info!(
            "Compiler process completed in {:.2}s with {}",
            start.elapsed().as_secs_f32(),
            status
        );

        if status.success() {
            Ok(())
        } else {
            Err(CompileError::ProcessFailed {
                status: status.to_string(),
                message: last_error_line
                    .unwrap_or_else(|| "compiler reported an error".to_string()),
            })
        }
    }

    async fn kill(child: &mut tokio::process::Child) {
        if let Err(e) = child.kill().await {
            tracing::warn!("Failed to kill compiler process: {}", e);
        }
    }
}

impl ProjectCompiler for CommandCompiler {
    fn compile(&self, request: &TaskRequest, ctx: &CompileContext) -> Result<(), CompileError> {
        if !request.project_path().is_dir() {
            return Err(CompileError::ProjectNotFound(
                request.project_path().to_path_buf(),
            ));
        }

        self.runtime.block_on(self.run_process(request, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFormat;
    use crate::services::capture::DiagnosticSink;
    use crate::services::compiler::CancellationToken;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl DiagnosticSink for Lines {
        fn write_line(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    fn context(lines: &Arc<Lines>, cancel: CancellationToken) -> CompileContext {
        CompileContext::new(lines.clone(), cancel)
    }

    fn shell(script: &str, timeout: Option<Duration>, rt: &tokio::runtime::Runtime) -> CommandCompiler {
        CommandCompiler::new(
            "sh",
            vec!["-c".into(), script.into(), "sh".into()],
            timeout,
            rt.handle().clone(),
        )
    }

    #[cfg(unix)]
    #[test]
    fn test_build_args() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let compiler = CommandCompiler::new("contextforge", vec![], None, rt.handle().clone());
        let request = TaskRequest::new("/proj", "out.md", OutputFormat::Json, 42);

        assert_eq!(
            compiler.build_args(&request),
            vec![
                "/proj",
                "--output",
                "/proj/out.md",
                "--format",
                "json",
                "--max-size",
                "42"
            ]
        );
    }

    #[test]
    fn test_build_args_without_output() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let compiler =
            CommandCompiler::new("contextforge", vec!["compile".into()], None, rt.handle().clone());
        let request = TaskRequest::new("/proj", "", OutputFormat::Markdown, 10);

        let args = compiler.build_args(&request);
        assert_eq!(args[0], "compile");
        assert!(!args.contains(&"--output".to_string()));
    }

    #[test]
    fn test_missing_project_directory() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let compiler = shell("exit 0", None, &rt);
        let lines = Arc::new(Lines::default());
        let request = TaskRequest::new("/definitely/not/here", "", OutputFormat::Markdown, 1);

        let err = compiler
            .compile(&request, &context(&lines, CancellationToken::never()))
            .unwrap_err();
        assert!(matches!(err, CompileError::ProjectNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_output_and_reports_last_stderr_line() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let project = tempfile::TempDir::new().unwrap();
        let compiler = shell("echo scanning; echo 'missing manifest' >&2; exit 3", None, &rt);
        let lines = Arc::new(Lines::default());
        let request = TaskRequest::new(
            project.path().to_str().unwrap(),
            "",
            OutputFormat::Markdown,
            1,
        );

        let err = compiler
            .compile(&request, &context(&lines, CancellationToken::never()))
            .unwrap_err();

        assert!(err.to_string().starts_with("missing manifest"));
        let captured = lines.0.lock().unwrap().clone();
        assert!(captured.contains(&"scanning".to_string()));
        assert!(captured.contains(&"missing manifest".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_success() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let project = tempfile::TempDir::new().unwrap();
        let compiler = shell("echo done", None, &rt);
        let lines = Arc::new(Lines::default());
        let request = TaskRequest::new(
            project.path().to_str().unwrap(),
            "",
            OutputFormat::Markdown,
            1,
        );

        compiler
            .compile(&request, &context(&lines, CancellationToken::never()))
            .unwrap();
        assert_eq!(*lines.0.lock().unwrap(), vec!["done"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_process() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let project = tempfile::TempDir::new().unwrap();
        let compiler = shell("sleep 5", Some(Duration::from_millis(100)), &rt);
        let lines = Arc::new(Lines::default());
        let request = TaskRequest::new(
            project.path().to_str().unwrap(),
            "",
            OutputFormat::Markdown,
            1,
        );

        let started = Instant::now();
        let err = compiler
            .compile(&request, &context(&lines, CancellationToken::never()))
            .unwrap_err();

        assert!(matches!(err, CompileError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancellation_kills_process() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let project = tempfile::TempDir::new().unwrap();
        let compiler = shell("sleep 5", None, &rt);
        let lines = Arc::new(Lines::default());
        let request = TaskRequest::new(
            project.path().to_str().unwrap(),
            "",
            OutputFormat::Markdown,
            1,
        );
        let (handle, token) = CancellationToken::new();

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            handle.cancel();
        });

        let err = compiler.compile(&request, &context(&lines, token)).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, CompileError::Cancelled));
    }
}
