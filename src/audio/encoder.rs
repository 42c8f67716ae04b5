//! External encoder subprocess for non-PCM synthesis clips.
//!
//! Codec work is delegated to an external encoder process (ffmpeg by
//! default): the clip is piped to stdin and raw mono s16le PCM is read back
//! from stdout. The `CommandRunner` trait enables full testability without
//! the encoder installed.

use crate::error::{BanterError, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Trait for running an external command with piped stdin/stdout.
///
/// Object-safe, Send + Sync for use in concurrent contexts.
/// Enables testability by allowing mock implementations.
pub trait CommandRunner: Send + Sync {
    /// Run a command, feed `stdin` to it, and return its stdout bytes.
    fn run(&self, program: &str, args: &[String], stdin: &[u8]) -> Result<Vec<u8>>;
}

/// Production command runner using std::process::Command.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String], stdin: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BanterError::EncoderNotFound {
                        tool: program.to_string(),
                    }
                } else {
                    BanterError::Encoder {
                        message: format!("failed to spawn {}: {}", program, e),
                    }
                }
            })?;

        // Feed stdin from a separate thread so a full stdout pipe can't
        // deadlock against a blocked stdin write.
        let mut stdin_pipe = child.stdin.take().ok_or_else(|| BanterError::Encoder {
            message: format!("{} stdin unavailable", program),
        })?;
        let input = stdin.to_vec();
        let writer = std::thread::spawn(move || {
            let result = stdin_pipe.write_all(&input);
            drop(stdin_pipe);
            result
        });

        let output = child.wait_with_output().map_err(|e| BanterError::Encoder {
            message: format!("failed to read {} output: {}", program, e),
        })?;

        if let Ok(Err(e)) = writer.join() {
            // Encoder may close stdin early after reading enough input.
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(BanterError::Encoder {
                    message: format!("failed to write {} input: {}", program, e),
                });
            }
        }

        if !output.status.success() {
            return Err(BanterError::Encoder {
                message: format!("{} exited with status {}", program, output.status),
            });
        }

        Ok(output.stdout)
    }
}

/// Converts encoded audio clips to raw mono 16-bit PCM via a subprocess.
pub struct PcmEncoder {
    program: String,
    sample_rate: u32,
    runner: Arc<dyn CommandRunner>,
}

impl PcmEncoder {
    /// Create an encoder using the system command runner.
    pub fn new(program: &str, sample_rate: u32) -> Self {
        Self {
            program: program.to_string(),
            sample_rate,
            runner: Arc::new(SystemCommandRunner),
        }
    }

    /// Replace the command runner (for tests).
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            "-".to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "pipe:1".to_string(),
        ]
    }

    /// Transcode one clip to raw PCM.
    ///
    /// Blocking; callers on the event loop should wrap this in
    /// `tokio::task::spawn_blocking`.
    pub fn encode(&self, clip: &[u8]) -> Result<Vec<u8>> {
        let pcm = self.runner.run(&self.program, &self.args(), clip)?;
        if pcm.len() % 2 != 0 {
            return Err(BanterError::Encoder {
                message: format!("{} produced odd-length PCM output", self.program),
            });
        }
        Ok(pcm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockRunner {
        output: Vec<u8>,
        calls: Mutex<Vec<(String, Vec<String>, Vec<u8>)>>,
        should_fail: bool,
    }

    impl MockRunner {
        fn new(output: Vec<u8>) -> Self {
            Self {
                output,
                calls: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                output: Vec::new(),
                calls: Mutex::new(Vec::new()),
                should_fail: true,
            }
        }
    }

    impl CommandRunner for MockRunner {
        fn run(&self, program: &str, args: &[String], stdin: &[u8]) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push((
                program.to_string(),
                args.to_vec(),
                stdin.to_vec(),
            ));
            if self.should_fail {
                return Err(BanterError::Encoder {
                    message: "mock encoder failure".to_string(),
                });
            }
            Ok(self.output.clone())
        }
    }

    #[test]
    fn test_encoder_invocation_shape() {
        let runner = Arc::new(MockRunner::new(vec![0u8; 64]));
        let encoder = PcmEncoder::new("ffmpeg", 16_000).with_runner(runner.clone());

        let pcm = encoder.encode(b"clip-bytes").unwrap();
        assert_eq!(pcm.len(), 64);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (program, args, stdin) = &calls[0];
        assert_eq!(program, "ffmpeg");
        assert_eq!(stdin, b"clip-bytes");
        // Raw mono s16le at the configured rate, reading stdin, writing stdout
        assert!(args.contains(&"s16le".to_string()));
        assert!(args.contains(&"16000".to_string()));
        assert!(args.contains(&"pipe:1".to_string()));
        assert_eq!(args[..2], ["-i".to_string(), "-".to_string()]);
    }

    #[test]
    fn test_encoder_rejects_odd_output() {
        let runner = Arc::new(MockRunner::new(vec![0u8; 63]));
        let encoder = PcmEncoder::new("ffmpeg", 16_000).with_runner(runner);
        assert!(matches!(
            encoder.encode(b"clip"),
            Err(BanterError::Encoder { .. })
        ));
    }

    #[test]
    fn test_encoder_propagates_runner_failure() {
        let runner = Arc::new(MockRunner::failing());
        let encoder = PcmEncoder::new("ffmpeg", 16_000).with_runner(runner);
        assert!(encoder.encode(b"clip").is_err());
    }

    #[test]
    fn test_missing_tool_maps_to_not_found() {
        let runner = SystemCommandRunner;
        let result = runner.run("banter-nonexistent-encoder", &[], b"");
        assert!(matches!(result, Err(BanterError::EncoderNotFound { .. })));
    }
}
