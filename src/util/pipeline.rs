//! Two-stage pipe of external processes: `producer | consumer > file`.

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use derive_more::{Display, Error, From};

/// One external process of a [Pipeline].
#[derive(Debug, Clone)]
pub struct Stage {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl Stage {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Sets an environment variable for this stage only.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> impl Iterator<Item = &OsStr> {
        self.args.iter().map(OsString::as_os_str)
    }

    pub fn get_env(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.envs
            .iter()
            .rev()
            .find(|(k, _)| k == key.as_ref())
            .map(|(_, v)| v.as_os_str())
    }

    fn display_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.envs.iter().map(|(k, v)| (k, v)));
        command
    }

    fn spawn_error(&self, error: io::Error) -> PipelineError {
        if error.kind() == io::ErrorKind::NotFound {
            PipelineError::NotFound {
                program: self.display_name(),
            }
        } else {
            PipelineError::Spawn {
                program: self.display_name(),
                source: error,
            }
        }
    }
}

#[derive(Debug, Display, Error, From)]
/// Errors on running a [Pipeline].
pub enum PipelineError {
    /// The program isn't installed or not on the `PATH`.
    #[display("{program} not found")]
    NotFound { program: String },
    /// The program exists but couldn't be started.
    #[display("{program} could not be started: {source}")]
    Spawn { program: String, source: io::Error },
    /// The program exited unsuccessfully.
    #[display("{program} error ({status}): {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[display("{_0}")]
    #[from]
    Io(io::Error),
}

/// Pipes the stdout of `producer` into the stdin of `consumer`.
#[derive(Debug, Clone)]
pub struct Pipeline {
    producer: Stage,
    consumer: Stage,
}

impl Pipeline {
    pub fn new(producer: Stage, consumer: Stage) -> Self {
        Self { producer, consumer }
    }

    /// Runs both stages to completion with the consumer writing to `output`.
    ///
    /// Success is only evaluated after both stages terminated. A failing
    /// producer is reported before a failing consumer.
    pub fn run(&self, output: File) -> Result<(), PipelineError> {
        let mut producer = self
            .producer
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.producer.spawn_error(e))?;

        let Some(producer_stdout) = producer.stdout.take() else {
            reap(&mut producer);
            return Err(io::Error::other("producer stdout is not captured").into());
        };

        let consumer = self
            .consumer
            .command()
            .stdin(Stdio::from(producer_stdout))
            .stdout(output)
            .stderr(Stdio::piped())
            .spawn();
        let consumer = match consumer {
            Ok(consumer) => consumer,
            Err(e) => {
                reap(&mut producer);
                return Err(self.consumer.spawn_error(e));
            }
        };

        // the producer's stderr must be drained concurrently, otherwise a
        // chatty producer blocks while we wait for the consumer
        let producer_stderr = producer.stderr.take();
        let drain = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stderr) = producer_stderr {
                let _ = stderr.read_to_end(&mut buf);
            }
            buf
        });

        let consumer_output = match consumer.wait_with_output() {
            Ok(output) => output,
            Err(e) => {
                reap(&mut producer);
                let _ = drain.join();
                return Err(e.into());
            }
        };
        let producer_status = producer.wait()?;
        let producer_stderr = drain.join().unwrap_or_default();

        if !producer_status.success() {
            return Err(PipelineError::Failed {
                program: self.producer.display_name(),
                status: producer_status,
                stderr: String::from_utf8_lossy(&producer_stderr).trim().to_string(),
            });
        }
        if !consumer_output.status.success() {
            return Err(PipelineError::Failed {
                program: self.consumer.display_name(),
                status: consumer_output.status,
                stderr: String::from_utf8_lossy(&consumer_output.stderr)
                    .trim()
                    .to_string(),
            });
        }

        Ok(())
    }
}

/// Kills `child` if it still runs and collects its exit status.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
