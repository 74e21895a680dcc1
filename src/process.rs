use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::config::ExperimentConfig;
use crate::error::SweepError;
use crate::sampler::{Executor, Invocation};

/// Spawns the benchmark as `<program> [args...] <trace> <value size>`.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cpu: Option<usize>,
}

impl ProcessExecutor {
    pub fn new(config: &ExperimentConfig) -> Self {
        Self {
            program: config.benchmark.clone(),
            args: config.benchmark_args.clone(),
            env: config.env.clone(),
            cpu: config.cpu,
        }
    }

    fn command(&self, invocation: &Invocation<'_>) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(invocation.trace)
            .arg(invocation.configuration.value_size.to_string())
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(cpu) = self.cpu {
            pin_to_cpu(&mut command, cpu);
        }
        command
    }
}

impl Executor for ProcessExecutor {
    fn execute(&mut self, invocation: &Invocation<'_>) -> Result<String, SweepError> {
        let output = self
            .command(invocation)
            .output()
            .map_err(|source| SweepError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SweepError::BenchmarkFailed {
                configuration: invocation.configuration,
                status: output.status.to_string(),
            });
        }

        debug!(
            configuration = %invocation.configuration,
            bytes = output.stdout.len(),
            "Benchmark finished"
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(target_os = "linux")]
fn pin_to_cpu(command: &mut Command, cpu: usize) {
    use std::os::unix::process::CommandExt;

    // SAFETY: the hook only calls sched_setaffinity, which is async-signal-safe.
    unsafe {
        command.pre_exec(move || set_affinity(cpu));
    }
}

#[cfg(target_os = "linux")]
fn set_affinity(cpu: usize) -> std::io::Result<()> {
    if cpu >= libc::CPU_SETSIZE as usize {
        return Err(std::io::Error::from_raw_os_error(libc::EINVAL));
    }
    // SAFETY: cpu_set_t is a plain bitmask; all-zero is the empty set.
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    // SAFETY: `set` is a valid, exclusively borrowed cpu_set_t for the duration of the calls.
    let rc = unsafe {
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn pin_to_cpu(_command: &mut Command, cpu: usize) {
    tracing::warn!(cpu, "CPU pinning is only supported on Linux, running unpinned");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{BenchmarkConfiguration, Phase};
    use std::path::Path;

    /// Runs `script` through `sh -c`, so `$1` is the trace and `$2` the value size.
    fn shell(script: &str, cpu: Option<usize>) -> ProcessExecutor {
        ProcessExecutor::new(&ExperimentConfig {
            benchmark: PathBuf::from("/bin/sh"),
            benchmark_args: vec!["-c".to_string(), script.to_string(), "bench".to_string()],
            cpu,
            env: BTreeMap::from([("BENCH_MARKER".to_string(), "42".to_string())]),
            ..Default::default()
        })
    }

    fn invocation(value_size: u64, phase: Phase) -> Invocation<'static> {
        Invocation {
            configuration: BenchmarkConfiguration::new(value_size, phase),
            trace: Path::new("traces/ycsb-a.txt"),
        }
    }

    #[test]
    fn passes_arguments_and_environment() {
        let mut executor = shell(
            r#"printf 'trace,%s\nsize,%s\nenv,%s\n' "$1" "$2" "$BENCH_MARKER""#,
            None,
        );
        let output = executor.execute(&invocation(4096, Phase::Load)).unwrap();
        assert_eq!(output, "trace,traces/ycsb-a.txt\nsize,4096\nenv,42\n");
    }

    #[test]
    fn non_zero_exit_is_fatal() {
        let mut executor = shell("echo partial,1; exit 3", None);
        match executor.execute(&invocation(64, Phase::Update)) {
            Err(SweepError::BenchmarkFailed {
                configuration,
                status,
            }) => {
                assert_eq!(configuration.phase, Phase::Update);
                assert!(status.contains('3'), "{status}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_cannot_spawn() {
        let mut executor = ProcessExecutor::new(&ExperimentConfig {
            benchmark: PathBuf::from("/nonexistent/pmemkv_latency"),
            cpu: None,
            ..Default::default()
        });
        assert!(matches!(
            executor.execute(&invocation(64, Phase::Load)),
            Err(SweepError::Spawn { .. })
        ));
    }

    #[cfg(target_os = "linux")]
    fn first_allowed_cpu() -> usize {
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set)
        };
        assert_eq!(rc, 0);
        (0..libc::CPU_SETSIZE as usize)
            .find(|&cpu| unsafe { libc::CPU_ISSET(cpu, &set) })
            .unwrap()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn cpu_outside_affinity_mask_fails_to_spawn() {
        let mut executor = shell("echo ok,1", Some(5000));
        assert!(matches!(
            executor.execute(&invocation(64, Phase::Load)),
            Err(SweepError::Spawn { .. })
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn pinned_process_still_runs() {
        let mut executor = shell("echo ok,1", Some(first_allowed_cpu()));
        assert_eq!(
            executor.execute(&invocation(64, Phase::Load)).unwrap(),
            "ok,1\n"
        );
    }
}
