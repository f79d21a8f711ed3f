use crate::descriptor::ResourceRequest;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};

/// Directive syntax of the scheduler family a job script is written for
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PBS / Torque / Moab, `#PBS` directives submitted with qsub
    #[default]
    Pbs,
    /// Slurm, `#SBATCH` directives submitted with sbatch
    Slurm,
}

impl Dialect {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Pbs => "#PBS",
            Self::Slurm => "#SBATCH",
        }
    }

    /// environment variable holding the directory the job was submitted from
    pub fn submit_dir_variable(self) -> &'static str {
        match self {
            Self::Pbs => "$PBS_O_WORKDIR",
            Self::Slurm => "$SLURM_SUBMIT_DIR",
        }
    }

    pub fn submit_command(self) -> &'static str {
        match self {
            Self::Pbs => "qsub",
            Self::Slurm => "sbatch",
        }
    }

    pub fn script_extension(self) -> &'static str {
        match self {
            Self::Pbs => "pbs",
            Self::Slurm => "sh",
        }
    }

    /// Directive block for `resources`, in canonical order: nodes, processors
    /// and gpus, walltime, account, job name, stdout, stderr, queue.
    ///
    /// Values are written verbatim, the scheduler owns their syntax.
    pub fn directives(self, resources: &ResourceRequest) -> Vec<String> {
        let prefix = self.prefix();

        match self {
            Self::Pbs => {
                let gpus = match resources.gpu_count {
                    0 => String::new(),
                    count => format!(":gpus={count}"),
                };

                vec![
                    format!(
                        "{prefix} -l nodes={}:ppn={}{gpus}",
                        resources.node_count, resources.processors_per_node
                    ),
                    format!("{prefix} -l walltime={}", resources.wall_clock_limit),
                    format!("{prefix} -A {}", resources.account_id),
                    format!("{prefix} -N {}", resources.job_name),
                    format!("{prefix} -o {}", resources.stdout_path),
                    format!("{prefix} -e {}", resources.stderr_path),
                    format!("{prefix} -q {}", resources.queue_name),
                ]
            }
            Self::Slurm => {
                let mut lines = vec![
                    format!("{prefix} --nodes={}", resources.node_count),
                    format!("{prefix} --ntasks-per-node={}", resources.processors_per_node),
                ];

                if resources.gpu_count > 0 {
                    lines.push(format!("{prefix} --gres=gpu:{}", resources.gpu_count));
                }

                lines.extend([
                    format!("{prefix} --time={}", resources.wall_clock_limit),
                    format!("{prefix} --account={}", resources.account_id),
                    format!("{prefix} --job-name={}", resources.job_name),
                    format!("{prefix} --output={}", resources.stdout_path),
                    format!("{prefix} --error={}", resources.stderr_path),
                    format!("{prefix} --partition={}", resources.queue_name),
                ]);

                lines
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pbs => "pbs",
            Self::Slurm => "slurm",
        })
    }
}

/// Rendered job script as an ordered list of lines, without a shebang
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedJob {
    lines: Vec<String>,
}

impl RenderedJob {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// full script text, optionally starting with `#!<shebang>`
    pub fn to_script(&self, shebang: Option<&str>) -> String {
        match shebang {
            Some(interpreter) => format!("#!{interpreter}\n{self}"),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for RenderedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.lines.iter().try_for_each(|line| writeln!(f, "{line}"))
    }
}

pub(crate) fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c)
}

/// Quote `token` so the shell sees exactly one word.
/// Tokens made only of shell-safe characters are returned untouched,
/// everything else is single-quoted so nothing in it expands.
pub fn quote(token: &str) -> Cow<'_, str> {
    if !token.is_empty() && token.chars().all(is_shell_safe) {
        Cow::Borrowed(token)
    } else {
        Cow::Owned(format!("'{}'", token.replace('\'', r"'\''")))
    }
}

/// Quote a directory for `cd`, keeping `$VARIABLE` references live.
///
/// Only the working directory gets this treatment so that
/// `$PBS_O_WORKDIR/runs` still resolves on the compute node. Paths with a `$`
/// are double-quoted, which expands variables without splitting words.
pub fn quote_directory(path: &str) -> Cow<'_, str> {
    if !path.contains('$') {
        return quote(path);
    }

    let escaped: String = path
        .chars()
        .flat_map(|c| match c {
            '\\' | '"' | '`' => vec!['\\', c],
            _ => vec![c],
        })
        .collect();
    Cow::Owned(format!("\"{escaped}\""))
}
