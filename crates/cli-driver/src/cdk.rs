//! The `cdk` command surface: argument construction and invocation.

use std::path::PathBuf;

use crate::process::{Shell, ShellOptions, ShellOutput};
use crate::Result;

/// Options for `cdk synth`.
#[derive(Debug, Clone, Default)]
pub struct SynthOptions {
    /// `--context key=value` pairs.
    pub context: Vec<(String, String)>,
    /// Full stack names; empty synthesizes the whole app.
    pub stacks: Vec<String>,
    pub extra_args: Vec<String>,
    pub shell: ShellOptions,
}

/// Options for `cdk deploy`.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub context: Vec<(String, String)>,
    pub extra_args: Vec<String>,
    pub shell: ShellOptions,
}

/// A located `cdk` binary bound to a [`Shell`].
#[derive(Clone)]
pub struct CdkCli {
    bin: PathBuf,
    shell: Shell,
}

impl CdkCli {
    pub fn new(bin: impl Into<PathBuf>, shell: Shell) -> Self {
        Self {
            bin: bin.into(),
            shell,
        }
    }

    pub fn bin(&self) -> &std::path::Path {
        &self.bin
    }

    pub async fn run(&self, args: &[String], opts: &ShellOptions) -> Result<ShellOutput> {
        self.shell.run(&self.bin, args, opts).await
    }

    pub async fn synth(&self, opts: &SynthOptions) -> Result<ShellOutput> {
        self.run(&synth_args(opts), &opts.shell).await
    }

    pub async fn deploy(&self, stacks: &[String], opts: &DeployOptions) -> Result<ShellOutput> {
        self.run(&deploy_args(stacks, opts), &opts.shell).await
    }

    pub async fn destroy(&self, stacks: &[String], opts: &ShellOptions) -> Result<ShellOutput> {
        self.run(&destroy_args(stacks), opts).await
    }
}

fn push_context(args: &mut Vec<String>, context: &[(String, String)]) {
    for (k, v) in context {
        args.push("--context".into());
        args.push(format!("{k}={v}"));
    }
}

pub fn synth_args(opts: &SynthOptions) -> Vec<String> {
    let mut args = vec!["synth".to_string()];
    push_context(&mut args, &opts.context);
    args.extend(opts.extra_args.iter().cloned());
    args.extend(opts.stacks.iter().cloned());
    args
}

pub fn deploy_args(stacks: &[String], opts: &DeployOptions) -> Vec<String> {
    let mut args = vec![
        "deploy".to_string(),
        "--require-approval=never".to_string(),
        "--progress".to_string(),
        "events".to_string(),
    ];
    push_context(&mut args, &opts.context);
    args.extend(opts.extra_args.iter().cloned());
    args.extend(stacks.iter().cloned());
    args
}

pub fn destroy_args(stacks: &[String]) -> Vec<String> {
    let mut args = vec!["destroy".to_string(), "-f".to_string()];
    args.extend(stacks.iter().cloned());
    args
}
