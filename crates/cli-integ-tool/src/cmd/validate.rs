use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Args;
use integ_core::assertions::{
    assert_asset_metadata, assert_bundled_files, assert_bundling_flags, assert_nested_stack_metadata,
};
use integ_core::expected::Descriptors;
use integ_core::paths::TEMPLATE_SUFFIX;
use integ_core::random::compact_prefix;
use integ_core::template::Template;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct ValidateArgs {
    /// Synthesized template, e.g. cdk.out/cdktest-abc-TestStack.template.json
    pub template: PathBuf,

    /// Descriptor YAML (default: the built-in SAM app expectations)
    #[arg(long, short = 'd')]
    pub descriptors: Option<PathBuf>,

    /// Also check bundled asset files under the template's cdk.out
    #[arg(long)]
    pub bundles: bool,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    check: &'static str,
    id: String,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl CheckResult {
    fn record(check: &'static str, id: &str, outcome: integ_core::Result<()>) -> Self {
        Self {
            check,
            id: id.to_string(),
            passed: outcome.is_ok(),
            detail: outcome.err().map(|e| e.to_string()),
        }
    }
}

pub fn run(args: &ValidateArgs, json: bool) -> anyhow::Result<()> {
    let descriptors = match &args.descriptors {
        Some(path) => Descriptors::load(path)
            .with_context(|| format!("failed to load descriptors {}", path.display()))?,
        None => Descriptors::sam_app(),
    };
    let template = Template::load(&args.template)?;
    let full_name = full_stack_name(&args.template)?;
    let prefix = stack_prefix(&full_name, &descriptors.stack)?;
    tracing::debug!(stack = %full_name, %prefix, "validating template");

    let mut results = Vec::new();
    for r in &descriptors.resources {
        let outcome = assert_asset_metadata(&template, &full_name, r);
        results.push(CheckResult::record("metadata", &r.id, outcome));
    }
    for n in &descriptors.nested_stacks {
        let outcome = assert_nested_stack_metadata(
            &template,
            &compact_prefix(prefix),
            &full_name,
            &descriptors.stack,
            &n.id,
        );
        results.push(CheckResult::record("nested-stack", &n.id, outcome));
    }
    results.push(CheckResult::record(
        "bundling-flags",
        "*",
        assert_bundling_flags(&template, &descriptors.resources),
    ));
    if args.bundles {
        let cdk_out = args.template.parent().unwrap_or(Path::new("."));
        for b in &descriptors.bundles {
            let outcome = assert_bundled_files(cdk_out, &template, b);
            results.push(CheckResult::record("bundle", &b.id, outcome));
        }
    }

    if json {
        print_json(&results)?;
    } else {
        let rows: Vec<Vec<String>> = results
            .iter()
            .map(|r| {
                vec![
                    r.check.to_string(),
                    r.id.clone(),
                    if r.passed { "ok" } else { "FAIL" }.to_string(),
                    r.detail.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["CHECK", "ID", "STATUS", "DETAIL"], &rows);
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} checks failed", results.len());
    }
    Ok(())
}

/// `cdk.out/<full stack name>.template.json` → `<full stack name>`
fn full_stack_name(template: &Path) -> anyhow::Result<String> {
    template
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(TEMPLATE_SUFFIX))
        .map(str::to_string)
        .with_context(|| {
            format!(
                "cannot derive a stack name from {}; expected <stack>{TEMPLATE_SUFFIX}",
                template.display()
            )
        })
}

fn stack_prefix<'a>(full_stack_name: &'a str, stack: &str) -> anyhow::Result<&'a str> {
    full_stack_name
        .strip_suffix(stack)
        .and_then(|p| p.strip_suffix('-'))
        .filter(|p| !p.is_empty())
        .with_context(|| format!("stack '{full_stack_name}' is not '<prefix>-{stack}'"))
}
