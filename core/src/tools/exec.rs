//! `exec`, `search`, `run_tests`, and `check_types` (§4.3.8).

use push_protocol::PushErr;
use push_protocol::ToolName;
use push_protocol::ToolResult;
use serde_json::Value;

use crate::error_map::rpc_err_to_push_err;
use crate::tool_layer::ToolContext;
use crate::tool_layer::normalize_workspace_path;
use crate::tool_layer::shell_escape;
use crate::tools::optional_str;
use crate::tools::require_str;

fn format_exec_output(resp: &push_sandbox_client::types::ExecResponse) -> String {
    format!(
        "exit_code: {}\nduration_ms: {}\n--- stdout ---\n{}\n--- stderr ---\n{}",
        resp.exit_code, resp.duration_ms, resp.stdout, resp.stderr
    )
}

pub async fn exec(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let command = match require_str(&args, "command") {
        Ok(c) => c.to_string(),
        Err(msg) => return ToolResult::failure(ToolName::Exec, &PushErr::Unknown(msg)),
    };
    let workdir = optional_str(&args, "workdir").map(normalize_workspace_path);
    match ctx.sandbox.exec(command, workdir).await {
        Ok(resp) => ToolResult::success(ToolName::Exec, format_exec_output(&resp)),
        Err(e) => ToolResult::failure(ToolName::Exec, &rpc_err_to_push_err(e)),
    }
}

/// Prefers ripgrep, falls back to recursive grep; exit code 1 with empty
/// output is normalized to "no matches".
pub async fn search(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let query = match require_str(&args, "query") {
        Ok(q) => q.to_string(),
        Err(msg) => return ToolResult::failure(ToolName::Search, &PushErr::Unknown(msg)),
    };
    let path = optional_str(&args, "path").unwrap_or(".");
    let command = format!(
        "rg --line-number --no-heading {} {} 2>/dev/null || grep -rn {} {}",
        shell_escape(&query),
        shell_escape(path),
        shell_escape(&query),
        shell_escape(path),
    );
    match ctx.sandbox.search_via_exec(command, None).await {
        Ok(resp) if resp.exit_code == 1 && resp.stdout.trim().is_empty() => {
            ToolResult::success(ToolName::Search, "no matches".to_string())
        }
        Ok(resp) => ToolResult::success(ToolName::Search, format_exec_output(&resp)),
        Err(e) => ToolResult::failure(ToolName::Search, &rpc_err_to_push_err(e)),
    }
}

struct FrameworkProbe {
    marker_file: &'static str,
    command: &'static str,
}

const TEST_FRAMEWORKS: &[FrameworkProbe] = &[
    FrameworkProbe { marker_file: "Cargo.toml", command: "cargo test" },
    FrameworkProbe { marker_file: "package.json", command: "npm test" },
    FrameworkProbe { marker_file: "pytest.ini", command: "pytest" },
    FrameworkProbe { marker_file: "go.mod", command: "go test ./..." },
];

const TYPE_CHECKERS: &[FrameworkProbe] = &[
    FrameworkProbe { marker_file: "tsconfig.json", command: "tsc --noEmit" },
    FrameworkProbe { marker_file: "Cargo.toml", command: "cargo check" },
    FrameworkProbe { marker_file: "mypy.ini", command: "mypy ." },
];

async fn detect_marker(ctx: &ToolContext<'_>, markers: &[FrameworkProbe]) -> Option<&'static str> {
    for probe in markers {
        let check = format!("test -f {}", shell_escape(probe.marker_file));
        if let Ok(resp) = ctx.sandbox.exec(check, None).await {
            if resp.exit_code == 0 {
                return Some(probe.command);
            }
        }
    }
    None
}

#[derive(Debug, Default, serde::Serialize)]
struct TestSummary {
    passed: u32,
    failed: u32,
    skipped: u32,
    total: u32,
    duration_ms: u64,
    truncated: bool,
}

/// Parses common test-runner output shapes into a `{passed, failed, skipped,
/// total}` summary. Falls back to zeros (with the raw output retained) when
/// no known pattern matches.
fn parse_test_summary(stdout: &str) -> TestSummary {
    let re = regex_lite::Regex::new(
        r"(?i)(\d+)\s+passed|(\d+)\s+failed|(\d+)\s+skipped|ok:\s*(\d+)|FAILED:\s*(\d+)",
    )
    .expect("static regex is valid");
    let mut summary = TestSummary::default();
    for cap in re.captures_iter(stdout) {
        if let Some(m) = cap.get(1) {
            summary.passed += m.as_str().parse().unwrap_or(0);
        } else if let Some(m) = cap.get(2) {
            summary.failed += m.as_str().parse().unwrap_or(0);
        } else if let Some(m) = cap.get(3) {
            summary.skipped += m.as_str().parse().unwrap_or(0);
        }
    }
    summary.total = summary.passed + summary.failed + summary.skipped;
    summary
}

pub async fn run_tests(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let forced = optional_str(&args, "framework");
    let command = match forced {
        Some(cmd) => cmd.to_string(),
        None => match detect_marker(ctx, TEST_FRAMEWORKS).await {
            Some(cmd) => cmd.to_string(),
            None => return ToolResult::failure(
                ToolName::RunTests,
                &PushErr::Unknown("could not detect a test framework".to_string()),
            ),
        },
    };
    match ctx.sandbox.exec(command, None).await {
        Ok(resp) => {
            let mut summary = parse_test_summary(&resp.stdout);
            summary.duration_ms = resp.duration_ms;
            let json = serde_json::to_string_pretty(&summary).unwrap_or_default();
            ToolResult::success(ToolName::RunTests, format!("{json}\n\n{}", format_exec_output(&resp)))
        }
        Err(e) => ToolResult::failure(ToolName::RunTests, &rpc_err_to_push_err(e)),
    }
}

#[derive(Debug, Default, serde::Serialize)]
struct TypeCheckSummary {
    errors: u32,
    warnings: u32,
    clean: bool,
    duration_ms: u64,
}

/// Parses common type-checker output shapes (`tsc`, `cargo check`, `mypy`)
/// into a `{errors, warnings, clean}` summary.
fn parse_type_check_summary(stdout: &str, stderr: &str, exit_code: i32) -> TypeCheckSummary {
    let combined = format!("{stdout}\n{stderr}");
    let re = regex_lite::Regex::new(r"(?i)\berror(\[\w+\])?:|\berror\s+\w+:")
        .expect("static regex is valid");
    let warn_re = regex_lite::Regex::new(r"(?i)\bwarning(\[\w+\])?:|\bwarning\s+\w+:")
        .expect("static regex is valid");
    let errors = re.find_iter(&combined).count() as u32;
    let warnings = warn_re.find_iter(&combined).count() as u32;
    TypeCheckSummary {
        errors,
        warnings,
        clean: exit_code == 0 && errors == 0,
        duration_ms: 0,
    }
}

pub async fn check_types(ctx: &mut ToolContext<'_>) -> ToolResult {
    let command = match detect_marker(ctx, TYPE_CHECKERS).await {
        Some(cmd) => cmd.to_string(),
        None => {
            return ToolResult::failure(
                ToolName::CheckTypes,
                &PushErr::Unknown("could not detect a type checker".to_string()),
            );
        }
    };
    match ctx.sandbox.exec(command, None).await {
        Ok(resp) => {
            let mut summary = parse_type_check_summary(&resp.stdout, &resp.stderr, resp.exit_code);
            summary.duration_ms = resp.duration_ms;
            let json = serde_json::to_string_pretty(&summary).unwrap_or_default();
            ToolResult::success(ToolName::CheckTypes, format!("{json}\n\n{}", format_exec_output(&resp)))
        }
        Err(e) => ToolResult::failure(ToolName::CheckTypes, &rpc_err_to_push_err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jest_style_pass_fail_counts() {
        let summary = parse_test_summary("Tests: 3 failed, 12 passed, 15 total");
        assert_eq!(summary.passed, 12);
        assert_eq!(summary.failed, 3);
    }

    #[test]
    fn unrecognized_output_yields_zeroed_summary() {
        let summary = parse_test_summary("no idea what this output format is");
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn tsc_style_errors_are_counted_and_not_clean() {
        let summary = parse_type_check_summary(
            "src/a.ts(3,5): error TS2322: type mismatch\nsrc/b.ts(1,1): error TS2304: not found",
            "",
            2,
        );
        assert_eq!(summary.errors, 2);
        assert!(!summary.clean);
    }

    #[test]
    fn clean_exit_with_no_errors_is_clean() {
        let summary = parse_type_check_summary("", "", 0);
        assert_eq!(summary.errors, 0);
        assert!(summary.clean);
    }
}
