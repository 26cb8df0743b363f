//! OpsCopilot 演示入口
//!
//! 用法：`opscopilot [incident.json]`。未提供文件时使用内置演示事件。
//! 流程：加载配置 → 初始化日志 → 组装流水线 → 运行；停在审批闸门时从 stdin 询问是否批准，
//! 最后打印报告与各阶段耗时。

use std::path::PathBuf;

use anyhow::Context;
use opscopilot::agent::create_pipeline_components;
use opscopilot::config::load_config;
use opscopilot::middleware::format_summary;
use opscopilot::observability;
use opscopilot::workflow::{ApprovalDecision, Incident, PendingApproval, RunOutcome, Severity};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn demo_incident() -> Incident {
    Incident {
        id: "INC-1".to_string(),
        title: "Checkout API returning 502 errors".to_string(),
        description: "Since 14:05 UTC roughly 30% of checkout requests fail with 502. \
                      A new release was rolled out at 13:58."
            .to_string(),
        service: "checkout-api".to_string(),
        customer: "contoso".to_string(),
        severity_hint: Some(Severity::Sev1),
    }
}

fn load_incident(path: Option<PathBuf>) -> anyhow::Result<Incident> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read incident file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid incident JSON in {}", path.display()))
        }
        None => Ok(demo_incident()),
    }
}

/// 在终端询问审批；空输入或非 y 视为拒绝
async fn ask_for_approval(pending: &PendingApproval) -> anyhow::Result<ApprovalDecision> {
    let triage = pending.triage();
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(
            format!(
                "\n⚠️  Approval required for incident {}\n   Action: {}\n   Severity: {} (confidence {:.2})\n   Next action: {}\nApprove? [y/N] ",
                pending.incident().id,
                pending.action(),
                triage.severity,
                triage.confidence,
                triage.next_action,
            )
            .as_bytes(),
        )
        .await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let answer = lines.next_line().await?.unwrap_or_default();
    if answer.trim().eq_ignore_ascii_case("y") || answer.trim().eq_ignore_ascii_case("yes") {
        let approver = std::env::var("USER").unwrap_or_else(|_| "operator".to_string());
        Ok(ApprovalDecision::approve(approver))
    } else {
        Ok(ApprovalDecision::reject("Rejected at the terminal"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    let cfg = load_config(None).context("Failed to load configuration")?;
    let incident = load_incident(std::env::args().nth(1).map(PathBuf::from))?;

    let components =
        create_pipeline_components(&cfg).context("Failed to build incident pipeline")?;
    let pipeline = &components.pipeline;

    let mut outcome = pipeline
        .run(incident)
        .await
        .context("Pipeline run failed")?;

    if let RunOutcome::AwaitingApproval(pending) = outcome {
        let decision = ask_for_approval(&pending).await?;
        outcome = pipeline
            .resume(pending, decision)
            .await
            .context("Pipeline resume failed")?;
    }

    match outcome {
        RunOutcome::Completed(report) => {
            println!("\n{}", report.report);
            for fallback in &report.fallbacks {
                println!("⚠️  Stage '{}' used fallback: {}", fallback.stage, fallback.reason);
            }
            let records = components.timing.take_run(&report.run_id);
            println!("\n{}", format_summary(&records));
        }
        RunOutcome::Rejected {
            run_id,
            action,
            reason,
        } => {
            components.timing.take_run(&run_id);
            println!("\n❌ Run {} stopped: '{}' was not approved ({})", run_id, action, reason);
        }
        RunOutcome::AwaitingApproval(pending) => {
            println!("\n⏸  Run {} is still awaiting approval", pending.run_id());
        }
    }

    Ok(())
}
