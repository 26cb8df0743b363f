//! 报告渲染：把 FinalPlan 排版成给人看的纯文本报告

use crate::workflow::types::FinalPlan;

const HEAVY_RULE_WIDTH: usize = 60;
const LIGHT_RULE_WIDTH: usize = 40;

fn section(lines: &mut Vec<String>, title: &str) {
    let rule = "─".repeat(LIGHT_RULE_WIDTH);
    lines.push(rule.clone());
    lines.push(title.to_string());
    lines.push(rule);
}

/// 渲染最终报告；纯函数，任何 FinalPlan（包括兜底方案）都能渲染
pub fn render_report(plan: &FinalPlan) -> String {
    let heavy = "=".repeat(HEAVY_RULE_WIDTH);
    let mut lines = vec![
        heavy.clone(),
        "🎯 OPSCOPILOT INCIDENT RESPONSE".to_string(),
        heavy.clone(),
        String::new(),
    ];

    section(&mut lines, "📝 PLAN");
    lines.push(format!("Summary: {}", plan.summary));
    lines.push(String::new());
    lines.push("Steps:".to_string());
    lines.extend(
        plan.steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("  {}. {}", i + 1, step)),
    );
    lines.push(String::new());

    section(&mut lines, "💬 CUSTOMER MESSAGE");
    lines.push(plan.customer_message.clone());
    lines.push(String::new());

    section(&mut lines, "🔒 INTERNAL NOTE");
    lines.push(plan.internal_note.clone());
    lines.push(String::new());

    lines.push(heavy.clone());
    lines.push("✅ END OF OPSCOPILOT RESPONSE".to_string());
    lines.push(heavy);

    lines.join("\n")
}
