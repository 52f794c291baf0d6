// src/cli/sessions.rs - Work session listing, detail and submission

use chrono::Utc;

use crate::gateway::{HttpGateway, WorkSession, WorkSessionDetail, WorkSessionStatus};
use crate::infra::config::Config;

/// Print the contract's work sessions, oldest first.
pub async fn list_sessions(config: &Config, contract_id: &str) -> anyhow::Result<()> {
    let gateway = HttpGateway::from_config(&config.gateway)?;
    let contract = gateway.fetch_contract(contract_id).await?;
    let sessions = gateway.list_sessions(contract_id).await?;

    println!(
        "{} ({}) - {:.2}/h, {:.2} remaining",
        contract.title, contract.status, contract.cost_per_hour, contract.remaining_budget
    );
    if sessions.is_empty() {
        println!("  No work sessions yet.");
        return Ok(());
    }

    let now = Utc::now();
    for session in &sessions {
        println!("  {}", format_session(session, now));
    }
    Ok(())
}

/// Print one session and the artifacts attached to it.
pub async fn show_session(config: &Config, session_id: &str) -> anyhow::Result<()> {
    let gateway = HttpGateway::from_config(&config.gateway)?;
    let detail = gateway.get_session(session_id).await?;
    for line in describe_session(&detail, Utc::now()) {
        println!("{}", line);
    }
    Ok(())
}

fn describe_session(detail: &WorkSessionDetail, now: chrono::DateTime<Utc>) -> Vec<String> {
    let mut lines = vec![format_session(&detail.session, now)];
    if detail.files.is_empty() {
        lines.push("  No screenshots attached.".to_string());
        return lines;
    }
    lines.push(format!("  {} screenshot(s) attached:", detail.files.len()));
    for file in &detail.files {
        match &file.file_path {
            Some(path) => lines.push(format!("    {}  {}", file.id, path)),
            None => lines.push(format!("    {}", file.id)),
        }
    }
    lines
}

/// Submit the most recent session if it is awaiting submission.
pub async fn submit_latest(config: &Config, contract_id: &str) -> anyhow::Result<()> {
    let gateway = HttpGateway::from_config(&config.gateway)?;
    let sessions = gateway.list_sessions(contract_id).await?;

    let latest = match latest_pending(&sessions) {
        Some(session) => session,
        None => {
            anyhow::bail!("contract {} has no pending session to submit", contract_id);
        }
    };

    gateway.submit_session(&latest.id).await?;
    tracing::info!("Submitted session {} for contract {}", latest.id, contract_id);
    println!("Session {} submitted for review.", latest.id);
    Ok(())
}

/// The last session, only when it is `Pending`.
pub fn latest_pending(sessions: &[WorkSession]) -> Option<&WorkSession> {
    sessions.last().filter(|s| s.is_pending())
}

fn format_session(session: &WorkSession, now: chrono::DateTime<Utc>) -> String {
    let status = match session.status {
        WorkSessionStatus::InProgress => "in progress",
        WorkSessionStatus::Pending => "pending",
        WorkSessionStatus::Approved => "approved",
        WorkSessionStatus::Rejected => "rejected",
        WorkSessionStatus::Paid => "paid",
        WorkSessionStatus::Unknown => "unknown",
    };
    format!(
        "{}  {}  {:>8}  {}",
        session.start_date.format("%Y-%m-%d %H:%M"),
        session.id,
        session.duration_label(now),
        status
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SessionFile;
    use chrono::TimeZone;

    fn session(id: &str, status: WorkSessionStatus) -> WorkSession {
        WorkSession {
            id: id.into(),
            start_date: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            end_date: Some(Utc.with_ymd_and_hms(2026, 3, 1, 11, 5, 0).unwrap()),
            status,
        }
    }

    #[test]
    fn test_latest_pending_only_checks_last() {
        let sessions = vec![
            session("a", WorkSessionStatus::Pending),
            session("b", WorkSessionStatus::Approved),
        ];
        assert!(latest_pending(&sessions).is_none());

        let sessions = vec![
            session("a", WorkSessionStatus::Approved),
            session("b", WorkSessionStatus::Pending),
        ];
        assert_eq!(latest_pending(&sessions).map(|s| s.id.as_str()), Some("b"));
        assert!(latest_pending(&[]).is_none());
    }

    #[test]
    fn test_describe_session_lists_files() {
        let detail = WorkSessionDetail {
            session: session("ws-1", WorkSessionStatus::Pending),
            files: vec![
                SessionFile {
                    id: "f-1".into(),
                    file_path: Some("uploads/a.png".into()),
                },
                SessionFile {
                    id: "f-2".into(),
                    file_path: None,
                },
            ],
        };
        assert_eq!(
            describe_session(&detail, Utc::now()),
            vec![
                "2026-03-01 09:00  ws-1    2h 05m  pending".to_string(),
                "  2 screenshot(s) attached:".to_string(),
                "    f-1  uploads/a.png".to_string(),
                "    f-2".to_string(),
            ]
        );

        let bare = WorkSessionDetail {
            files: Vec::new(),
            ..detail
        };
        assert_eq!(describe_session(&bare, Utc::now())[1], "  No screenshots attached.");
    }

    #[test]
    fn test_format_session() {
        let line = format_session(&session("ws-1", WorkSessionStatus::Paid), Utc::now());
        assert_eq!(line, "2026-03-01 09:00  ws-1    2h 05m  paid");
    }
}
