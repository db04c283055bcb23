//! Categorization helpers (spec.md §4.3): classify processes into
//! system/user/applications/services by user and name heuristics. These
//! tags are hints applied on registration, not contracts.

use crate::domain::ProcessInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessCategory {
    System,
    Service,
    Application,
    User,
}

impl ProcessCategory {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Service => "service",
            Self::Application => "application",
            Self::User => "user",
        }
    }
}

const SYSTEM_USERS: &[&str] = &["root", "system", "daemon"];
const SERVICE_NAME_HINTS: &[&str] = &["d", "daemon", "agent", "service"];

/// Best-effort classification; never fails, defaults to `User`.
pub fn categorize(info: &ProcessInfo) -> ProcessCategory {
    let user_is_system = info
        .user
        .as_deref()
        .map(|u| SYSTEM_USERS.contains(&u))
        .unwrap_or(false);

    if user_is_system {
        return ProcessCategory::System;
    }

    let name = info.name.to_lowercase();
    if SERVICE_NAME_HINTS.iter().any(|hint| name.ends_with(hint)) {
        return ProcessCategory::Service;
    }

    if info.command.contains("/Applications/") || info.command.contains("/usr/bin/") {
        return ProcessCategory::Application;
    }

    ProcessCategory::User
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProcessStatus;
    use chrono::Utc;

    fn info(user: Option<&str>, name: &str, command: &str) -> ProcessInfo {
        ProcessInfo {
            pid: 1,
            ppid: None,
            name: name.to_string(),
            command: command.to_string(),
            args: vec![],
            user: user.map(|u| u.to_string()),
            cpu: 0.0,
            memory: 0,
            vsz: 0,
            rss: 0,
            start_time: Utc::now(),
            status: ProcessStatus::Running,
        }
    }

    #[test]
    fn root_owned_processes_are_system() {
        assert_eq!(
            categorize(&info(Some("root"), "cron", "/usr/sbin/cron")),
            ProcessCategory::System
        );
    }

    #[test]
    fn daemon_suffixed_names_are_services() {
        assert_eq!(
            categorize(&info(Some("alice"), "nginxd", "/opt/nginxd")),
            ProcessCategory::Service
        );
    }

    #[test]
    fn unrecognized_processes_default_to_user() {
        assert_eq!(
            categorize(&info(Some("alice"), "my-script", "/home/alice/my-script")),
            ProcessCategory::User
        );
    }
}
