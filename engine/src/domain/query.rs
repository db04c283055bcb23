//! Process query filter: a total function over `RegistryProcess` that never
//! panics on absent fields (spec.md §8 property 3).

use chrono::{DateTime, Utc};

use super::process::{ProcessStatus, RegistryProcess};

#[derive(Debug, Clone, Default)]
pub struct ProcessQuery {
    pub name_contains: Option<String>,
    pub user: Option<String>,
    pub command_contains: Option<String>,
    pub status: Option<ProcessStatus>,
    pub min_cpu: Option<f32>,
    pub min_memory: Option<u64>,
    /// Matches if the process has ANY of these tags.
    pub tags: Vec<String>,
    pub is_managed: Option<bool>,
    pub first_seen_after: Option<DateTime<Utc>>,
    pub last_seen_after: Option<DateTime<Utc>>,
    pub min_seen_count: Option<u64>,
    pub max_seen_count: Option<u64>,
}

impl ProcessQuery {
    pub fn matches(&self, process: &RegistryProcess) -> bool {
        if let Some(ref needle) = self.name_contains {
            if !process
                .info
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(ref user) = self.user {
            if process.info.user.as_deref() != Some(user.as_str()) {
                return false;
            }
        }
        if let Some(ref needle) = self.command_contains {
            if !process
                .info
                .command
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(status) = self.status {
            if process.info.status != status {
                return false;
            }
        }
        if let Some(min_cpu) = self.min_cpu {
            if process.info.cpu < min_cpu {
                return false;
            }
        }
        if let Some(min_memory) = self.min_memory {
            if process.info.memory < min_memory {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| process.tags.contains(t)) {
            return false;
        }
        if let Some(is_managed) = self.is_managed {
            if process.is_managed != is_managed {
                return false;
            }
        }
        if let Some(after) = self.first_seen_after {
            if process.first_seen < after {
                return false;
            }
        }
        if let Some(after) = self.last_seen_after {
            if process.last_seen < after {
                return false;
            }
        }
        if let Some(min) = self.min_seen_count {
            if process.seen_count < min {
                return false;
            }
        }
        if let Some(max) = self.max_seen_count {
            if process.seen_count > max {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::process::{ProcessInfo, RegistryId};
    use chrono::Utc;

    fn sample(name: &str, cpu: f32) -> RegistryProcess {
        let now = Utc::now();
        RegistryProcess::new(
            RegistryId::generate(),
            ProcessInfo {
                pid: 100,
                ppid: None,
                name: name.to_string(),
                command: format!("/usr/bin/{name}"),
                args: vec![],
                user: Some("root".to_string()),
                cpu,
                memory: 1024,
                vsz: 2048,
                rss: 1024,
                start_time: now,
                status: ProcessStatus::Running,
            },
            now,
        )
    }

    #[test]
    fn empty_filter_matches_all() {
        let p = sample("web", 10.0);
        assert!(ProcessQuery::default().matches(&p));
    }

    #[test]
    fn composed_filters_are_an_intersection() {
        let p = sample("web-server", 75.0);
        let query = ProcessQuery {
            name_contains: Some("web".to_string()),
            min_cpu: Some(50.0),
            ..Default::default()
        };
        assert!(query.matches(&p));

        let query_excluding = ProcessQuery {
            name_contains: Some("web".to_string()),
            min_cpu: Some(90.0),
            ..Default::default()
        };
        assert!(!query_excluding.matches(&p));
    }

    #[test]
    fn never_panics_on_absent_optional_fields() {
        let mut p = sample("db", 5.0);
        p.info.user = None;
        let query = ProcessQuery {
            user: Some("nobody".to_string()),
            ..Default::default()
        };
        assert!(!query.matches(&p));
    }
}
