//! Permission Manager — per-agent capability sets and resource counters.

use crate::types::{FileSystemAccess, Permissions, ResourceCounters};
use dashmap::DashMap;

/// Class of action a tool call falls into, for counter bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionClass {
    ReadFile,
    WriteFile,
    ToolCall,
    NetworkCall,
}

pub fn classify_action(tool_name: &str) -> ActionClass {
    match tool_name {
        "read" | "glob" | "grep" => ActionClass::ReadFile,
        "write" | "edit" => ActionClass::WriteFile,
        "web" | "fetch" | "http" => ActionClass::NetworkCall,
        _ => ActionClass::ToolCall,
    }
}

struct Entry {
    permissions: Permissions,
    counters: ResourceCounters,
}

/// Tracks the immutable permission bundle and mutable resource counters for
/// every registered agent. Per-task overrides (`register_scoped`) can only
/// narrow the supplied global preset, never widen it.
#[derive(Default)]
pub struct PermissionManager {
    agents: DashMap<String, Entry>,
}

impl PermissionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent_id: &str, permissions: Permissions) {
        self.agents.insert(
            agent_id.to_string(),
            Entry {
                permissions,
                counters: ResourceCounters::default(),
            },
        );
    }

    /// Register with a task-specific override, clamped so it cannot exceed
    /// `global`. Widening attempts (e.g. a task asking for more tool calls
    /// than the global cap) are silently clamped down to the global value.
    pub fn register_scoped(&self, agent_id: &str, global: &Permissions, mut task_override: Permissions) {
        task_override.max_tool_calls = task_override.max_tool_calls.min(global.max_tool_calls);
        task_override.max_file_reads = task_override.max_file_reads.min(global.max_file_reads);
        task_override.max_file_writes = task_override.max_file_writes.min(global.max_file_writes);
        task_override.max_network_calls = task_override.max_network_calls.min(global.max_network_calls);
        task_override.network_access = task_override.network_access && global.network_access;
        task_override.dangerous_operations = task_override.dangerous_operations && global.dangerous_operations;
        task_override.git_operations = task_override.git_operations && global.git_operations;
        if global.file_system_access == FileSystemAccess::None {
            task_override.file_system_access = FileSystemAccess::None;
        } else if global.file_system_access == FileSystemAccess::Read
            && task_override.file_system_access == FileSystemAccess::Write
        {
            task_override.file_system_access = FileSystemAccess::Read;
        }
        task_override.restricted = task_override.restricted.union(&global.restricted).cloned().collect();
        self.register(agent_id, task_override);
    }

    pub fn deregister(&self, agent_id: &str) {
        self.agents.remove(agent_id);
    }

    pub fn counters(&self, agent_id: &str) -> Option<ResourceCounters> {
        self.agents.get(agent_id).map(|e| e.counters)
    }

    /// Check whether `tool_name` is callable under the agent's permissions and
    /// counters, and if so increment the relevant counter. Returns `Err` with
    /// a human-readable reason when denied.
    pub fn check_and_record(&self, agent_id: &str, tool_name: &str) -> Result<(), String> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| format!("agent '{}' has no registered permissions", agent_id))?;

        if entry.permissions.restricted.contains(tool_name) {
            return Err(format!("tool '{}' is restricted for this agent", tool_name));
        }
        if !entry.permissions.allowed.is_empty() && !entry.permissions.allowed.contains(tool_name) {
            return Err(format!("tool '{}' is not in the allowed set", tool_name));
        }
        if entry.permissions.read_only && classify_action(tool_name) == ActionClass::WriteFile {
            return Err("agent is read-only".to_string());
        }
        if entry.permissions.file_system_access == FileSystemAccess::None
            && matches!(classify_action(tool_name), ActionClass::ReadFile | ActionClass::WriteFile)
        {
            return Err("agent has no filesystem access".to_string());
        }

        if entry.counters.tool_calls + 1 > entry.permissions.max_tool_calls {
            return Err("max_tool_calls exceeded".to_string());
        }

        match classify_action(tool_name) {
            ActionClass::ReadFile => {
                if entry.counters.file_reads + 1 > entry.permissions.max_file_reads {
                    return Err("max_file_reads exceeded".to_string());
                }
                entry.counters.file_reads += 1;
            }
            ActionClass::WriteFile => {
                if entry.counters.file_writes + 1 > entry.permissions.max_file_writes {
                    return Err("max_file_writes exceeded".to_string());
                }
                entry.counters.file_writes += 1;
            }
            ActionClass::NetworkCall => {
                if !entry.permissions.network_access {
                    return Err("network access denied".to_string());
                }
                if entry.counters.network_calls + 1 > entry.permissions.max_network_calls {
                    return Err("max_network_calls exceeded".to_string());
                }
                entry.counters.network_calls += 1;
            }
            ActionClass::ToolCall => {}
        }

        entry.counters.tool_calls += 1;
        Ok(())
    }

    pub fn record_tokens(&self, agent_id: &str, tokens: u64) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            entry.counters.tokens += tokens;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SecurityMode;

    #[test]
    fn denies_write_when_read_only() {
        let mgr = PermissionManager::new();
        let mut perms = SecurityMode::Strict.defaults();
        perms.read_only = true;
        mgr.register("a1", perms);
        assert!(mgr.check_and_record("a1", "write").is_err());
        assert!(mgr.check_and_record("a1", "read").is_ok());
    }

    #[test]
    fn enforces_tool_call_cap() {
        let mgr = PermissionManager::new();
        let mut perms = SecurityMode::Default.defaults();
        perms.max_tool_calls = 2;
        mgr.register("a1", perms);
        assert!(mgr.check_and_record("a1", "read").is_ok());
        assert!(mgr.check_and_record("a1", "read").is_ok());
        assert!(mgr.check_and_record("a1", "read").is_err());
    }

    #[test]
    fn scoped_override_cannot_widen_global() {
        let mgr = PermissionManager::new();
        let global = SecurityMode::Strict.defaults();
        let mut wide_task = SecurityMode::Development.defaults();
        wide_task.max_tool_calls = 999;
        mgr.register_scoped("a1", &global, wide_task);
        let counters_before = mgr.counters("a1").unwrap();
        assert_eq!(counters_before.tool_calls, 0);
        for _ in 0..global.max_tool_calls {
            assert!(mgr.check_and_record("a1", "read").is_ok());
        }
        assert!(mgr.check_and_record("a1", "read").is_err());
    }
}
