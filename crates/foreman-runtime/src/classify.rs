use foreman_types::{AgentEvent, Severity, WorkspaceTag};

/// Routing assignment for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub workspace: WorkspaceTag,
    pub secondary_workspaces: Vec<WorkspaceTag>,
}

/// Pure, deterministic routing: decisions block humans so they land in the
/// queue; artifact topology lands on the map; everything else flows down
/// the timeline. High-severity coherence issues and critical errors
/// additionally surface in the queue.
pub fn classify(event: &AgentEvent) -> Classified {
    match event {
        AgentEvent::Decision(_) => Classified {
            workspace: WorkspaceTag::Queue,
            secondary_workspaces: Vec::new(),
        },
        AgentEvent::Artifact(_) => Classified {
            workspace: WorkspaceTag::Map,
            secondary_workspaces: Vec::new(),
        },
        AgentEvent::Coherence(issue) => Classified {
            workspace: WorkspaceTag::Map,
            secondary_workspaces: match issue.severity {
                Severity::Critical | Severity::High => vec![WorkspaceTag::Queue],
                _ => Vec::new(),
            },
        },
        AgentEvent::Error(error) if error.severity != Severity::Warning => Classified {
            workspace: WorkspaceTag::Timeline,
            secondary_workspaces: match error.severity {
                Severity::Critical => vec![WorkspaceTag::Queue],
                _ => Vec::new(),
            },
        },
        _ => Classified {
            workspace: WorkspaceTag::Timeline,
            secondary_workspaces: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_types::{
        CoherenceCategory, CoherenceEvent, ErrorCategory, ErrorEvent, StatusEvent,
    };

    fn coherence(severity: Severity) -> AgentEvent {
        AgentEvent::Coherence(CoherenceEvent {
            agent_id: "agent-1".to_string(),
            issue_id: "i1".to_string(),
            category: CoherenceCategory::Duplication,
            severity,
            title: "t".to_string(),
            description: String::new(),
            affected_workstreams: vec![],
            affected_artifact_ids: vec![],
        })
    }

    fn error(severity: Severity) -> AgentEvent {
        AgentEvent::Error(ErrorEvent {
            agent_id: "agent-1".to_string(),
            severity,
            message: "boom".to_string(),
            recoverable: false,
            category: ErrorCategory::Tool,
            context: None,
        })
    }

    #[test]
    fn test_routing_table() {
        let status = AgentEvent::Status(StatusEvent {
            agent_id: "agent-1".to_string(),
            message: "ok".to_string(),
            tick: None,
        });
        assert_eq!(classify(&status).workspace, WorkspaceTag::Timeline);

        assert_eq!(classify(&coherence(Severity::Low)).workspace, WorkspaceTag::Map);
        assert!(classify(&coherence(Severity::Low)).secondary_workspaces.is_empty());

        let high = classify(&coherence(Severity::High));
        assert_eq!(high.workspace, WorkspaceTag::Map);
        assert_eq!(high.secondary_workspaces, vec![WorkspaceTag::Queue]);
    }

    #[test]
    fn test_critical_errors_also_reach_queue() {
        let critical = classify(&error(Severity::Critical));
        assert_eq!(critical.workspace, WorkspaceTag::Timeline);
        assert_eq!(critical.secondary_workspaces, vec![WorkspaceTag::Queue]);

        let medium = classify(&error(Severity::Medium));
        assert!(medium.secondary_workspaces.is_empty());

        let warning = classify(&error(Severity::Warning));
        assert_eq!(warning.workspace, WorkspaceTag::Timeline);
        assert!(warning.secondary_workspaces.is_empty());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let event = coherence(Severity::Critical);
        assert_eq!(classify(&event), classify(&event));
    }
}
