//! Tests for status aggregation

#[cfg(test)]
mod tests {
    use super::super::status::*;
    use crate::workload::{CheckInfo, CheckStatus};

    fn check(name: &str, status: CheckStatus) -> CheckInfo {
        CheckInfo {
            name: name.to_string(),
            level: None,
            status,
            failures: if status == CheckStatus::Down { 3 } else { 0 },
            threshold: 3,
        }
    }

    #[test]
    fn test_empty_collector_resolves_active() {
        assert_eq!(StatusCollector::new().resolve(), UnitStatus::active(""));
    }

    #[test]
    fn test_most_severe_wins_regardless_of_order() {
        let mut sink = StatusCollector::new();
        sink.add(UnitStatus::waiting("w"));
        sink.add(UnitStatus::blocked("b"));
        sink.add(UnitStatus::active("a"));
        assert_eq!(sink.resolve(), UnitStatus::blocked("b"));
    }

    #[test]
    fn test_first_added_wins_among_equals() {
        let mut sink = StatusCollector::new();
        sink.add(UnitStatus::waiting("first"));
        sink.add(UnitStatus::waiting("second"));
        assert_eq!(sink.resolve().message, "first");
    }

    #[test]
    fn test_nothing_connected_blocks_listing_every_integration() {
        let status = StatusManager::new()
            .require_relation("database", false)
            .require_relation("litmus-auth", false)
            .require_config("database config", false)
            .resolve();
        assert_eq!(status.level, StatusLevel::Blocked);
        assert_eq!(
            status.message,
            "Missing [database, litmus-auth] integration(s)."
        );
    }

    #[test]
    fn test_one_absent_fragment_waits_listing_it() {
        let status = StatusManager::new()
            .require_relation("database", true)
            .require_relation("litmus-auth", true)
            .require_config("database config", true)
            .require_config("auth grpc endpoint", false)
            .resolve();
        assert_eq!(status, UnitStatus::waiting("[auth grpc endpoint] not provided yet."));
    }

    #[test]
    fn test_everything_present_and_healthy_is_active() {
        let status = StatusManager::new()
            .require_relation("database", true)
            .require_config("database config", true)
            .checks(&[check("backend-up", CheckStatus::Up)])
            .active_message("Ready")
            .resolve();
        assert_eq!(status, UnitStatus::active("Ready"));
    }

    #[test]
    fn test_failing_check_blocks_once_configured() {
        let status = StatusManager::new()
            .require_relation("database", true)
            .require_config("database config", true)
            .checks(&[check("backend-up", CheckStatus::Down)])
            .resolve();
        assert_eq!(status.level, StatusLevel::Blocked);
        assert!(status.message.contains("backend-up"));
    }

    #[test]
    fn test_failing_check_ignored_while_waiting_for_config() {
        let status = StatusManager::new()
            .require_config("database config", false)
            .checks(&[check("backend-up", CheckStatus::Down)])
            .resolve();
        assert_eq!(status.level, StatusLevel::Waiting);
    }

    #[test]
    fn test_inconsistency_blocks_over_waiting() {
        let status = StatusManager::new()
            .require_config("frontend url", false)
            .require_consistency(vec!["tls certificate"])
            .resolve();
        assert_eq!(status.level, StatusLevel::Blocked);
        assert!(status.message.contains("tls certificate"));
    }

    #[test]
    fn test_active_is_always_appended_last() {
        let mut sink = StatusCollector::new();
        StatusManager::new()
            .require_relation("database", false)
            .active_message("done")
            .collect(&mut sink);
        let last = sink.statuses().last().unwrap();
        assert_eq!(last, &UnitStatus::active("done"));
    }
}
