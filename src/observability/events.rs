//! Observability events
//!
//! Every event the core emits is explicit and typed. Names are stable and
//! appear verbatim in the `event` field of each log line.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Event subscriber
    /// Handler registered against a key
    HandlerAdd,
    /// Boot phase found a value for a registered key
    BootTriggerHandler,
    /// Boot phase found no value for a registered key
    BootNoInitialValue,
    /// Boot phase failed to read a registered key
    BootError,
    /// Store watch opened
    WatchStart,
    /// Store watch delivered a change
    WatchChange,
    /// Store watch closed
    WatchFinish,
    /// Store watch stream broke
    WatchError,
    /// Handler completed
    HandlerSuccess,
    /// Event older than the last processed revision, dropped
    HandlerStaleKey,
    /// Handler failed, retry scheduled
    HandlerError,
    /// Handler retry firing
    HandlerRetry,

    // Cluster state poller
    /// Poll tick begins
    PollStart,
    /// Poll tick failed and was skipped
    PollError,
    /// Poll loop stopped
    PollStop,
    /// Cached attribute value expired
    CacheExpire,
    /// Watched attribute changed value
    NodeChange,
    /// Watched element missing from the CIB
    NodeMissing,

    // Streams
    /// Dedupe filter dropped an unchanged value
    FilterValueUnchanged,
    /// Revision filter dropped an out-of-order revision
    FilterStaleRevision,
    /// Filter input closed
    FilterClose,
    /// Key stream periodic get failed
    StreamGetError,

    // Store
    /// Mirror write applied
    StoreUpdate,
    /// Mirror write skipped, value unchanged
    StoreUnchanged,

    // Proxy
    /// Proxy pause executing
    ProxyPauseExecute,
    /// Proxy pause failed
    ProxyPauseError,
    /// Proxy resume executing
    ProxyResumeExecute,
    /// Proxy resume failed
    ProxyResumeError,
    /// Auto-resume scheduled for pause expiry
    ProxyResumeSchedule,
    /// Proxy configuration regenerated for a new host
    ProxyHostChange,

    // Failover agent
    /// CIB query failed
    CrmQueryError,
    /// No synchronous standby in the CIB
    SyncNotFound,
    /// Synchronous standby address could not be resolved
    SyncCannotResolve,
    /// Migration command failed
    CrmMigrateError,
    /// Unmigrate command failed
    CrmUnmigrateError,

    // Failover coordinator
    /// Health checking every agent
    ClientsHealthCheck,
    /// Acquiring the failover lock
    LockAcquire,
    /// Releasing the failover lock
    LockRelease,
    /// Pausing every proxy
    ClientsPause,
    /// Resuming every proxy
    ClientsResume,
    /// Requesting migration from one agent
    ClientsMigrate,
    /// Requesting unmigrate from one agent
    ClientsUnmigrate,
    /// One agent finished a batched call
    ClientResult,
    /// Waiting for the store to report the new primary
    WaitForPrimary,
    /// New primary observed in the store
    PrimaryObserved,
    /// Failover finished successfully
    FailoverComplete,
    /// Failover failed
    FailoverError,
    /// Deferred cleanup failed
    CleanupError,

    // Supervisors
    /// Long-running supervisor started
    SuperviseStart,
    /// Long-running supervisor stopped
    SuperviseStop,

    // Server
    /// Agent HTTP server listening
    ServerListen,
    /// Agent HTTP server stopped
    ServerShutdown,
}

impl Event {
    /// Returns the stable event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::HandlerAdd => "HANDLER_ADD",
            Event::BootTriggerHandler => "BOOT_TRIGGER_HANDLER",
            Event::BootNoInitialValue => "BOOT_NO_INITIAL_VALUE",
            Event::BootError => "BOOT_ERROR",
            Event::WatchStart => "WATCH_START",
            Event::WatchChange => "WATCH_CHANGE",
            Event::WatchFinish => "WATCH_FINISH",
            Event::WatchError => "WATCH_ERROR",
            Event::HandlerSuccess => "HANDLER_SUCCESS",
            Event::HandlerStaleKey => "HANDLER_STALE_KEY",
            Event::HandlerError => "HANDLER_ERROR",
            Event::HandlerRetry => "HANDLER_RETRY",
            Event::PollStart => "POLL_START",
            Event::PollError => "POLL_ERROR",
            Event::PollStop => "POLL_STOP",
            Event::CacheExpire => "CACHE_EXPIRE",
            Event::NodeChange => "NODE_CHANGE",
            Event::NodeMissing => "NODE_MISSING",
            Event::FilterValueUnchanged => "FILTER_VALUE_UNCHANGED",
            Event::FilterStaleRevision => "FILTER_STALE_REVISION",
            Event::FilterClose => "FILTER_CLOSE",
            Event::StreamGetError => "STREAM_GET_ERROR",
            Event::StoreUpdate => "STORE_UPDATE",
            Event::StoreUnchanged => "STORE_UNCHANGED",
            Event::ProxyPauseExecute => "PROXY_PAUSE_EXECUTE",
            Event::ProxyPauseError => "PROXY_PAUSE_ERROR",
            Event::ProxyResumeExecute => "PROXY_RESUME_EXECUTE",
            Event::ProxyResumeError => "PROXY_RESUME_ERROR",
            Event::ProxyResumeSchedule => "PROXY_RESUME_SCHEDULE",
            Event::ProxyHostChange => "PROXY_HOST_CHANGE",
            Event::CrmQueryError => "CRM_QUERY_ERROR",
            Event::SyncNotFound => "SYNC_NOT_FOUND",
            Event::SyncCannotResolve => "SYNC_CANNOT_RESOLVE",
            Event::CrmMigrateError => "CRM_MIGRATE_ERROR",
            Event::CrmUnmigrateError => "CRM_UNMIGRATE_ERROR",
            Event::ClientsHealthCheck => "CLIENTS_HEALTH_CHECK",
            Event::LockAcquire => "LOCK_ACQUIRE",
            Event::LockRelease => "LOCK_RELEASE",
            Event::ClientsPause => "CLIENTS_PAUSE",
            Event::ClientsResume => "CLIENTS_RESUME",
            Event::ClientsMigrate => "CLIENTS_MIGRATE",
            Event::ClientsUnmigrate => "CLIENTS_UNMIGRATE",
            Event::ClientResult => "CLIENT_RESULT",
            Event::WaitForPrimary => "WAIT_FOR_PRIMARY",
            Event::PrimaryObserved => "PRIMARY_OBSERVED",
            Event::FailoverComplete => "FAILOVER_COMPLETE",
            Event::FailoverError => "FAILOVER_ERROR",
            Event::CleanupError => "CLEANUP_ERROR",
            Event::SuperviseStart => "SUPERVISE_START",
            Event::SuperviseStop => "SUPERVISE_STOP",
            Event::ServerListen => "SERVER_LISTEN",
            Event::ServerShutdown => "SERVER_SHUTDOWN",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_screaming_snake() {
        for event in [Event::HandlerStaleKey, Event::ProxyResumeSchedule, Event::ServerShutdown] {
            let name = event.as_str();
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_display_matches_as_str() {
        assert_eq!(format!("{}", Event::WaitForPrimary), "WAIT_FOR_PRIMARY");
    }
}
