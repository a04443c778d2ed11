//! Metadata Logging
//!
//! Structured event log for table construction and the rare runtime events
//! worth keeping (forbidden dispatch, root fix-ups). Free-form diagnostics go
//! through the `log` facade; this module keeps typed events so tools and
//! tests can inspect what happened.
//!
//! Log Levels:
//! - ERROR: forbidden dispatch reached
//! - INFO: metadata built, artifact loaded, roots frozen
//! - DEBUG: ambiguous classes, root fix-up and teardown
//! - TRACE: per-class registration

use crate::dispatch::Phase;
use crate::stamp::{StampId, StampRange};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log level for metadata events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Metadata event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataEvent {
    /// A class received its stamp
    ClassRegistered {
        name: String,
        stamp: StampId,
        range: StampRange,
    },

    /// A class needs the confirming type test
    AmbiguousClass { name: String, bases: Vec<String> },

    /// All tables built and cross-checked
    MetadataBuilt {
        classes: usize,
        ambiguous: usize,
        traced_slots: usize,
        routines: usize,
    },

    /// A layout artifact was turned into metadata
    ArtifactLoaded { build_id: String, classes: usize },

    /// A forbidden dispatch entry was reached
    ForbiddenDispatch {
        phase: Phase,
        class: String,
        stamp: StampId,
    },

    /// Global root registration closed
    RootsFrozen { count: usize },

    /// Global roots rewritten after relocation
    RootsFixedUp { visited: usize, updated: usize },

    /// Global roots cleared at shutdown
    RootsTornDown { count: usize },
}

/// Metadata logger configuration
#[derive(Debug, Clone)]
pub struct MetadataLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Echo events to stdout
    pub console: bool,

    /// JSON lines instead of human-readable text
    pub json: bool,

    /// Prefix console lines with a timestamp
    pub timestamps: bool,

    /// Events kept in memory; oldest are dropped first
    pub capacity: usize,
}

impl Default for MetadataLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
            capacity: 1024,
        }
    }
}

/// Metadata Logger - in-memory event buffer with optional console echo
pub struct MetadataLogger {
    config: MetadataLoggerConfig,
    events: Mutex<VecDeque<(Instant, MetadataEvent)>>,
    enabled: AtomicBool,
}

impl MetadataLogger {
    pub fn new(config: MetadataLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &MetadataLoggerConfig {
        &self.config
    }

    /// Record an event
    pub fn log(&self, event: MetadataEvent) {
        if !self.is_enabled() || Self::event_level(&event) > self.config.level {
            return;
        }

        if self.config.console {
            self.output_console(&event);
        }

        let mut events = self.events.lock();
        if self.config.capacity > 0 && events.len() == self.config.capacity {
            events.pop_front();
        }
        events.push_back((Instant::now(), event));
    }

    fn event_level(event: &MetadataEvent) -> LogLevel {
        match event {
            MetadataEvent::ForbiddenDispatch { .. } => LogLevel::Error,
            MetadataEvent::MetadataBuilt { .. }
            | MetadataEvent::ArtifactLoaded { .. }
            | MetadataEvent::RootsFrozen { .. } => LogLevel::Info,
            MetadataEvent::AmbiguousClass { .. }
            | MetadataEvent::RootsFixedUp { .. }
            | MetadataEvent::RootsTornDown { .. } => LogLevel::Debug,
            MetadataEvent::ClassRegistered { .. } => LogLevel::Trace,
        }
    }

    fn output_console(&self, event: &MetadataEvent) {
        let prefix = if self.config.timestamps {
            format!("[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        } else {
            String::new()
        };

        if self.config.json {
            if let Ok(json) = serde_json::to_string(event) {
                println!("{}{}", prefix, json);
            }
        } else {
            println!("{}[stampgc] {}", prefix, Self::human(event));
        }
    }

    fn human(event: &MetadataEvent) -> String {
        match event {
            MetadataEvent::ClassRegistered { name, stamp, range } => {
                format!("class `{}` registered as {} {}", name, stamp, range)
            }
            MetadataEvent::AmbiguousClass { name, bases } => {
                format!("class `{}` is ambiguous via {}", name, bases.join(", "))
            }
            MetadataEvent::MetadataBuilt {
                classes,
                ambiguous,
                traced_slots,
                routines,
            } => format!(
                "metadata built: {} classes, {} ambiguous, {} traced slots, {} routines",
                classes, ambiguous, traced_slots, routines
            ),
            MetadataEvent::ArtifactLoaded { build_id, classes } => {
                format!("artifact `{}` loaded ({} classes)", build_id, classes)
            }
            MetadataEvent::ForbiddenDispatch {
                phase,
                class,
                stamp,
            } => format!("forbidden {} of class `{}` (stamp {})", phase, class, stamp),
            MetadataEvent::RootsFrozen { count } => {
                format!("global root table frozen with {} slots", count)
            }
            MetadataEvent::RootsFixedUp { visited, updated } => {
                format!("global roots fixed up: {} visited, {} updated", visited, updated)
            }
            MetadataEvent::RootsTornDown { count } => {
                format!("global roots torn down: {} slots cleared", count)
            }
        }
    }

    /// Snapshot of buffered events
    pub fn events(&self) -> Vec<(Instant, MetadataEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for MetadataLogger {
    fn default() -> Self {
        Self::new(MetadataLoggerConfig::default())
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<MetadataLogger> = Mutex::new(MetadataLogger::default());
}

/// Log an event to the global logger
pub fn log_event(event: MetadataEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Replace the global logger configuration
pub fn configure_logger(config: MetadataLoggerConfig) {
    *GLOBAL_LOGGER.lock() = MetadataLogger::new(config);
}

/// Turn console echo of the global logger on or off, keeping its events
pub fn set_console_output(enabled: bool) {
    GLOBAL_LOGGER.lock().config.console = enabled;
}

/// Whether the global logger echoes events to the console
pub fn console_output_enabled() -> bool {
    GLOBAL_LOGGER.lock().config.console
}

/// Snapshot of the global logger's events
pub fn global_events() -> Vec<MetadataEvent> {
    GLOBAL_LOGGER
        .lock()
        .events()
        .into_iter()
        .map(|(_, event)| event)
        .collect()
}

pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built() -> MetadataEvent {
        MetadataEvent::MetadataBuilt {
            classes: 5,
            ambiguous: 1,
            traced_slots: 12,
            routines: 2,
        }
    }

    #[test]
    fn test_logger_basic() {
        let logger = MetadataLogger::default();
        logger.log(built());
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_logger_disable() {
        let logger = MetadataLogger::default();
        logger.disable();
        logger.log(built());
        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_level_filter() {
        let logger = MetadataLogger::default();
        logger.log(MetadataEvent::ClassRegistered {
            name: "Cons".into(),
            stamp: StampId(3),
            range: StampRange::leaf(StampId(3)),
        });
        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let logger = MetadataLogger::new(MetadataLoggerConfig {
            capacity: 2,
            ..Default::default()
        });
        for count in 0..3 {
            logger.log(MetadataEvent::RootsFrozen { count });
        }
        let events = logger.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1, MetadataEvent::RootsFrozen { count: 1 });
    }

    #[test]
    fn test_json_tagging() {
        let json = serde_json::to_value(MetadataEvent::ForbiddenDispatch {
            phase: Phase::Finalize,
            class: "HashTableStorage".into(),
            stamp: StampId(7),
        })
        .unwrap();
        assert_eq!(json["type"], "forbidden_dispatch");
        assert_eq!(json["phase"], "finalize");
        assert_eq!(json["stamp"], 7);
    }

    #[test]
    fn test_global_logger() {
        log_event(built());
        assert!(get_event_count() > 0);
    }
}
