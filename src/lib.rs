#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod error;
pub mod config;
pub mod metrics;
pub mod lock;

// Реестры .storage/core.* (load/save/cache)
pub mod registry;   // src/registry/{mod,doc,cache}.rs

// Снапшоты: backup, scan, diff, restore, retention
pub mod snapshots;  // src/snapshots/{mod,diff,restore,retention}.rs

// Детекторы
pub mod definitions;
pub mod orphans;
pub mod suffix;

// Мутации реестров
pub mod cleanup;

// Recorder DB (SQLite)
pub mod recorder;

// Оператор и хост
pub mod selection;
pub mod prompt;
pub mod host;

// Удобные реэкспорты
pub use config::CleanupConfig;
pub use error::{CleanupError, Result};
pub use registry::{DocCache, Entity, MtimeCache, NoCache, RegistryDoc, RegistryStore};
pub use orphans::{detect_orphans, find_orphans, Orphan, OrphanReason};
pub use suffix::{find_suffix_collisions, SuffixCollision};
pub use selection::{parse_selection, SelectionSet};
pub use host::{with_host_stopped, BatchReport, CommandHost, ControlMethod, HostControl};
pub use prompt::{Operator, ScriptedOperator, TerminalOperator};
