pub mod hot_reload;
pub mod loader;

pub use hot_reload::{ReloadStats, RuleStore, RuleWatcher};
pub use loader::{load_rules, load_rules_from_bytes, LoadError, RuleLoader};
