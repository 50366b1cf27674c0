//! Global database registry for singleton management
//!
//! Ensures only one open Database instance exists per directory. Uses weak
//! references so a database that is dropped without `close()` is not kept
//! alive by the registry.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Weak;

use super::Database;

// Opening the same directory twice returns the same Database instance, so two
// log writers never flush the same log file.
//
// parking_lot::Mutex avoids poisoning if a panic happens while it is held.

/// Global registry of open databases (canonical path -> weak reference)
pub static OPEN_DATABASES: Lazy<Mutex<HashMap<PathBuf, Weak<Database>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
