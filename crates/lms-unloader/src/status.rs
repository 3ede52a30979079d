use std::fmt;
use std::sync::Mutex;

/// Terminal outcome of one unload attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnloadStatus {
    /// The host dropped the model in response to this request.
    Unloaded(String),
    /// The model was already absent.
    NotLoaded(String),
}

impl UnloadStatus {
    pub fn identifier(&self) -> &str {
        match self {
            UnloadStatus::Unloaded(id) | UnloadStatus::NotLoaded(id) => id,
        }
    }
}

impl fmt::Display for UnloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnloadStatus::Unloaded(id) => write!(f, "Unloaded: {}", quote(id)),
            UnloadStatus::NotLoaded(id) => {
                write!(f, "Unloaded: {} (model was not loaded)", quote(id))
            }
        }
    }
}

// Single quotes unless the identifier itself contains one and no double quote,
// the way harness output has always been quoted. Control characters become `\xNN`.
fn quote(id: &str) -> String {
    let delimiter = if id.contains('\'') && !id.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut quoted = String::with_capacity(id.len() + 2);
    quoted.push(delimiter);
    for c in id.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            c if c == delimiter => {
                quoted.push('\\');
                quoted.push(c);
            }
            c if c.is_control() => quoted.push_str(&format!("\\x{:02x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push(delimiter);
    quoted
}

/// Receives each status as soon as its attempt finishes.
pub trait StatusReporter: Send + Sync {
    fn report(&self, status: &UnloadStatus);
}

/// Prints one line per status to stdout.
pub struct StdoutReporter;

impl StatusReporter for StdoutReporter {
    fn report(&self, status: &UnloadStatus) {
        println!("{}", status);
    }
}

/// Keeps every reported status in arrival order.
#[derive(Default)]
pub struct MemoryReporter {
    statuses: Mutex<Vec<UnloadStatus>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<UnloadStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.statuses().iter().map(|s| s.to_string()).collect()
    }
}

impl StatusReporter for MemoryReporter {
    fn report(&self, status: &UnloadStatus) {
        self.statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(status.clone());
    }
}
