use std::collections::HashMap;

use super::{Downloader, JobKind};

/// Downloader per job kind, built once at startup and shared by reference
/// with every scheduler worker.
#[derive(Default)]
pub struct Registry {
    downloaders: HashMap<JobKind, Box<dyn Downloader>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `downloader` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: JobKind, downloader: impl Downloader + 'static) -> &mut Self {
        self.downloaders.insert(kind, Box::new(downloader));
        self
    }

    pub fn get(&self, kind: JobKind) -> Option<&dyn Downloader> {
        self.downloaders.get(&kind).map(|d| d.as_ref())
    }

    pub fn contains(&self, kind: JobKind) -> bool {
        self.downloaders.contains_key(&kind)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.downloaders.keys().map(JobKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("Registry").field("kinds", &kinds).finish()
    }
}
