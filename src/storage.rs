//! Rule list sources and the storage an engine is built from.

use std::fs::File;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use memmap2::Mmap;

use crate::Result;

/// ID reserved for ad-hoc rules passed as inline text.
pub const INLINE_FILTER_ID: i64 = 0;

/// Filter is a named rule list source.
///
/// A filter with ID 0 carries its rules inline in `data`. Any other ID is
/// backed by the file at `file_path`; a missing file is treated as an empty
/// list for that ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// List ID reported in results for rules of this list
    pub id: i64,
    /// Rules divided by `\n`, used when `id` is 0
    pub data: String,
    /// Path to a rules file, used when `id` is not 0
    pub file_path: Option<PathBuf>,
}

impl Filter {
    /// Ad-hoc in-memory rules.
    pub fn inline(data: impl Into<String>) -> Self {
        Self {
            id: INLINE_FILTER_ID,
            data: data.into(),
            file_path: None,
        }
    }

    /// File-backed rules.
    pub fn file(id: i64, path: impl AsRef<Path>) -> Self {
        Self {
            id,
            data: String::new(),
            file_path: Some(path.as_ref().to_path_buf()),
        }
    }
}

/// Where the text of one rule list lives.
enum ListSource {
    Text(String),
    #[cfg(unix)]
    Mapped(Mmap),
}

/// One rule list held by a [`RuleStorage`].
pub struct RuleList {
    id: i64,
    source: ListSource,
}

impl RuleList {
    /// Build the list for a filter source.
    ///
    /// On unix a present file is memory mapped read-only. Elsewhere the file
    /// is read fully into memory so that it can be replaced on disk while
    /// the list is in use.
    fn open(filter: &Filter) -> Result<Self> {
        if filter.id == INLINE_FILTER_ID {
            return Ok(Self::text(filter.id, filter.data.clone()));
        }

        let path = match filter.file_path.as_deref() {
            Some(p) if p.exists() => p,
            Some(p) => {
                log::debug!("Rule list {} file {:?} is missing, using empty list", filter.id, p);
                return Ok(Self::text(filter.id, String::new()));
            }
            None => return Ok(Self::text(filter.id, String::new())),
        };

        Self::open_file(filter.id, path)
    }

    #[cfg(unix)]
    fn open_file(id: i64, path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            // Zero-length files cannot be mapped
            return Ok(Self::text(id, String::new()));
        }
        // The mapping is read-only and private to this list
        let mmap = unsafe { Mmap::map(&file)? };
        utf8(&mmap)?;
        Ok(Self {
            id,
            source: ListSource::Mapped(mmap),
        })
    }

    #[cfg(not(unix))]
    fn open_file(id: i64, path: &Path) -> Result<Self> {
        use std::io::Read;

        let mut data = String::new();
        File::open(path)?.read_to_string(&mut data)?;
        Ok(Self::text(id, data))
    }

    fn text(id: i64, text: String) -> Self {
        Self {
            id,
            source: ListSource::Text(text),
        }
    }

    /// The list ID.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The rule text of this list.
    ///
    /// Fails with [`Error::Io`](crate::Error::Io) if a mapped file is not
    /// valid UTF-8.
    pub fn contents(&self) -> Result<&str> {
        match &self.source {
            ListSource::Text(text) => Ok(text.as_str()),
            #[cfg(unix)]
            ListSource::Mapped(mmap) => Ok(utf8(mmap)?),
        }
    }

    /// Whether the list is backed by a mapped file.
    pub fn is_file_backed(&self) -> bool {
        match self.source {
            ListSource::Text(_) => false,
            #[cfg(unix)]
            ListSource::Mapped(_) => true,
        }
    }
}

/// Rule files must be UTF-8, the same check `read_to_string` applies.
#[cfg(unix)]
fn utf8(bytes: &[u8]) -> std::io::Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// RuleStorage owns the rule lists an engine was built from.
pub struct RuleStorage {
    lists: Vec<RuleList>,
}

impl RuleStorage {
    /// Create storage for a set of filters, in order.
    pub fn new(filters: &[Filter]) -> Result<Self> {
        let lists = filters
            .iter()
            .map(RuleList::open)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { lists })
    }

    /// The lists held by this storage.
    pub fn lists(&self) -> &[RuleList] {
        &self.lists
    }

    /// Release all lists. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.lists.is_empty() {
            log::debug!("Closing rule storage with {} lists", self.lists.len());
            self.lists.clear();
        }
    }

    /// Whether the storage has been closed or holds no lists.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

impl Drop for RuleStorage {
    fn drop(&mut self) {
        self.close();
    }
}
