use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Extension of the entry index file
pub const MAIN_EXTENSION: &str = ".main";
/// Extension of the word blob file
pub const WORDS_EXTENSION: &str = ".words";
/// Extension of the time-table file
pub const TIME_EXTENSION: &str = ".time";

/// Paths of the three files that make up one store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorePaths {
    pub main: PathBuf,
    pub words: PathBuf,
    pub time: PathBuf,
}

impl StorePaths {
    /// Derive the file paths from a base name such as `data/sort/eng-1gram`
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        Self {
            main: with_suffix(base, MAIN_EXTENSION),
            words: with_suffix(base, WORDS_EXTENSION),
            time: with_suffix(base, TIME_EXTENSION),
        }
    }

    /// True when all three files are present
    pub fn exists(&self) -> bool {
        self.main.is_file() && self.words.is_file() && self.time.is_file()
    }

    /// Create or truncate all three files for writing
    pub(crate) fn create(&self) -> io::Result<(File, File, File)> {
        if let Some(parent) = self.main.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let open = |path: &Path| {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
        };
        Ok((open(&self.main)?, open(&self.words)?, open(&self.time)?))
    }

    /// Open all three files read-only
    pub(crate) fn open_read(&self) -> io::Result<(File, File, File)> {
        Ok((
            File::open(&self.main)?,
            File::open(&self.words)?,
            File::open(&self.time)?,
        ))
    }

    /// Remove all three files, ignoring ones that are already gone
    pub fn remove(&self) -> io::Result<()> {
        for path in [&self.main, &self.words, &self.time] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
