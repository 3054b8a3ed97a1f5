//! A sampling-oriented reader for Linux pseudo-files
//!
//! Linux pseudo-files, such as those from /proc, have a number of special
//! characteristics that are best accounted for through a special abstraction
//! when performing sampling measurements:
//!
//! - They are small (a few kB at most), so it is best to read them in one go.
//! - They do not live on hardware devices, but are generated on the host CPU.
//!   So there is no performance benefit in reading them asynchronously.
//! - They almost exclusively contain ASCII-encoded text.
//! - Their size does not vary much. So a buffer which was large enough for one
//!   read is likely to be suitable for the next read. But it does vary a bit
//!   (think CPU hotplug), so the length must be rediscovered on every read.
//! - One can update their "contents" just by seeking to the beginning.
//! - Their format is part of the kernel ABI, and is thus expected to only be
//!   modified through backwards-compatible extensions.
//!
//! The ProcFileReader that is provided in this module is designed to properly
//! account for these characteristics while reading these pseudo-files.

use crate::error::Error;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};


/// Sampling-oriented reader for procfs pseudo-files
///
/// It should also work for files from sysfs, and it does work for regular
/// files, which is what the tests use to stand in for /proc.
///
pub struct ProcFileReader {
    /// Location of the file being sampled, for error reporting
    path: PathBuf,

    /// Persistent handle to the file being sampled
    file_handle: File,

    /// Buffer in which the bytes that are read out will be stored
    readout_buffer: Vec<u8>,
}
//
impl ProcFileReader {
    /// Attempt to open a proc pseudo-file
    ///
    /// Missing files and permission problems are reported here, once and for
    /// all, rather than on every readout.
    ///
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_owned();
        match File::open(&path) {
            Ok(file_handle) => {
                debug!(path = %path.display(), "opened pseudo-file");
                Ok(Self {
                    path,
                    file_handle,
                    readout_buffer: Vec::new(),
                })
            },
            Err(source) => {
                warn!(path = %path.display(), %source,
                      "failed to open pseudo-file");
                Err(Error::Open { path, source })
            },
        }
    }

    /// Location of the file being sampled
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get back to the beginning of the file, forgetting the previous readout
    ///
    /// This is idempotent and cheap: the file is not reopened, and the readout
    /// buffer keeps its allocation.
    ///
    pub fn reset(&mut self) -> Result<(), Error> {
        self.readout_buffer.clear();
        self.file_handle.seek(SeekFrom::Start(0))
                        .map(|_| ())
                        .map_err(|source| self.read_error(source))
    }

    /// Read the file from the current position until its end
    pub fn read_all(&mut self) -> Result<&[u8], Error> {
        if let Err(source) =
            self.file_handle.read_to_end(&mut self.readout_buffer)
        {
            return Err(self.read_error(source));
        }
        Ok(&self.readout_buffer)
    }

    /// Acquire a new sample of data from the file
    ///
    /// This method takes care of loading the bytes from the file, and then
    /// hands them to a user-provided parser which shall do whatever it needs
    /// to do with them (including mutating external state).
    ///
    pub fn sample<F, R>(&mut self, parser: F) -> Result<R, Error>
        where F: FnOnce(&[u8]) -> R
    {
        // Get back to the start of the file and read its current contents
        self.reset()?;
        let contents = self.read_all()?;

        // Run the user-provided parser on the file contents
        Ok(parser(contents))
    }

    /// INTERNAL: Wrap an I/O error that occured during readout
    fn read_error(&self, source: std::io::Error) -> Error {
        warn!(path = %self.path.display(), %source,
              "failed to read pseudo-file");
        Error::Read { path: self.path.clone(), source }
    }
}
