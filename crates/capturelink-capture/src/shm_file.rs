//! File-backed segments (non-Windows).
//!
//! Producers on Linux publish the header as a regular file under a tmpfs
//! directory (`/dev/shm` by default); this maps it read-only with `memmap2`.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use capturelink_core::{ChannelError, FrameHeader};
use memmap2::Mmap;

pub(crate) struct Segment {
    name: String,
    path: PathBuf,
    mmap: Mmap,
    #[cfg(unix)]
    inode: u64,
    _file: File,
}

impl Segment {
    /// `Ok(None)` while the producer has not created (or sized) the segment.
    pub(crate) fn open(name: &str, shm_dir: &Path) -> Result<Option<Self>, ChannelError> {
        let path = shm_dir.join(name);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata()?;
        if (meta.len() as usize) < FrameHeader::SIZE {
            return Ok(None);
        }

        // SAFETY: the mapping is read-only and only ever copied out of with
        // volatile reads; the producer owns all writes.
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Some(Self {
            name: name.to_owned(),
            path,
            mmap,
            #[cfg(unix)]
            inode: std::os::unix::fs::MetadataExt::ino(&meta),
            _file: file,
        }))
    }

    pub(crate) fn read(&self) -> Result<[u8; FrameHeader::SIZE], ChannelError> {
        // A truncated backing file would fault on access, so re-check it first.
        let meta = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ChannelError::Vanished { name: self.name.clone() });
            }
            Err(e) => return Err(e.into()),
        };
        #[cfg(unix)]
        if std::os::unix::fs::MetadataExt::ino(&meta) != self.inode {
            return Err(ChannelError::Vanished { name: self.name.clone() });
        }
        let len = (meta.len() as usize).min(self.mmap.len());
        if len < FrameHeader::SIZE {
            return Err(ChannelError::Truncated {
                name: self.name.clone(),
                len,
                needed: FrameHeader::SIZE,
            });
        }

        let mut out = [0u8; FrameHeader::SIZE];
        let base = self.mmap.as_ptr();
        for (i, byte) in out.iter_mut().enumerate() {
            // SAFETY: i < SIZE <= mmap.len(), checked above.
            *byte = unsafe { std::ptr::read_volatile(base.add(i)) };
        }
        Ok(out)
    }
}
