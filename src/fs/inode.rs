/*
 * Inodes
 *
 * Minimal inode layer: files occupy contiguous sector runs handed out
 * by a bump allocator over the filesystem disk. This is the contract
 * the buffer cache and the file layer consume; the real on-disk
 * filesystem (directories, free map, metadata persistence) lives
 * outside the core and only needs to keep `byte_to_sector` honest.
 */

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::devices::block::{BlockDevice, SECTOR_SIZE, SectorIdx};

/// Inode identity, unique per filesystem instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Not enough contiguous sectors left on the disk.
    NoSpace,
}

/// An open inode: identity, extent, length.
pub struct Inode {
    id: InodeId,
    start: SectorIdx,
    length: u32,
}

impl Inode {
    pub fn id(&self) -> InodeId {
        self.id
    }

    /// Length of the file in bytes.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Translate a byte offset to its disk sector, or None past the end
    /// of the file (the -1 of the C contract).
    pub fn byte_to_sector(&self, offset: u32) -> Option<SectorIdx> {
        if offset < self.length {
            Some(self.start + offset / SECTOR_SIZE as u32)
        } else {
            None
        }
    }
}

struct Filesys {
    device: Arc<dyn BlockDevice>,
    next_sector: SectorIdx,
    next_inode: u32,
    /// Open inodes, so a path re-open shares the instance.
    inodes: Vec<Arc<Inode>>,
}

static FILESYS: Mutex<Option<Filesys>> = Mutex::new(None);

/// Mount the filesystem over `device`.
pub fn init(device: Arc<dyn BlockDevice>) {
    log::info!("filesystem: {} sectors", device.sector_count());
    *FILESYS.lock() = Some(Filesys {
        device,
        next_sector: 0,
        next_inode: 0,
        inodes: Vec::new(),
    });
}

/// Create a file of `length` bytes and return its inode.
pub fn create(length: u32) -> Result<Arc<Inode>, FsError> {
    let mut guard = FILESYS.lock();
    let fs = guard.as_mut().expect("filesystem not initialized");

    let sectors = length.div_ceil(SECTOR_SIZE as u32);
    if fs.next_sector + sectors > fs.device.sector_count() {
        return Err(FsError::NoSpace);
    }

    let inode = Arc::new(Inode {
        id: InodeId(fs.next_inode),
        start: fs.next_sector,
        length,
    });
    fs.next_inode += 1;
    fs.next_sector += sectors;
    fs.inodes.push(inode.clone());

    log::debug!(
        "created inode {:?}: {} bytes at sector {}",
        inode.id,
        length,
        inode.start
    );
    Ok(inode)
}

/// The disk behind the filesystem, for the buffer cache's transfers.
pub fn device() -> Arc<dyn BlockDevice> {
    FILESYS
        .lock()
        .as_ref()
        .expect("filesystem not initialized")
        .device
        .clone()
}
