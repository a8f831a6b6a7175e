/*
 * File System Support
 *
 * The core's view of the filesystem:
 *
 * - `inode`: the sector-translation contract (`byte_to_sector`) over a
 *   minimal contiguous-extent inode, standing in for the on-disk
 *   filesystem this kernel treats as an external collaborator.
 * - `file`: file handles (read/write/reopen/close) and the per-process
 *   open-file table.
 * - `cache`: the buffered block cache every file-content transfer goes
 *   through.
 */

pub mod cache;
pub mod file;
pub mod inode;

pub use file::File;
pub use inode::Inode;
